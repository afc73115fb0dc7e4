//! Agent-facing and agent-administration handlers

use super::{ApiError, AppState};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tvcast_common::agent::{Agent, Heartbeat, OnlineAgent};
use tvcast_common::jobs::{JobEnvelope, JobId, JobResult};
use tvcast_common::media::{Listing, MediaId};

/// Upper bound on one long-poll
const MAX_POLL_WAIT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_WAIT_MS: u64 = 25_000;

/// POST /api/agents/heartbeat
pub async fn heartbeat(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(heartbeat): Json<Heartbeat>,
) -> Result<Json<Agent>, ApiError> {
    let agent_id = heartbeat.agent_id.trim();
    if agent_id.is_empty() {
        return Err(ApiError::BadRequest("agent_id must not be empty".to_string()));
    }

    let source = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let agent = state.registry.handle_heartbeat(agent_id, &source).await?;
    Ok(Json(agent))
}

/// GET /api/agents
pub async fn list_agents(State(state): State<AppState>) -> Result<Json<Vec<Agent>>, ApiError> {
    Ok(Json(state.registry.list_agents().await?))
}

/// GET /api/agents/online
pub async fn list_online(State(state): State<AppState>) -> Json<Vec<OnlineAgent>> {
    Json(state.registry.list_online_agents().await)
}

/// POST /api/agents/:id/register
pub async fn register(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.registry.register_agent(&agent_id).await?))
}

/// POST /api/agents/:id/blacklist
///
/// The agent's media leaves the library and its queued jobs are dropped.
pub async fn blacklist(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    let agent = state.registry.blacklist_agent(&agent_id).await?;
    if state.library.remove_inventory(&agent_id).await {
        info!(agent_id = %agent_id, "Removed inventory of blacklisted agent");
    }
    let dropped = state.mailboxes.close(&agent_id);
    if dropped > 0 {
        info!(agent_id = %agent_id, dropped, "Discarded jobs for blacklisted agent");
    }
    Ok(Json(agent))
}

#[derive(Debug, Deserialize)]
pub struct PollParams {
    pub wait_ms: Option<u64>,
}

/// GET /api/agents/:id/jobs?wait_ms=
///
/// Long-poll for jobs addressed to the agent.
pub async fn poll_jobs(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(params): Query<PollParams>,
) -> Result<Json<Vec<JobEnvelope>>, ApiError> {
    state.registry.ensure_not_blacklisted(&agent_id).await?;

    let wait = Duration::from_millis(params.wait_ms.unwrap_or(DEFAULT_POLL_WAIT_MS)).min(MAX_POLL_WAIT);
    Ok(Json(state.mailboxes.wait_for_jobs(&agent_id, wait).await))
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

/// POST /api/jobs/:job_id/result
///
/// Results for unknown or expired jobs are acknowledged but ignored.
pub async fn job_result(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(result): Json<JobResult>,
) -> Json<AcceptedResponse> {
    Json(AcceptedResponse {
        accepted: state.dispatcher.complete(job_id, result),
    })
}

/// POST /api/agents/:id/inventory
pub async fn update_inventory(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(listing): Json<Listing>,
) -> Result<Json<Value>, ApiError> {
    state.registry.ensure_not_blacklisted(&agent_id).await?;
    let items = state.library.update_inventory(&agent_id, listing).await;
    Ok(Json(json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
pub struct StoppedRequest {
    pub media_id: MediaId,
}

/// POST /api/agents/:id/stopped
pub async fn report_stopped(
    State(state): State<AppState>,
    Path(_agent_id): Path<String>,
    Json(request): Json<StoppedRequest>,
) -> Json<Value> {
    let cleared = state.coordinator.report_stopped(request.media_id).await;
    Json(json!({ "cleared": cleared }))
}
