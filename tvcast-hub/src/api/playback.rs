//! Queue, playback and block handlers

use super::{ApiError, AppState};
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tvcast_common::media::{MediaId, QueuedItem};
use tvcast_common::schedule::{Lineup, ScheduledBlock};

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub agent_id: String,
    pub media_id: MediaId,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    /// True if the media started playing instead of being queued
    pub started: bool,
}

/// POST /api/queue
pub async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    let started = state
        .coordinator
        .add(&request.agent_id, request.media_id)
        .await?;
    Ok(Json(EnqueueResponse { started }))
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: Option<QueuedItem>,
}

/// POST /api/playback/stop
pub async fn stop(State(state): State<AppState>) -> Json<StopResponse> {
    Json(StopResponse {
        stopped: state.coordinator.stop_now_playing().await,
    })
}

/// GET /api/lineup
pub async fn lineup(State(state): State<AppState>) -> Json<Lineup> {
    Json(state.coordinator.lineup().await)
}

/// POST /api/blocks/start
pub async fn start_block(
    State(state): State<AppState>,
    Json(block): Json<ScheduledBlock>,
) -> Result<Json<Value>, ApiError> {
    if block.name.trim().is_empty() {
        return Err(ApiError::BadRequest("block name must not be empty".to_string()));
    }
    let enqueued = state.coordinator.start_scheduled_block(&block).await?;
    Ok(Json(json!({ "enqueued": enqueued })))
}
