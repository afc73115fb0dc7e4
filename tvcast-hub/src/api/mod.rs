//! HTTP API
//!
//! Agent-facing routes (heartbeats, job polling and results, inventory,
//! stop reports) sit behind the shared-password middleware. Operator routes
//! and the event stream are open.

mod agents;
mod auth;
mod error;
mod health;
mod playback;
mod sse;

pub use auth::{agent_auth, AGENT_PASSWORD_HEADER};
pub use error::ApiError;

use crate::agents::AgentRegistry;
use crate::jobs::{JobDispatcher, MailboxTransport};
use crate::library::InventoryLibrary;
use crate::playback::PlaybackCoordinator;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tvcast_common::events::EventBus;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AgentRegistry>,
    pub dispatcher: Arc<JobDispatcher>,
    pub mailboxes: Arc<MailboxTransport>,
    pub library: Arc<InventoryLibrary>,
    pub coordinator: Arc<PlaybackCoordinator>,
    pub events: EventBus,
    /// Expected `X-Agent-Password`; agent routes are open when `None`
    pub agent_password: Option<String>,
    /// Cancelled on shutdown; ends open event streams
    pub shutdown: CancellationToken,
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let agent_routes = Router::new()
        .route("/api/agents/heartbeat", post(agents::heartbeat))
        .route("/api/agents/:id/jobs", get(agents::poll_jobs))
        .route("/api/agents/:id/inventory", post(agents::update_inventory))
        .route("/api/agents/:id/stopped", post(agents::report_stopped))
        .route("/api/jobs/:job_id/result", post(agents::job_result))
        .layer(middleware::from_fn_with_state(state.clone(), agent_auth));

    let operator_routes = Router::new()
        .route("/api/agents", get(agents::list_agents))
        .route("/api/agents/online", get(agents::list_online))
        .route("/api/agents/:id/register", post(agents::register))
        .route("/api/agents/:id/blacklist", post(agents::blacklist))
        .route("/api/queue", post(playback::enqueue))
        .route("/api/playback/stop", post(playback::stop))
        .route("/api/lineup", get(playback::lineup))
        .route("/api/blocks/start", post(playback::start_block))
        .route("/api/events", get(sse::event_stream))
        .route("/health", get(health::health_check));

    Router::new()
        .merge(agent_routes)
        .merge(operator_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
