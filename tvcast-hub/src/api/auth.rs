//! Shared-password check for agent-facing routes

use super::{ApiError, AppState};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

pub const AGENT_PASSWORD_HEADER: &str = "x-agent-password";

/// Reject agent requests that do not carry the configured password
pub async fn agent_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.agent_password.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(AGENT_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok());

    if provided != Some(expected) {
        warn!(path = %request.uri().path(), "Agent request with missing or wrong password");
        return Err(ApiError::Unauthorized("Invalid agent password".to_string()));
    }

    Ok(next.run(request).await)
}
