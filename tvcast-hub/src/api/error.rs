//! Error responses

use crate::error::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Error returned by handlers, rendered as `{"error": message}`
#[derive(Debug)]
pub enum ApiError {
    Hub(Error),
    Unauthorized(String),
    BadRequest(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Hub(e)
    }
}

fn hub_status(e: &Error) -> StatusCode {
    match e {
        Error::BlacklistedAgent(_) => StatusCode::FORBIDDEN,
        Error::UnknownAgent(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::DuplicateMedia { .. } => StatusCode::CONFLICT,
        Error::JobTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::PlaybackFailure(_) => StatusCode::BAD_GATEWAY,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Common(tvcast_common::Error::NotFound(_)) => StatusCode::NOT_FOUND,
        Error::Common(tvcast_common::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Hub(e) => {
                let status = hub_status(&e);
                if status.is_server_error() {
                    error!("Request failed: {}", e);
                }
                (status, e.to_string())
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
