//! Error types for tvcast-hub
//!
//! The first five variants are the orchestration taxonomy surfaced to
//! callers; the rest wrap infrastructure failures.

use thiserror::Error;
use tvcast_common::jobs::JobId;
use tvcast_common::media::MediaId;

/// Main error type for tvcast-hub
#[derive(Error, Debug)]
pub enum Error {
    /// Heartbeat or operation from a blacklisted agent
    #[error("Agent is blacklisted: {0}")]
    BlacklistedAgent(String),

    /// Status transition on an agent never seen before
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// Media already playing or queued
    #[error("Media already playing or queued: agent={agent_id}, media={media_id}")]
    DuplicateMedia { agent_id: String, media_id: MediaId },

    /// No correlated result before the deadline
    #[error("Job {job_id} to agent {agent_id} timed out after {timeout_ms}ms")]
    JobTimeout {
        agent_id: String,
        job_id: JobId,
        timeout_ms: u64,
    },

    /// Agent reported failure or a transition failed unexpectedly
    #[error("Playback failure: {0}")]
    PlaybackFailure(String),

    /// Job could not be handed to the agent transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Media library lookup failed
    #[error("Library error: {0}")]
    Library(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] tvcast_common::Error),
}

/// Convenience Result type using tvcast-hub Error
pub type Result<T> = std::result::Result<T, Error>;
