//! Job wire types exchanged between the hub and agents

use crate::media::MediaId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation identity of one job submission
pub type JobId = Uuid;

/// Start streaming a held media file to the target URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayJob {
    pub media_id: MediaId,
    pub target_url: String,
}

/// Stop whatever the agent is streaming
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopJob {}

/// Typed request addressed to one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Job {
    Play(PlayJob),
    Stop(StopJob),
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::Play(_) => "play",
            Job::Stop(_) => "stop",
        }
    }
}

/// A job as handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: JobId,
    pub agent_id: String,
    pub job: Job,
    /// Results arriving after this instant are ignored
    pub deadline: DateTime<Utc>,
}

/// Outcome reported by an agent for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    /// When streaming actually began, epoch millis (play jobs only)
    #[serde(default)]
    pub time_started: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl JobResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            time_started: None,
            message: None,
        }
    }

    pub fn started_at(time_started: i64) -> Self {
        Self {
            success: true,
            time_started: Some(time_started),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            time_started: None,
            message: Some(message.into()),
        }
    }
}
