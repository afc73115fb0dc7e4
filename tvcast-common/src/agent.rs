//! Agent records and heartbeat payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Administrative status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Unregistered,
    Registered,
    Blacklisted,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Unregistered => write!(f, "unregistered"),
            AgentStatus::Registered => write!(f, "registered"),
            AgentStatus::Blacklisted => write!(f, "blacklisted"),
        }
    }
}

impl FromStr for AgentStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unregistered" => Ok(AgentStatus::Unregistered),
            "registered" => Ok(AgentStatus::Registered),
            "blacklisted" => Ok(AgentStatus::Blacklisted),
            other => Err(crate::Error::InvalidInput(format!("Unknown agent status: {}", other))),
        }
    }
}

/// Persisted agent record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub status: AgentStatus,
    /// Source address of the most recent heartbeat
    #[serde(default)]
    pub last_heartbeat_from: Option<String>,
}

impl Agent {
    /// Record for an agent seen for the first time
    pub fn unregistered(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: AgentStatus::Unregistered,
            last_heartbeat_from: None,
        }
    }

    pub fn is_blacklisted(&self) -> bool {
        self.status == AgentStatus::Blacklisted
    }
}

/// Liveness signal sent periodically by an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub agent_id: String,
}

/// In-memory view of a live agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineAgent {
    pub agent: Agent,
    pub last_heartbeat: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_strings() {
        for status in [AgentStatus::Unregistered, AgentStatus::Registered, AgentStatus::Blacklisted] {
            assert_eq!(status.to_string().parse::<AgentStatus>().unwrap(), status);
        }
        assert!("retired".parse::<AgentStatus>().is_err());
    }

    #[test]
    fn test_new_agent_is_unregistered() {
        let agent = Agent::unregistered("A1");
        assert_eq!(agent.status, AgentStatus::Unregistered);
        assert!(agent.last_heartbeat_from.is_none());
        assert!(!agent.is_blacklisted());
    }
}
