//! Persistence seams for agent records and episode continuation
//!
//! The hub never holds the authoritative copy of an agent longer than one
//! operation; every transition is load-mutate-save through `AgentStore`.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use async_trait::async_trait;
use tvcast_common::agent::Agent;

/// Episode number used for a (series, season) never scheduled before
pub const FIRST_EPISODE: u32 = 1;

/// Key-value store of agent records
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>>;

    /// Insert or replace the record
    async fn save_agent(&self, agent: &Agent) -> Result<()>;

    async fn list_agents(&self) -> Result<Vec<Agent>>;
}

/// Persisted "current episode" counters per (series, season)
#[async_trait]
pub trait EpisodeProgressStore: Send + Sync {
    /// Next episode to air; `FIRST_EPISODE` when never recorded
    async fn get_current_episode(&self, series: &str, season: Option<&str>) -> Result<u32>;

    async fn set_current_episode(&self, series: &str, season: Option<&str>, episode: u32) -> Result<()>;
}
