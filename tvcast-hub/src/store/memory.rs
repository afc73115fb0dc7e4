//! In-memory store, used by tests and ephemeral runs

use super::{AgentStore, EpisodeProgressStore, FIRST_EPISODE};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tvcast_common::agent::Agent;

#[derive(Default)]
pub struct MemoryStore {
    agents: RwLock<HashMap<String, Agent>>,
    progress: RwLock<HashMap<(String, String), u32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn progress_key(series: &str, season: Option<&str>) -> (String, String) {
    (series.to_string(), season.unwrap_or_default().to_string())
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        Ok(self.agents.read().await.get(agent_id).cloned())
    }

    async fn save_agent(&self, agent: &Agent) -> Result<()> {
        self.agents
            .write()
            .await
            .insert(agent.agent_id.clone(), agent.clone());
        Ok(())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let mut agents: Vec<Agent> = self.agents.read().await.values().cloned().collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }
}

#[async_trait]
impl EpisodeProgressStore for MemoryStore {
    async fn get_current_episode(&self, series: &str, season: Option<&str>) -> Result<u32> {
        Ok(self
            .progress
            .read()
            .await
            .get(&progress_key(series, season))
            .copied()
            .unwrap_or(FIRST_EPISODE))
    }

    async fn set_current_episode(&self, series: &str, season: Option<&str>, episode: u32) -> Result<()> {
        self.progress
            .write()
            .await
            .insert(progress_key(series, season), episode);
        Ok(())
    }
}
