//! SQLite-backed store

use super::{AgentStore, EpisodeProgressStore, FIRST_EPISODE};
use crate::error::{Error, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tvcast_common::agent::{Agent, AgentStatus};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap a pool whose schema was created by `tvcast_common::db`
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn agent_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Agent> {
    let status: String = row.get("status");
    let status: AgentStatus = status.parse()?;
    Ok(Agent {
        agent_id: row.get("agent_id"),
        status,
        last_heartbeat_from: row.get("last_heartbeat_from"),
    })
}

#[async_trait]
impl AgentStore for SqliteStore {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query(
            "SELECT agent_id, status, last_heartbeat_from FROM agents WHERE agent_id = ?",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(agent_from_row).transpose()
    }

    async fn save_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (agent_id, status, last_heartbeat_from, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(agent_id) DO UPDATE SET
                status = excluded.status,
                last_heartbeat_from = excluded.last_heartbeat_from,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&agent.agent_id)
        .bind(agent.status.to_string())
        .bind(&agent.last_heartbeat_from)
        .bind(tvcast_common::time::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query(
            "SELECT agent_id, status, last_heartbeat_from FROM agents ORDER BY agent_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(agent_from_row).collect()
    }
}

#[async_trait]
impl EpisodeProgressStore for SqliteStore {
    async fn get_current_episode(&self, series: &str, season: Option<&str>) -> Result<u32> {
        let current: Option<i64> = sqlx::query_scalar(
            "SELECT current_episode FROM episode_progress WHERE series = ? AND season = ?",
        )
        .bind(series)
        .bind(season.unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?;

        match current {
            None => Ok(FIRST_EPISODE),
            Some(n) => u32::try_from(n).map_err(|_| {
                Error::InvalidInput(format!(
                    "Stored episode counter out of range for {}: {}",
                    series, n
                ))
            }),
        }
    }

    async fn set_current_episode(&self, series: &str, season: Option<&str>, episode: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO episode_progress (series, season, current_episode, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(series, season) DO UPDATE SET
                current_episode = excluded.current_episode,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(series)
        .bind(season.unwrap_or_default())
        .bind(i64::from(episode))
        .bind(tvcast_common::time::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
