//! Agent Registry
//!
//! Tracks which agents are alive and enforces blacklisting. Persisted agent
//! records go through `AgentStore`; the online set is memory only.
//!
//! Status mutations (heartbeat, register, blacklist) on one agent hold that
//! agent's lock for their whole load-mutate-save sequence, so a blacklisted
//! agent can never be re-inserted by a heartbeat racing the blacklist call.
//! Different agents proceed independently; the online map is write-locked
//! only for the insert or removal itself.

use crate::error::{Error, Result};
use crate::store::AgentStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tvcast_common::agent::{Agent, AgentStatus, OnlineAgent};
use tvcast_common::events::{EventBus, TvEvent};

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// One async mutex per agent id, kept only while held or awaited
#[derive(Default)]
struct AgentLocks {
    locks: Mutex<LockMap>,
}

struct AgentLockGuard<'a> {
    locks: &'a AgentLocks,
    agent_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl AgentLocks {
    async fn lock(&self, agent_id: &str) -> AgentLockGuard<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(agent_id.to_string())
            .or_default()
            .clone();
        let guard = lock.clone().lock_owned().await;
        AgentLockGuard {
            locks: self,
            agent_id: agent_id.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for AgentLockGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this guard still refer to it
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.agent_id);
        }
    }
}

pub struct AgentRegistry {
    store: Arc<dyn AgentStore>,
    online: RwLock<HashMap<String, OnlineAgent>>,
    agent_locks: AgentLocks,
    heartbeat_period: Duration,
    events: EventBus,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn AgentStore>, heartbeat_period: Duration, events: EventBus) -> Self {
        Self {
            store,
            online: RwLock::new(HashMap::new()),
            agent_locks: AgentLocks::default(),
            heartbeat_period,
            events,
        }
    }

    /// Age after which an online entry is reaped
    pub fn expiry(&self) -> Duration {
        self.heartbeat_period * 2
    }

    /// Accept a heartbeat, creating an unregistered record on first contact
    ///
    /// # Errors
    /// `BlacklistedAgent` if the agent is blacklisted; the online set is
    /// left untouched in that case.
    pub async fn handle_heartbeat(&self, agent_id: &str, source_address: &str) -> Result<Agent> {
        let _agent_lock = self.agent_locks.lock(agent_id).await;

        let mut agent = match self.store.get_agent(agent_id).await? {
            Some(agent) => agent,
            None => {
                info!(agent_id, "First heartbeat from new agent");
                Agent::unregistered(agent_id)
            }
        };

        if agent.is_blacklisted() {
            warn!(agent_id, source_address, "Rejected heartbeat from blacklisted agent");
            return Err(Error::BlacklistedAgent(agent_id.to_string()));
        }

        agent.last_heartbeat_from = Some(source_address.to_string());
        self.store.save_agent(&agent).await?;

        let now = tvcast_common::time::now();
        let previous = self.online.write().await.insert(
            agent_id.to_string(),
            OnlineAgent {
                agent: agent.clone(),
                last_heartbeat: now,
            },
        );

        if previous.is_none() {
            info!(agent_id, source_address, "Agent online");
            self.events.emit_lossy(TvEvent::AgentOnline {
                agent_id: agent_id.to_string(),
                source_address: source_address.to_string(),
                timestamp: now,
            });
        } else {
            debug!(agent_id, source_address, "Heartbeat");
        }

        Ok(agent)
    }

    pub async fn register_agent(&self, agent_id: &str) -> Result<Agent> {
        let _agent_lock = self.agent_locks.lock(agent_id).await;
        let agent = self.transition(agent_id, AgentStatus::Registered).await?;

        // Keep the online snapshot's status current
        if let Some(entry) = self.online.write().await.get_mut(agent_id) {
            entry.agent = agent.clone();
        }

        info!(agent_id, "Agent registered");
        Ok(agent)
    }

    /// Blacklist an agent and evict it from the online set immediately
    pub async fn blacklist_agent(&self, agent_id: &str) -> Result<Agent> {
        let _agent_lock = self.agent_locks.lock(agent_id).await;
        let agent = self.transition(agent_id, AgentStatus::Blacklisted).await?;
        self.online.write().await.remove(agent_id);

        warn!(agent_id, "Agent blacklisted");
        self.events.emit_lossy(TvEvent::AgentBlacklisted {
            agent_id: agent_id.to_string(),
            timestamp: tvcast_common::time::now(),
        });
        Ok(agent)
    }

    async fn transition(&self, agent_id: &str, status: AgentStatus) -> Result<Agent> {
        let mut agent = self
            .store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| Error::UnknownAgent(agent_id.to_string()))?;
        agent.status = status;
        self.store.save_agent(&agent).await?;
        Ok(agent)
    }

    /// Fail with `BlacklistedAgent` if the agent is blacklisted
    ///
    /// Agents never seen before are allowed.
    pub async fn ensure_not_blacklisted(&self, agent_id: &str) -> Result<()> {
        match self.store.get_agent(agent_id).await? {
            Some(agent) if agent.is_blacklisted() => Err(Error::BlacklistedAgent(agent_id.to_string())),
            _ => Ok(()),
        }
    }

    /// Point-in-time copy of the online set, ordered by agent id
    pub async fn list_online_agents(&self) -> Vec<OnlineAgent> {
        let mut agents: Vec<OnlineAgent> = self.online.read().await.values().cloned().collect();
        agents.sort_by(|a, b| a.agent.agent_id.cmp(&b.agent.agent_id));
        agents
    }

    pub async fn is_online(&self, agent_id: &str) -> bool {
        self.online.read().await.contains_key(agent_id)
    }

    /// Persisted agent records
    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        self.store.list_agents().await
    }

    /// Remove entries older than twice the heartbeat period as of `now`
    ///
    /// An entry exactly at the limit survives. Returns the reaped ids.
    pub async fn reap_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let expiry = self.expiry();
        let mut online = self.online.write().await;

        let expired: Vec<String> = online
            .iter()
            .filter(|(_, entry)| {
                // Negative ages (clock moved backwards) never expire
                now.signed_duration_since(entry.last_heartbeat)
                    .to_std()
                    .map(|age| age > expiry)
                    .unwrap_or(false)
            })
            .map(|(agent_id, _)| agent_id.clone())
            .collect();

        for agent_id in &expired {
            online.remove(agent_id);
            info!(agent_id = %agent_id, "Agent offline (missed heartbeats)");
            self.events.emit_lossy(TvEvent::AgentOffline {
                agent_id: agent_id.clone(),
                timestamp: now,
            });
        }

        expired
    }

    /// Reap expired agents every `interval` until `token` is cancelled
    pub fn spawn_reaper(self: Arc<Self>, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            info!("Agent reaper started ({}ms tick)", interval.as_millis());
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        self.reap_expired(tvcast_common::time::now()).await;
                    }
                }
            }
            info!("Agent reaper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> (AgentRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = AgentRegistry::new(store.clone(), Duration::from_secs(15), EventBus::new(16));
        (registry, store)
    }

    #[tokio::test]
    async fn test_first_heartbeat_creates_unregistered_agent() {
        let (registry, store) = registry();

        let agent = registry.handle_heartbeat("A1", "10.0.0.1").await.unwrap();
        assert_eq!(agent.status, AgentStatus::Unregistered);

        let stored = store.get_agent("A1").await.unwrap().unwrap();
        assert_eq!(stored.last_heartbeat_from.as_deref(), Some("10.0.0.1"));
        assert!(registry.is_online("A1").await);
    }

    #[tokio::test]
    async fn test_heartbeat_source_is_last_write_wins() {
        let (registry, store) = registry();
        registry.handle_heartbeat("A1", "10.0.0.1").await.unwrap();
        registry.handle_heartbeat("A1", "10.0.0.2").await.unwrap();

        let stored = store.get_agent("A1").await.unwrap().unwrap();
        assert_eq!(stored.last_heartbeat_from.as_deref(), Some("10.0.0.2"));
        assert_eq!(registry.list_online_agents().await.len(), 1);
    }

    #[tokio::test]
    async fn test_transition_on_unknown_agent_fails() {
        let (registry, _) = registry();
        assert!(matches!(registry.register_agent("ghost").await, Err(Error::UnknownAgent(_))));
        assert!(matches!(registry.blacklist_agent("ghost").await, Err(Error::UnknownAgent(_))));
    }

    #[tokio::test]
    async fn test_register_updates_online_snapshot() {
        let (registry, _) = registry();
        registry.handle_heartbeat("A1", "10.0.0.1").await.unwrap();
        registry.register_agent("A1").await.unwrap();

        let online = registry.list_online_agents().await;
        assert_eq!(online[0].agent.status, AgentStatus::Registered);
    }

    #[tokio::test]
    async fn test_reap_boundary_is_strict() {
        let (registry, _) = registry();
        registry.handle_heartbeat("A1", "10.0.0.1").await.unwrap();
        let last = registry.list_online_agents().await[0].last_heartbeat;

        let limit = last + chrono::Duration::seconds(30);
        assert!(registry.reap_expired(limit).await.is_empty());
        assert!(registry.is_online("A1").await);

        let reaped = registry.reap_expired(limit + chrono::Duration::milliseconds(1)).await;
        assert_eq!(reaped, vec!["A1".to_string()]);
        assert!(!registry.is_online("A1").await);
    }

    /// Store whose lookups for "slow" take ten seconds
    struct SlowStore(MemoryStore);

    #[async_trait::async_trait]
    impl AgentStore for SlowStore {
        async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
            if agent_id == "slow" {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            self.0.get_agent(agent_id).await
        }

        async fn save_agent(&self, agent: &Agent) -> Result<()> {
            self.0.save_agent(agent).await
        }

        async fn list_agents(&self) -> Result<Vec<Agent>> {
            self.0.list_agents().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_call_does_not_block_other_agents() {
        let registry = Arc::new(AgentRegistry::new(
            Arc::new(SlowStore(MemoryStore::new())),
            Duration::from_secs(15),
            EventBus::new(16),
        ));
        registry.handle_heartbeat("A1", "10.0.0.1").await.unwrap();

        let slow = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.handle_heartbeat("slow", "10.0.0.9").await })
        };
        tokio::task::yield_now().await;

        let online = tokio::time::timeout(Duration::from_secs(1), registry.list_online_agents())
            .await
            .expect("online snapshot waited on another agent");
        assert_eq!(online.len(), 1);
        tokio::time::timeout(Duration::from_secs(1), registry.handle_heartbeat("A2", "10.0.0.2"))
            .await
            .expect("heartbeat waited on another agent")
            .unwrap();

        slow.await.unwrap().unwrap();
        assert_eq!(registry.list_online_agents().await.len(), 3);
        assert_eq!(registry.agent_locks.len(), 0);
    }

    #[tokio::test]
    async fn test_blacklist_racing_heartbeats_stays_offline() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);
        registry.handle_heartbeat("A1", "10.0.0.1").await.unwrap();

        let heartbeats: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.handle_heartbeat("A1", "10.0.0.1").await })
            })
            .collect();
        registry.blacklist_agent("A1").await.unwrap();
        for heartbeat in heartbeats {
            let _ = heartbeat.await.unwrap();
        }

        assert!(!registry.is_online("A1").await);
        assert!(matches!(
            registry.handle_heartbeat("A1", "10.0.0.1").await,
            Err(Error::BlacklistedAgent(_))
        ));
    }
}
