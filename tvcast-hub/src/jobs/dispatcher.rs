//! Job Dispatcher
//!
//! `submit_job` suspends only its own caller: each submission owns a
//! oneshot channel keyed by a fresh job id, and the pending map is locked
//! only long enough to insert or take one sender.

use super::JobTransport;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use tvcast_common::jobs::{Job, JobEnvelope, JobId, JobResult};
use uuid::Uuid;

type PendingMap = HashMap<JobId, oneshot::Sender<JobResult>>;

pub struct JobDispatcher {
    transport: Arc<dyn JobTransport>,
    pending: Arc<Mutex<PendingMap>>,
}

/// Removes the pending entry, and any undelivered envelope, however the
/// submission ends
struct PendingEntry<'a> {
    pending: &'a Mutex<PendingMap>,
    transport: &'a dyn JobTransport,
    agent_id: &'a str,
    job_id: JobId,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.job_id);
        self.transport.withdraw(self.agent_id, self.job_id);
    }
}

fn lock(pending: &Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobDispatcher {
    pub fn new(transport: Arc<dyn JobTransport>) -> Self {
        Self {
            transport,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Send `job` to `agent_id` and wait for its correlated result
    ///
    /// # Errors
    /// `JobTimeout` when no result arrives within `timeout`. The job is
    /// abandoned; a result arriving later is ignored.
    pub async fn submit_job(&self, agent_id: &str, job: Job, timeout: Duration) -> Result<JobResult> {
        let job_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(job_id, tx);
        let _entry = PendingEntry {
            pending: &self.pending,
            transport: self.transport.as_ref(),
            agent_id,
            job_id,
        };

        let deadline = tvcast_common::time::now()
            + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::days(1));
        let job_name = job.name();
        let envelope = JobEnvelope {
            job_id,
            agent_id: agent_id.to_string(),
            job,
            deadline,
        };

        debug!(agent_id, %job_id, job = job_name, "Submitting job");
        self.transport.deliver(envelope).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => {
                debug!(agent_id, %job_id, success = result.success, "Job result received");
                Ok(result)
            }
            Ok(Err(_)) => Err(Error::Transport(format!(
                "Result channel for job {} closed",
                job_id
            ))),
            Err(_) => {
                warn!(agent_id, %job_id, job = job_name, "Job timed out after {}ms", timeout.as_millis());
                Err(Error::JobTimeout {
                    agent_id: agent_id.to_string(),
                    job_id,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Resolve the submitter waiting on `job_id`
    ///
    /// Returns false for unknown or already-expired jobs.
    pub fn complete(&self, job_id: JobId, result: JobResult) -> bool {
        let sender = lock(&self.pending).remove(&job_id);
        match sender {
            Some(tx) => {
                if tx.send(result).is_ok() {
                    true
                } else {
                    warn!(%job_id, "Job result arrived as its submitter gave up");
                    false
                }
            }
            None => {
                warn!(%job_id, "Ignoring result for unknown or expired job");
                false
            }
        }
    }

    /// Number of submissions currently awaiting a result
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}
