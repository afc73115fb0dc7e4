//! Job transports

use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;
use tvcast_common::jobs::{JobEnvelope, JobId};

/// Hands a job envelope to the agent named in it
///
/// Delivery only has to succeed in handing the job off; the result comes
/// back separately through `JobDispatcher::complete`.
#[async_trait]
pub trait JobTransport: Send + Sync {
    async fn deliver(&self, envelope: JobEnvelope) -> Result<()>;

    /// Take back an undelivered job whose submitter stopped waiting
    fn withdraw(&self, _agent_id: &str, _job_id: JobId) {}
}

#[derive(Default)]
struct Mailbox {
    pending: VecDeque<JobEnvelope>,
    notify: Arc<Notify>,
    /// Pollers parked on `notify`
    waiters: usize,
}

impl Mailbox {
    fn is_unused(&self) -> bool {
        self.pending.is_empty() && self.waiters == 0
    }

    fn drop_expired(&mut self, agent_id: &str) {
        let now = tvcast_common::time::now();
        self.pending.retain(|envelope| {
            let live = envelope.deadline >= now;
            if !live {
                debug!(agent_id, job_id = %envelope.job_id, "Dropping expired job");
            }
            live
        });
    }
}

type Mailboxes = HashMap<String, Mailbox>;

/// Per-agent FIFO mailboxes drained by agents long-polling the hub
///
/// A mailbox exists only while it holds jobs or has a poller parked on it.
#[derive(Default)]
pub struct MailboxTransport {
    mailboxes: Mutex<Mailboxes>,
}

/// Unregisters a parked poller however its wait ends
struct Waiter<'a> {
    mailboxes: &'a Mutex<Mailboxes>,
    agent_id: &'a str,
    notify: Arc<Notify>,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut mailboxes = lock(self.mailboxes);
        if let Some(mailbox) = mailboxes.get_mut(self.agent_id) {
            if Arc::ptr_eq(&mailbox.notify, &self.notify) {
                mailbox.waiters = mailbox.waiters.saturating_sub(1);
                if mailbox.is_unused() {
                    mailboxes.remove(self.agent_id);
                }
            }
        }
    }
}

fn lock(mailboxes: &Mutex<Mailboxes>) -> MutexGuard<'_, Mailboxes> {
    mailboxes.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MailboxTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all pending jobs for `agent_id`, waiting up to `max_wait` for one
    ///
    /// Envelopes whose deadline already passed are discarded; nobody is
    /// waiting for their result any more.
    pub async fn wait_for_jobs(&self, agent_id: &str, max_wait: Duration) -> Vec<JobEnvelope> {
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            let waiter = {
                let mut mailboxes = lock(&self.mailboxes);
                if let Some(mailbox) = mailboxes.get_mut(agent_id) {
                    mailbox.drop_expired(agent_id);
                    let jobs: Vec<JobEnvelope> = mailbox.pending.drain(..).collect();
                    if mailbox.is_unused() {
                        mailboxes.remove(agent_id);
                    }
                    if !jobs.is_empty() {
                        return jobs;
                    }
                }

                if tokio::time::Instant::now() >= deadline {
                    return Vec::new();
                }
                let mailbox = mailboxes.entry(agent_id.to_string()).or_default();
                mailbox.waiters += 1;
                Waiter {
                    mailboxes: &self.mailboxes,
                    agent_id,
                    notify: mailbox.notify.clone(),
                }
            };

            let woken = tokio::time::timeout_at(deadline, waiter.notify.notified()).await;
            drop(waiter);
            if woken.is_err() {
                return Vec::new();
            }
        }
    }

    /// Discard every job waiting for `agent_id`
    pub fn close(&self, agent_id: &str) -> usize {
        let mut mailboxes = lock(&self.mailboxes);
        let Some(mailbox) = mailboxes.remove(agent_id) else {
            return 0;
        };
        if mailbox.waiters > 0 {
            // Parked pollers keep their own notify handle and time out
            debug!(agent_id, waiters = mailbox.waiters, "Closing mailbox with parked pollers");
        }
        mailbox.pending.len()
    }

    /// Number of jobs waiting for `agent_id`
    pub async fn pending_count(&self, agent_id: &str) -> usize {
        lock(&self.mailboxes)
            .get(agent_id)
            .map(|m| m.pending.len())
            .unwrap_or(0)
    }

    /// Number of agents with a live mailbox
    pub fn mailbox_count(&self) -> usize {
        lock(&self.mailboxes).len()
    }
}

#[async_trait]
impl JobTransport for MailboxTransport {
    async fn deliver(&self, envelope: JobEnvelope) -> Result<()> {
        let mut mailboxes = lock(&self.mailboxes);
        let mailbox = mailboxes.entry(envelope.agent_id.clone()).or_default();
        mailbox.drop_expired(&envelope.agent_id);
        debug!(agent_id = %envelope.agent_id, job_id = %envelope.job_id, job = envelope.job.name(), "Job queued for agent");
        mailbox.pending.push_back(envelope);
        mailbox.notify.notify_one();
        Ok(())
    }

    fn withdraw(&self, agent_id: &str, job_id: JobId) {
        let mut mailboxes = lock(&self.mailboxes);
        let Some(mailbox) = mailboxes.get_mut(agent_id) else {
            return;
        };
        let before = mailbox.pending.len();
        mailbox.pending.retain(|envelope| envelope.job_id != job_id);
        if mailbox.pending.len() < before {
            debug!(agent_id, %job_id, "Withdrew undelivered job");
        }
        if mailbox.is_unused() {
            mailboxes.remove(agent_id);
        }
    }
}
