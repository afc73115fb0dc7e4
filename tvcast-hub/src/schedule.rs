//! Daily programming schedule
//!
//! Answers "what blocks are coming up" for the lineup and, in the binary,
//! fires each block at its wall-clock time. The playback core itself never
//! decides when a block starts.

use crate::config::BlockConfig;
use crate::error::Result;
use crate::playback::PlaybackCoordinator;
use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tvcast_common::schedule::{ScheduledBlock, ScheduledBlockSummary};

pub trait BlockSchedule: Send + Sync {
    /// Blocks firing within `horizon` of `now`, soonest first
    fn upcoming(&self, now: DateTime<Utc>, horizon: Duration) -> Vec<ScheduledBlockSummary>;
}

/// Schedule with nothing on it
pub struct EmptySchedule;

impl BlockSchedule for EmptySchedule {
    fn upcoming(&self, _now: DateTime<Utc>, _horizon: Duration) -> Vec<ScheduledBlockSummary> {
        Vec::new()
    }
}

/// First occurrence of `fire_time` strictly after `now` in `now`'s zone
///
/// Local times skipped by a DST change are moved to the following day.
pub fn next_fire_after<Tz: TimeZone>(fire_time: NaiveTime, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();
    (0..=2)
        .filter_map(|days| today.checked_add_days(chrono::Days::new(days)))
        .filter_map(|date| tz.from_local_datetime(&date.and_time(fire_time)).earliest())
        .find(|candidate| candidate > now)
}

struct DailyBlock {
    block: ScheduledBlock,
    fire_time: NaiveTime,
}

/// Blocks that each fire once a day at a local time
pub struct DailySchedule {
    blocks: Vec<DailyBlock>,
}

impl DailySchedule {
    pub fn from_config(blocks: &[BlockConfig]) -> Result<Self> {
        let blocks = blocks
            .iter()
            .map(|b| {
                Ok(DailyBlock {
                    block: b.to_block(),
                    fire_time: b.fire_time()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { blocks })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn next_in<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<(DateTime<Tz>, &ScheduledBlock)> {
        self.blocks
            .iter()
            .filter_map(|b| next_fire_after(b.fire_time, now).map(|at| (at, &b.block)))
            .min_by(|a, b| a.0.cmp(&b.0))
    }

    fn upcoming_in<Tz: TimeZone>(&self, now: &DateTime<Tz>, horizon: Duration) -> Vec<ScheduledBlockSummary> {
        let Ok(horizon) = chrono::Duration::from_std(horizon) else {
            return Vec::new();
        };
        let limit = now.clone() + horizon;

        let mut summaries: Vec<ScheduledBlockSummary> = self
            .blocks
            .iter()
            .filter_map(|b| next_fire_after(b.fire_time, now).map(|at| (at, &b.block)))
            .filter(|(at, _)| *at <= limit)
            .map(|(at, block)| block.summary(at.timestamp_millis()))
            .collect();
        summaries.sort_by_key(|s| s.start_time);
        summaries
    }

    /// Start each block at its fire time until `token` is cancelled
    pub fn spawn_trigger(
        self: Arc<Self>,
        coordinator: Arc<PlaybackCoordinator>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Block trigger started ({} blocks)", self.blocks.len());
            let mut after = Local::now();

            loop {
                let Some((fire_at, block)) = self.next_in(&after) else {
                    token.cancelled().await;
                    break;
                };
                let wait = (fire_at - Local::now()).to_std().unwrap_or(Duration::ZERO);
                info!(block = %block.name, "Next block fires at {}", fire_at);

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                match coordinator.start_scheduled_block(block).await {
                    Ok(count) => info!(block = %block.name, "Block started with {} items", count),
                    Err(e) => error!(block = %block.name, "Block failed to start: {}", e),
                }

                // Never fire the same occurrence twice, even if the clock lags
                after = std::cmp::max(fire_at, Local::now());
            }
            warn!("Block trigger stopped");
        })
    }
}

impl BlockSchedule for DailySchedule {
    fn upcoming(&self, now: DateTime<Utc>, horizon: Duration) -> Vec<ScheduledBlockSummary> {
        self.upcoming_in(&now.with_timezone(&Local), horizon)
    }
}
