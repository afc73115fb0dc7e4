//! Queue Promotion Loop

use super::PlaybackCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Promote the queue head whenever the slot is free, every `interval`
///
/// Transition failures are logged and the loop moves on; the failed item
/// is not retried.
pub fn spawn_promotion_loop(
    coordinator: Arc<PlaybackCoordinator>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Queue promotion loop started ({}ms tick)", interval.as_millis());
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    match coordinator.promote().await {
                        Ok(true) => debug!("Promoted queue head"),
                        Ok(false) => {}
                        Err(e) => error!("Queue promotion failed: {}", e),
                    }
                }
            }
        }
        info!("Queue promotion loop stopped");
    })
}
