//! Playback Coordinator
//!
//! Owns `{now_playing, queue}` behind one mutex. Every read-modify-write
//! on the pair happens inside a single critical section that never awaits,
//! so enqueue, promotion, stop and block expansion never interleave.
//!
//! A now-playing transition reserves the slot under the lock, then waits
//! for the agent (or the commercial player) with the lock released and
//! re-acquires it to commit. While reserved the slot counts as occupied:
//! nothing else is promoted and the reserved media counts for duplicates.
//! Stop and block preemption cancel a reservation instead of waiting on it.
//!
//! Queue invariants at every unlock:
//! - no media appears twice across now-playing, the reservation and the queue
//! - each queued item starts at least `fudge_factor` after the previous ends
//! - the queue only changes by tail append or head removal

use crate::announce::Announcer;
use crate::episodes::{EpisodicScheduler, ProgressMap};
use crate::error::{Error, Result};
use crate::jobs::JobDispatcher;
use crate::library::MediaLibrary;
use crate::player::{PlayOutcome, StreamPlayer};
use crate::schedule::BlockSchedule;
use crate::store::EpisodeProgressStore;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tvcast_common::events::{EventBus, TvEvent};
use tvcast_common::jobs::{Job, PlayJob, StopJob};
use tvcast_common::media::{Commercial, Media, MediaId, MediaKind, QueuedItem};
use tvcast_common::schedule::{Lineup, ScheduledBlock};

/// Window of upcoming blocks reported in the lineup
const LINEUP_HORIZON: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Gap between consecutive queue items, millis
    pub fudge_factor_ms: i64,
    pub play_timeout: Duration,
    pub stop_timeout: Duration,
    /// Where agents and the commercial player push their streams
    pub stream_url: String,
    /// Appended to announcements when set
    pub viewer_url: Option<String>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            fudge_factor_ms: 5_000,
            play_timeout: Duration::from_secs(20),
            stop_timeout: Duration::from_secs(10),
            stream_url: "rtmp://localhost/live/tvcast".to_string(),
            viewer_url: None,
        }
    }
}

/// A transition in progress on the now-playing slot
#[derive(Debug)]
struct Transition {
    id: u64,
    media: Media,
    /// Where the timeline ends until the transition commits
    estimated_end: i64,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct PlaybackSlots {
    now_playing: Option<QueuedItem>,
    transition: Option<Transition>,
    queue: VecDeque<QueuedItem>,
    next_transition_id: u64,
}

impl PlaybackSlots {
    fn contains(&self, media: &Media) -> bool {
        self.now_playing.iter().any(|item| &item.media == media)
            || self.transition.iter().any(|t| &t.media == media)
            || self.queue.iter().any(|item| &item.media == media)
    }

    fn slot_free(&self) -> bool {
        self.now_playing.is_none() && self.transition.is_none()
    }

    fn is_idle(&self) -> bool {
        self.slot_free() && self.queue.is_empty()
    }

    /// End of the timeline: last queued item, else the occupied slot
    fn last_end_time(&self) -> Option<i64> {
        self.queue
            .back()
            .or(self.now_playing.as_ref())
            .map(QueuedItem::end_time)
            .or_else(|| self.transition.as_ref().map(|t| t.estimated_end))
    }

    /// Shift every queued item to follow `end_time`
    fn retime_queue(&mut self, mut end_time: i64, fudge_factor_ms: i64) {
        for item in self.queue.iter_mut() {
            item.set_start_time(end_time.saturating_add(fudge_factor_ms));
            debug!(media_id = item.media.id(), start = item.start_time(), end = item.end_time(), "Re-timed queued item");
            end_time = item.end_time();
        }
    }

    /// Cancel the reservation in progress, if any
    fn preempt(&mut self) {
        if let Some(transition) = &self.transition {
            info!(media = %transition.media, "Preempting transition in progress");
            transition.cancel.cancel();
        }
    }
}

fn lock(slots: &Mutex<PlaybackSlots>) -> MutexGuard<'_, PlaybackSlots> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the now-playing slot for one transition; released on drop
struct Reservation<'a> {
    slots: &'a Mutex<PlaybackSlots>,
    id: u64,
    cancel: CancellationToken,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut slots = lock(self.slots);
        if slots.transition.as_ref().is_some_and(|t| t.id == self.id) {
            slots.transition = None;
        }
    }
}

/// Deletes a staged commercial file when dropped
struct StagedFile(PathBuf);

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => info!("Deleted commercial file: {}", self.0.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete commercial file {}: {}", self.0.display(), e),
        }
    }
}

/// Drop the backing file of a commercial that will never air
fn discard(item: QueuedItem) {
    if let Media::Commercial(commercial) = item.media {
        drop(StagedFile(commercial.file_path));
    }
}

/// Agent-reported start times must be non-negative and representable
fn valid_start_time(millis: i64) -> bool {
    millis >= 0 && tvcast_common::time::datetime_from_millis(millis).is_some()
}

pub struct PlaybackCoordinator {
    slots: Mutex<PlaybackSlots>,
    dispatcher: Arc<JobDispatcher>,
    scheduler: EpisodicScheduler,
    progress: Arc<dyn EpisodeProgressStore>,
    library: Arc<dyn MediaLibrary>,
    player: Arc<dyn StreamPlayer>,
    announcer: Arc<dyn Announcer>,
    schedule: Arc<dyn BlockSchedule>,
    events: EventBus,
    settings: CoordinatorSettings,
}

impl PlaybackCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dispatcher: Arc<JobDispatcher>,
        progress: Arc<dyn EpisodeProgressStore>,
        library: Arc<dyn MediaLibrary>,
        player: Arc<dyn StreamPlayer>,
        announcer: Arc<dyn Announcer>,
        schedule: Arc<dyn BlockSchedule>,
        events: EventBus,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            slots: Mutex::new(PlaybackSlots::default()),
            dispatcher,
            scheduler: EpisodicScheduler::new(progress.clone()),
            progress,
            library,
            player,
            announcer,
            schedule,
            events,
            settings,
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, PlaybackSlots> {
        lock(&self.slots)
    }

    /// Reserve the free slot for `media` until `estimated_end`
    fn reserve(&self, slots: &mut PlaybackSlots, media: &Media, estimated_end: i64) -> Reservation<'_> {
        slots.next_transition_id += 1;
        let id = slots.next_transition_id;
        let cancel = CancellationToken::new();
        slots.transition = Some(Transition {
            id,
            media: media.clone(),
            estimated_end,
            cancel: cancel.clone(),
        });
        Reservation {
            slots: &self.slots,
            id,
            cancel,
        }
    }

    /// Reserve the slot for playing `item` starting now
    fn reserve_for(&self, slots: &mut PlaybackSlots, item: &QueuedItem) -> Reservation<'_> {
        let mut estimate = item.clone();
        estimate.set_start_time(tvcast_common::time::now_millis());
        self.reserve(slots, &item.media, estimate.end_time())
    }

    /// Look up media an agent holds and enqueue it
    ///
    /// Returns true if it started playing immediately.
    pub async fn add(&self, agent_id: &str, media_id: MediaId) -> Result<bool> {
        let media = self.library.find_media(agent_id, media_id).await?;
        self.enqueue(QueuedItem::new(media)).await
    }

    /// Play `item` now if idle, otherwise append it to the queue
    ///
    /// Returns true if the item went straight to the now-playing transition.
    ///
    /// # Errors
    /// - `DuplicateMedia` if the media is already playing, starting or queued
    /// - `JobTimeout` / `PlaybackFailure` from an immediate start; the slot
    ///   is left empty
    pub async fn enqueue(&self, mut item: QueuedItem) -> Result<bool> {
        let reservation = {
            let mut slots = self.lock_slots();

            if slots.is_idle() {
                info!(media = %item.media, "Idle, starting immediately");
                self.reserve_for(&mut slots, &item)
            } else {
                if slots.contains(&item.media) {
                    drop(slots);
                    let err = Error::DuplicateMedia {
                        agent_id: item.media.agent_id().to_string(),
                        media_id: item.media.id(),
                    };
                    discard(item);
                    return Err(err);
                }

                let previous_end = slots
                    .last_end_time()
                    .unwrap_or_else(tvcast_common::time::now_millis);
                item.set_start_time(previous_end.saturating_add(self.settings.fudge_factor_ms));
                info!(media = %item.media, start = item.start_time(), end = item.end_time(), "Queued");
                slots.queue.push_back(item);

                self.emit_queue_changed(&slots);
                return Ok(false);
            }
        };

        self.begin_playback(reservation, item).await?;
        Ok(true)
    }

    /// Move the queue head into the now-playing slot if the slot is free
    ///
    /// Returns false when there was nothing to do.
    pub async fn promote(&self) -> Result<bool> {
        let (reservation, item) = {
            let mut slots = self.lock_slots();
            if !slots.slot_free() {
                return Ok(false);
            }
            let Some(item) = slots.queue.pop_front() else {
                return Ok(false);
            };

            self.emit_queue_changed(&slots);
            (self.reserve_for(&mut slots, &item), item)
        };

        self.begin_playback(reservation, item).await?;
        Ok(true)
    }

    /// Now-playing transition; runs without the slots lock
    async fn begin_playback(&self, reservation: Reservation<'_>, item: QueuedItem) -> Result<()> {
        match item.media {
            Media::Commercial(commercial) => {
                self.play_commercial(&commercial, &reservation.cancel).await;
                Ok(())
            }
            Media::Movie(_) | Media::Episode(_) => self.play_on_agent(&reservation, item).await,
        }
    }

    /// Stream a commercial locally to completion; its file is always deleted
    async fn play_commercial(&self, commercial: &Commercial, cancel: &CancellationToken) {
        let _staged = StagedFile(commercial.file_path.clone());
        info!(commercial = %commercial.name, "Playing commercial");

        tokio::select! {
            outcome = self.player.play(commercial, &self.settings.stream_url) => {
                if let PlayOutcome::Failed(reason) = outcome {
                    error!(commercial = %commercial.name, "Commercial stream ended in error: {}", reason);
                }
            }
            _ = cancel.cancelled() => warn!(commercial = %commercial.name, "Commercial preempted"),
        }
    }

    async fn play_on_agent(&self, reservation: &Reservation<'_>, mut item: QueuedItem) -> Result<()> {
        let agent_id = item.media.agent_id().to_string();
        let job = Job::Play(PlayJob {
            media_id: item.media.id(),
            target_url: self.settings.stream_url.clone(),
        });

        info!(agent_id = %agent_id, media = %item.media, "Sending play request to agent");
        let result = match self
            .dispatcher
            .submit_job(&agent_id, job, self.settings.play_timeout)
            .await
        {
            Ok(result) => result,
            Err(e @ Error::JobTimeout { .. }) => {
                error!(agent_id = %agent_id, media = %item.media, "Timed out waiting for play job; slot left empty");
                return Err(e);
            }
            Err(e) => {
                return Err(Error::PlaybackFailure(format!(
                    "Dispatching {} to {}: {}",
                    item.media, agent_id, e
                )))
            }
        };

        if !result.success {
            return Err(Error::PlaybackFailure(format!(
                "Agent {} could not play {}: {}",
                agent_id,
                item.media,
                result.message.as_deref().unwrap_or("no reason given")
            )));
        }

        let started = match result.time_started {
            None => tvcast_common::time::now_millis(),
            Some(started) if valid_start_time(started) => started,
            Some(started) => {
                // The agent is streaming but the slot cannot be timed
                self.send_stop(&agent_id).await;
                return Err(Error::PlaybackFailure(format!(
                    "Agent {} reported an invalid start time {} for {}",
                    agent_id, started, item.media
                )));
            }
        };
        item.set_start_time(started);

        let committed = {
            let mut slots = self.lock_slots();
            if reservation.cancel.is_cancelled() {
                false
            } else {
                slots.transition = None;
                slots.retime_queue(item.end_time(), self.settings.fudge_factor_ms);
                slots.now_playing = Some(item.clone());
                true
            }
        };

        if !committed {
            warn!(agent_id = %agent_id, media = %item.media, "Preempted while starting; stopping agent");
            self.send_stop(&agent_id).await;
            return Ok(());
        }

        info!(media = %item.media, start = item.start_time(), end = item.end_time(), "Now playing");
        self.announce(&format!("NOW PLAYING: {}", item.media));
        self.events.emit_lossy(TvEvent::NowPlaying {
            media: item.media.clone(),
            start_time: item.start_time(),
            end_time: item.end_time(),
            timestamp: tvcast_common::time::now(),
        });

        if let Some(info) = &item.episodic_info {
            let next = info.effective_episode_number.saturating_add(1);
            if let Err(e) = self
                .progress
                .set_current_episode(&info.series_name, info.season_name.as_deref(), next)
                .await
            {
                error!(series = %info.series_name, "Failed to advance episode progress: {}", e);
            } else {
                debug!(series = %info.series_name, season = ?info.season_name, next, "Advanced episode progress");
            }
        }

        Ok(())
    }

    /// Best-effort stop request; failures are logged
    async fn send_stop(&self, agent_id: &str) {
        match self
            .dispatcher
            .submit_job(agent_id, Job::Stop(StopJob {}), self.settings.stop_timeout)
            .await
        {
            Ok(result) if !result.success => {
                warn!(agent_id, "Agent reported failure stopping: {:?}", result.message)
            }
            Ok(_) => {}
            Err(e) => warn!(agent_id, "Stop request failed: {}", e),
        }
    }

    /// Cancel any transition and take what is playing
    ///
    /// The slot stays reserved until the stop request settles, so nothing
    /// new starts on the agent before its stop arrives.
    fn take_for_stop(&self, slots: &mut PlaybackSlots) -> Option<(QueuedItem, Reservation<'_>)> {
        slots.preempt();
        let item = slots.now_playing.take()?;
        let reservation = self.reserve(slots, &item.media, tvcast_common::time::now_millis());
        Some((item, reservation))
    }

    async fn finish_stop(&self, item: &QueuedItem, reservation: Reservation<'_>) {
        let agent_id = item.media.agent_id();
        info!(agent_id, media = %item.media, "Stopping now playing");
        self.send_stop(agent_id).await;
        drop(reservation);
        self.emit_stopped(item.media.id());
    }

    /// Stop whatever is playing; the slot is cleared even if the agent
    /// never confirms
    pub async fn stop_now_playing(&self) -> Option<QueuedItem> {
        let (item, reservation) = {
            let mut slots = self.lock_slots();
            self.take_for_stop(&mut slots)?
        };
        self.finish_stop(&item, reservation).await;
        Some(item)
    }

    /// Agent notification that playback of `media_id` ended
    ///
    /// Clears the slot only if it still holds that media. Returns whether
    /// it did.
    pub async fn report_stopped(&self, media_id: MediaId) -> bool {
        let cleared = {
            let mut slots = self.lock_slots();
            match &slots.now_playing {
                Some(item) if item.media.id() == media_id => {
                    info!(media = %item.media, "Playback ended");
                    slots.now_playing = None;
                    true
                }
                _ => false,
            }
        };

        if cleared {
            self.emit_stopped(media_id);
        } else {
            debug!(media_id, "Ignoring stop report for media not playing");
        }
        cleared
    }

    /// Preempt playback and queue up a programming block
    ///
    /// Items that cannot be resolved are skipped. Returns the number of
    /// items successfully enqueued.
    pub async fn start_scheduled_block(&self, block: &ScheduledBlock) -> Result<usize> {
        warn!(block = %block.name, "Starting scheduled block");
        let (discarded, stopping) = {
            let mut slots = self.lock_slots();
            let discarded = std::mem::take(&mut slots.queue);
            let stopping = self.take_for_stop(&mut slots);
            self.emit_queue_changed(&slots);
            (discarded, stopping)
        };
        for item in discarded {
            discard(item);
        }
        if let Some((item, reservation)) = stopping {
            self.finish_stop(&item, reservation).await;
        }

        let to_play = self.expand_block(block).await?;
        if to_play.is_empty() {
            error!(block = %block.name, "Could not play any shows for block");
            return Ok(0);
        }

        let shows = lineup_names(&to_play);
        self.announce(&format!(
            "Scheduled block now starting: {}. Lined up: {}",
            block.name,
            shows.join(", ")
        ));
        self.events.emit_lossy(TvEvent::BlockStarted {
            block: block.summary(tvcast_common::time::now_millis()),
            items: to_play.len(),
            timestamp: tvcast_common::time::now(),
        });

        let mut enqueued = 0;
        for item in to_play {
            let media = item.media.to_string();
            match self.enqueue(item).await {
                Ok(_) => enqueued += 1,
                Err(e) => error!(block = %block.name, media = %media, "Error adding scheduled item to queue: {}", e),
            }
        }
        Ok(enqueued)
    }

    async fn expand_block(&self, block: &ScheduledBlock) -> Result<Vec<QueuedItem>> {
        let listing = self.library.listings().await?;
        let mut progress = ProgressMap::new();
        let mut to_play = Vec::new();

        for scheduled in &block.items {
            match listing.find_series(&scheduled.series) {
                None => error!(series = %scheduled.series, "Could not find series in listings"),
                Some(series) => match self.scheduler.resolve_for_item(scheduled, &mut progress, series).await {
                    Ok(Some(resolved)) => {
                        info!(series = %series.name, episode = resolved.episode.episode_number, "Adding episode");
                        to_play.push(QueuedItem::episodic(Media::Episode(resolved.episode), resolved.info));
                    }
                    Ok(None) => error!(series = %series.name, "Series has no episodes to schedule"),
                    Err(e) => error!(series = %series.name, "Could not resolve episode: {}", e),
                },
            }

            // Breaks follow their item even when the item itself was skipped
            let mut seconds_remaining = i64::from(scheduled.commercial_break_minutes) * 60;
            while seconds_remaining > 0 {
                match self.library.commercial().await {
                    Ok(commercial) => {
                        seconds_remaining -= i64::from(commercial.duration_seconds.max(1));
                        to_play.push(QueuedItem::new(Media::Commercial(commercial)));
                    }
                    Err(e) => {
                        warn!("Commercial break cut short: {}", e);
                        break;
                    }
                }
            }
        }

        Ok(to_play)
    }

    fn announce(&self, text: &str) {
        match &self.settings.viewer_url {
            Some(url) => self.announcer.announce(&format!("{} -- {}", text, url)),
            None => self.announcer.announce(text),
        }
    }

    fn emit_queue_changed(&self, slots: &PlaybackSlots) {
        self.events.emit_lossy(TvEvent::QueueChanged {
            queue_len: slots.queue.len(),
            timestamp: tvcast_common::time::now(),
        });
    }

    fn emit_stopped(&self, media_id: MediaId) {
        self.events.emit_lossy(TvEvent::PlaybackStopped {
            media_id,
            timestamp: tvcast_common::time::now(),
        });
    }

    pub async fn now_playing(&self) -> Option<QueuedItem> {
        self.lock_slots().now_playing.clone()
    }

    pub async fn queue_snapshot(&self) -> Vec<QueuedItem> {
        self.lock_slots().queue.iter().cloned().collect()
    }

    pub async fn lineup(&self) -> Lineup {
        let (now_playing, queue) = {
            let slots = self.lock_slots();
            (slots.now_playing.clone(), slots.queue.iter().cloned().collect())
        };
        Lineup {
            now_playing,
            queue,
            remaining_blocks: self
                .schedule
                .upcoming(tvcast_common::time::now(), LINEUP_HORIZON),
        }
    }
}

/// Distinct show names in first-appearance order; commercials are omitted
fn lineup_names(items: &[QueuedItem]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for item in items.iter().filter(|i| i.kind() != MediaKind::Commercial) {
        if let Some(name) = item.media.show_name() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}
