//! Shared fixtures for hub integration tests
//!
//! `Harness` wires a coordinator over in-memory collaborators. `FakeAgent`
//! long-polls the mailbox transport the way a real agent does and answers
//! play/stop jobs.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tvcast_common::events::EventBus;
use tvcast_common::jobs::{Job, JobResult};
use tvcast_common::media::{Commercial, Episode, Listing, Media, MediaId, Movie, QueuedItem, Season, Series};
use tvcast_hub::agents::AgentRegistry;
use tvcast_hub::announce::EventAnnouncer;
use tvcast_hub::api::AppState;
use tvcast_hub::config::CommercialSource;
use tvcast_hub::jobs::{JobDispatcher, MailboxTransport};
use tvcast_hub::library::InventoryLibrary;
use tvcast_hub::playback::{CoordinatorSettings, PlaybackCoordinator};
use tvcast_hub::player::{PlayOutcome, StreamPlayer};
use tvcast_hub::schedule::{BlockSchedule, EmptySchedule};
use tvcast_hub::store::MemoryStore;

pub const FUDGE_MS: i64 = 5_000;

/// Player that records what it was asked to play
#[derive(Default)]
pub struct RecordingPlayer {
    pub played: Mutex<Vec<Commercial>>,
    /// Whether each commercial's file existed while it was playing
    pub file_present: Mutex<Vec<bool>>,
    pub fail: bool,
}

#[async_trait]
impl StreamPlayer for RecordingPlayer {
    async fn play(&self, commercial: &Commercial, _target_url: &str) -> PlayOutcome {
        self.file_present
            .lock()
            .unwrap()
            .push(commercial.file_path.exists());
        self.played.lock().unwrap().push(commercial.clone());
        if self.fail {
            PlayOutcome::Failed("boom".to_string())
        } else {
            PlayOutcome::Finished
        }
    }
}

pub struct Harness {
    pub coordinator: Arc<PlaybackCoordinator>,
    pub dispatcher: Arc<JobDispatcher>,
    pub mailboxes: Arc<MailboxTransport>,
    pub library: Arc<InventoryLibrary>,
    pub store: Arc<MemoryStore>,
    pub player: Arc<RecordingPlayer>,
    pub events: EventBus,
    pub scratch: tempfile::TempDir,
    pub sources: tempfile::TempDir,
}

pub struct HarnessOptions {
    pub commercial_durations: Vec<u32>,
    pub player_fails: bool,
    pub schedule: Arc<dyn BlockSchedule>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            commercial_durations: Vec::new(),
            player_fails: false,
            schedule: Arc::new(EmptySchedule),
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let sources = tempfile::tempdir().unwrap();

        let commercials = options
            .commercial_durations
            .iter()
            .enumerate()
            .map(|(i, duration)| {
                let path = sources.path().join(format!("ad{}.mp4", i));
                std::fs::write(&path, b"commercial").unwrap();
                CommercialSource {
                    path,
                    duration_seconds: *duration,
                    name: None,
                }
            })
            .collect();

        let events = EventBus::new(64);
        let store = Arc::new(MemoryStore::new());
        let mailboxes = Arc::new(MailboxTransport::new());
        let dispatcher = Arc::new(JobDispatcher::new(mailboxes.clone()));
        let library = Arc::new(InventoryLibrary::new(commercials, scratch.path().to_path_buf()));
        let player = Arc::new(RecordingPlayer {
            fail: options.player_fails,
            ..Default::default()
        });

        let coordinator = Arc::new(PlaybackCoordinator::new(
            dispatcher.clone(),
            store.clone(),
            library.clone(),
            player.clone(),
            Arc::new(EventAnnouncer::new(events.clone(), "[TV]")),
            options.schedule,
            events.clone(),
            CoordinatorSettings {
                fudge_factor_ms: FUDGE_MS,
                play_timeout: Duration::from_secs(20),
                stop_timeout: Duration::from_secs(10),
                stream_url: "rtmp://test/live".to_string(),
                viewer_url: None,
            },
        ));

        Self {
            coordinator,
            dispatcher,
            mailboxes,
            library,
            store,
            player,
            events,
            scratch,
            sources,
        }
    }

    pub fn spawn_agent(&self, agent_id: &str) -> FakeAgent {
        FakeAgent::spawn(agent_id, self.mailboxes.clone(), self.dispatcher.clone())
    }

    pub fn app_state(&self, registry: Arc<AgentRegistry>, agent_password: Option<&str>) -> AppState {
        AppState {
            registry,
            dispatcher: self.dispatcher.clone(),
            mailboxes: self.mailboxes.clone(),
            library: self.library.clone(),
            coordinator: self.coordinator.clone(),
            events: self.events.clone(),
            agent_password: agent_password.map(str::to_string),
            shutdown: CancellationToken::new(),
        }
    }
}

/// One scripted answer to a play job
#[derive(Debug, Clone, Copy)]
pub enum PlayReply {
    StartedAt(i64),
    Fail,
    /// Never answer; the dispatch times out
    Ignore,
}

/// Agent task answering play jobs with scripted start times
pub struct FakeAgent {
    pub jobs: Arc<Mutex<Vec<Job>>>,
    /// Start time reported for the next play job; `None` reports failure
    pub next_start: Arc<Mutex<Option<i64>>>,
    /// Replies used before falling back to `next_start`
    pub replies: Arc<Mutex<VecDeque<PlayReply>>>,
    handle: JoinHandle<()>,
}

impl FakeAgent {
    fn spawn(agent_id: &str, mailboxes: Arc<MailboxTransport>, dispatcher: Arc<JobDispatcher>) -> Self {
        let jobs = Arc::new(Mutex::new(Vec::new()));
        let next_start = Arc::new(Mutex::new(Some(1_000_000)));
        let replies = Arc::new(Mutex::new(VecDeque::new()));
        let agent_id = agent_id.to_string();

        let handle = {
            let jobs = jobs.clone();
            let next_start = next_start.clone();
            let replies = replies.clone();
            tokio::spawn(async move {
                loop {
                    for envelope in mailboxes.wait_for_jobs(&agent_id, Duration::from_millis(50)).await {
                        jobs.lock().unwrap().push(envelope.job.clone());
                        let result = match envelope.job {
                            Job::Stop(_) => JobResult::succeeded(),
                            Job::Play(_) => {
                                let scripted = replies.lock().unwrap().pop_front();
                                let reply = scripted.unwrap_or_else(|| match *next_start.lock().unwrap() {
                                    Some(start) => PlayReply::StartedAt(start),
                                    None => PlayReply::Fail,
                                });
                                match reply {
                                    PlayReply::StartedAt(start) => JobResult::started_at(start),
                                    PlayReply::Fail => JobResult::failed("file missing"),
                                    PlayReply::Ignore => continue,
                                }
                            }
                        };
                        dispatcher.complete(envelope.job_id, result);
                    }
                }
            })
        };

        Self {
            jobs,
            next_start,
            replies,
            handle,
        }
    }

    /// Queue replies for the next play jobs
    pub fn script(&self, replies: impl IntoIterator<Item = PlayReply>) {
        self.replies.lock().unwrap().extend(replies);
    }

    pub fn set_next_start(&self, start: Option<i64>) {
        *self.next_start.lock().unwrap() = start;
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for FakeAgent {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn episode(id: MediaId, series: &str, season: Option<&str>, number: u32, duration_seconds: u32) -> Episode {
    Episode {
        id,
        agent_id: "A1".to_string(),
        name: format!("Episode {}", number),
        series_name: series.to_string(),
        season_name: season.map(str::to_string),
        episode_number: number,
        duration_seconds,
    }
}

pub fn episode_item(id: MediaId, number: u32, duration_seconds: u32) -> QueuedItem {
    QueuedItem::new(Media::Episode(episode(id, "Foo", Some("S1"), number, duration_seconds)))
}

pub fn movie_item(id: MediaId, duration_seconds: u32) -> QueuedItem {
    QueuedItem::new(Media::Movie(Movie {
        id,
        agent_id: "A1".to_string(),
        name: format!("Movie {}", id),
        duration_seconds,
    }))
}

/// Series "Foo" with season "S1" holding episodes 1..=count (ids 101..)
pub fn foo_inventory(count: u32) -> Listing {
    Listing {
        movies: Vec::new(),
        series: vec![Series {
            name: "Foo".to_string(),
            seasons: vec![Season {
                name: "S1".to_string(),
                episodes: (1..=count)
                    .map(|n| episode(100 + u64::from(n), "Foo", Some("S1"), n, 1_200))
                    .collect(),
            }],
            episodes: Vec::new(),
        }],
    }
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default()
}
