//! Media and queue data model
//!
//! Media is a closed sum type (`Movie`, `Episode`, `Commercial`). The queue
//! branches on the variant in exactly two places: the now-playing transition
//! and the announcement rendering (`Display`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Agent id used for media the hub itself holds (commercials)
pub const LOCAL_AGENT_ID: &str = "hub";

/// Identifier of a media file, unique per owning agent
pub type MediaId = u64;

/// A feature-length movie held by an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MediaId,
    /// Filled in by the hub from the reporting agent
    #[serde(default)]
    pub agent_id: String,
    pub name: String,
    pub duration_seconds: u32,
}

/// One episode of a series held by an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: MediaId,
    #[serde(default)]
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub series_name: String,
    #[serde(default)]
    pub season_name: Option<String>,
    pub episode_number: u32,
    pub duration_seconds: u32,
}

/// A commercial clip streamed by the hub itself
///
/// The backing file is a disposable copy; it is deleted once played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commercial {
    pub id: MediaId,
    pub agent_id: String,
    pub name: String,
    pub file_path: PathBuf,
    pub duration_seconds: u32,
}

/// Playable media
///
/// Equality is by (agent_id, id) regardless of variant payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Media {
    Movie(Movie),
    Episode(Episode),
    Commercial(Commercial),
}

/// Queue item type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
    Commercial,
}

impl Media {
    pub fn id(&self) -> MediaId {
        match self {
            Media::Movie(m) => m.id,
            Media::Episode(e) => e.id,
            Media::Commercial(c) => c.id,
        }
    }

    /// Agent that physically holds the file
    pub fn agent_id(&self) -> &str {
        match self {
            Media::Movie(m) => &m.agent_id,
            Media::Episode(e) => &e.agent_id,
            Media::Commercial(c) => &c.agent_id,
        }
    }

    pub fn duration_seconds(&self) -> u32 {
        match self {
            Media::Movie(m) => m.duration_seconds,
            Media::Episode(e) => e.duration_seconds,
            Media::Commercial(c) => c.duration_seconds,
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            Media::Movie(_) => MediaKind::Movie,
            Media::Episode(_) => MediaKind::Episode,
            Media::Commercial(_) => MediaKind::Commercial,
        }
    }

    /// Name shown in lineup summaries: series name for episodes, title for movies
    pub fn show_name(&self) -> Option<&str> {
        match self {
            Media::Movie(m) => Some(&m.name),
            Media::Episode(e) => Some(&e.series_name),
            Media::Commercial(_) => None,
        }
    }
}

impl PartialEq for Media {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id() && self.agent_id() == other.agent_id()
    }
}

impl Eq for Media {}

impl fmt::Display for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Media::Episode(e) => {
                write!(f, "{}", e.series_name)?;
                if let Some(season) = e.season_name.as_deref().filter(|s| !s.trim().is_empty()) {
                    write!(f, ", {}", season)?;
                }
                write!(f, ": {}", e.name)
            }
            Media::Movie(m) => write!(f, "{}", m.name),
            Media::Commercial(c) => write!(f, "Commercial: {}", c.name),
        }
    }
}

/// Continuation bookkeeping carried by scheduled episodes
///
/// `effective_episode_number` is the raw episode number for season-bounded
/// scheduling, or the 1-based position in the flattened series otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodicInfo {
    pub series_name: String,
    #[serde(default)]
    pub season_name: Option<String>,
    pub effective_episode_number: u32,
}

/// One entry of the broadcast queue
///
/// Times are epoch milliseconds. `end_time` is always derived from
/// `start_time` and the media duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedItem {
    pub media: Media,
    start_time: i64,
    end_time: i64,
    #[serde(default)]
    pub episodic_info: Option<EpisodicInfo>,
}

impl QueuedItem {
    pub fn new(media: Media) -> Self {
        let mut item = Self {
            media,
            start_time: 0,
            end_time: 0,
            episodic_info: None,
        };
        item.set_start_time(0);
        item
    }

    pub fn episodic(media: Media, info: EpisodicInfo) -> Self {
        let mut item = Self::new(media);
        item.episodic_info = Some(info);
        item
    }

    pub fn kind(&self) -> MediaKind {
        self.media.kind()
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    /// Move the item on the timeline; recomputes `end_time`
    pub fn set_start_time(&mut self, start_time: i64) {
        self.start_time = start_time;
        self.end_time = start_time.saturating_add(i64::from(self.media.duration_seconds()) * 1000);
    }
}

/// A season of a series
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Season {
    pub name: String,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

/// A series, either split into seasons or a flat list of episodes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    #[serde(default)]
    pub seasons: Vec<Season>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl Series {
    /// All season episodes in series order
    ///
    /// Seasons keep their listed order; episodes inside a season are ordered
    /// by episode number. Position `n - 1` is effective episode `n`.
    pub fn effective_episodes(&self) -> Vec<&Episode> {
        self.seasons
            .iter()
            .flat_map(|season| {
                let mut episodes: Vec<&Episode> = season.episodes.iter().collect();
                episodes.sort_by_key(|e| e.episode_number);
                episodes
            })
            .collect()
    }

    pub fn find_season(&self, name: &str) -> Option<&Season> {
        self.seasons
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
    }
}

/// Everything the library can schedule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub movies: Vec<Movie>,
    #[serde(default)]
    pub series: Vec<Series>,
}

impl Listing {
    pub fn find_series(&self, name: &str) -> Option<&Series> {
        self.series
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
    }
}
