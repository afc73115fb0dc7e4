//! Episodic Scheduler
//!
//! Picks the next episode of a series for a scheduled item. Two modes:
//!
//! - **Season-bounded** (item names a season, or the series has no seasons):
//!   raw episode numbers, scanning forward from the continuation counter
//!   and wrapping to the lowest number past the end.
//! - **Flattened** (series has seasons, item names none): the counter is a
//!   1-based position into all seasons' episodes concatenated in order.
//!
//! The continuation counter comes from the block's progress map when the
//! same series and season were already resolved during this expansion,
//! otherwise from the persisted episode-progress store.

use crate::error::{Error, Result};
use crate::store::EpisodeProgressStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use tvcast_common::media::{Episode, EpisodicInfo, Series};
use tvcast_common::schedule::{ProgressKey, ScheduledItem};

/// Next episode number per series and season, for one block expansion
pub type ProgressMap = HashMap<ProgressKey, u32>;

/// An episode picked for airing plus its continuation bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEpisode {
    pub episode: Episode,
    pub info: EpisodicInfo,
}

pub struct EpisodicScheduler {
    progress: Arc<dyn EpisodeProgressStore>,
}

impl EpisodicScheduler {
    pub fn new(progress: Arc<dyn EpisodeProgressStore>) -> Self {
        Self { progress }
    }

    async fn starting_number(
        &self,
        item: &ScheduledItem,
        progress: &ProgressMap,
        series_name: &str,
        season_name: Option<&str>,
    ) -> Result<u32> {
        match progress.get(&item.progress_key()) {
            Some(&n) => Ok(n),
            None => self.progress.get_current_episode(series_name, season_name).await,
        }
    }

    /// Season-bounded resolution over raw episode numbers
    ///
    /// Records `chosen + 1` in `progress[item]`. Returns `None` when there
    /// are no candidates.
    pub async fn resolve_next_episode(
        &self,
        item: &ScheduledItem,
        progress: &mut ProgressMap,
        series_name: &str,
        season_name: Option<&str>,
        candidates: &[Episode],
    ) -> Result<Option<ResolvedEpisode>> {
        // Duplicate numbers keep the last listed episode
        let by_number: BTreeMap<u32, &Episode> =
            candidates.iter().map(|e| (e.episode_number, e)).collect();

        let start = self.starting_number(item, progress, series_name, season_name).await?;

        let chosen = match by_number.range(start..).next() {
            Some((_, episode)) => *episode,
            None => match by_number.values().next() {
                Some(episode) => {
                    debug!(series = series_name, start, "Wrapping to first episode");
                    *episode
                }
                None => return Ok(None),
            },
        };

        progress.insert(item.progress_key(), chosen.episode_number.saturating_add(1));

        Ok(Some(ResolvedEpisode {
            episode: chosen.clone(),
            info: EpisodicInfo {
                series_name: series_name.to_string(),
                season_name: season_name.map(str::to_string),
                effective_episode_number: chosen.episode_number,
            },
        }))
    }

    /// Flattened resolution by position across all seasons
    ///
    /// A counter outside `1..=len` restarts at the first episode.
    pub async fn resolve_flattened(
        &self,
        item: &ScheduledItem,
        progress: &mut ProgressMap,
        series: &Series,
    ) -> Result<Option<ResolvedEpisode>> {
        let episodes = series.effective_episodes();
        if episodes.is_empty() {
            return Ok(None);
        }

        let mut current = self.starting_number(item, progress, &series.name, None).await?;
        let in_range = usize::try_from(current)
            .map(|n| n >= 1 && n <= episodes.len())
            .unwrap_or(false);
        if !in_range {
            debug!(series = %series.name, current, "Flattened counter out of range, restarting");
            current = 1;
        }

        let chosen = episodes[(current - 1) as usize];
        progress.insert(item.progress_key(), current + 1);

        Ok(Some(ResolvedEpisode {
            episode: chosen.clone(),
            info: EpisodicInfo {
                series_name: series.name.clone(),
                season_name: None,
                effective_episode_number: current,
            },
        }))
    }

    /// Resolve `item` against a library series, choosing the mode
    ///
    /// # Errors
    /// `NotFound` when the item names a season the series does not have.
    pub async fn resolve_for_item(
        &self,
        item: &ScheduledItem,
        progress: &mut ProgressMap,
        series: &Series,
    ) -> Result<Option<ResolvedEpisode>> {
        match item.season_name() {
            Some(season_name) => {
                let season = series.find_season(season_name).ok_or_else(|| {
                    Error::NotFound(format!("Season '{}' of '{}'", season_name, series.name))
                })?;
                self.resolve_next_episode(
                    item,
                    progress,
                    &series.name,
                    Some(&season.name),
                    &season.episodes,
                )
                .await
            }
            None if series.seasons.is_empty() => {
                self.resolve_next_episode(item, progress, &series.name, None, &series.episodes)
                    .await
            }
            None => self.resolve_flattened(item, progress, series).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tvcast_common::media::Season;

    fn episode(id: u64, season: Option<&str>, number: u32) -> Episode {
        Episode {
            id,
            agent_id: "A1".to_string(),
            name: format!("Episode {}", number),
            series_name: "Foo".to_string(),
            season_name: season.map(str::to_string),
            episode_number: number,
            duration_seconds: 1200,
        }
    }

    fn item(season: Option<&str>) -> ScheduledItem {
        ScheduledItem {
            series: "Foo".to_string(),
            season: season.map(str::to_string),
            commercial_break_minutes: 0,
        }
    }

    fn seasoned_series() -> Series {
        Series {
            name: "Foo".to_string(),
            seasons: vec![
                Season {
                    name: "S1".to_string(),
                    episodes: vec![episode(2, Some("S1"), 2), episode(1, Some("S1"), 1)],
                },
                Season {
                    name: "S2".to_string(),
                    episodes: vec![episode(3, Some("S2"), 1), episode(4, Some("S2"), 2)],
                },
            ],
            episodes: Vec::new(),
        }
    }

    fn scheduler() -> (EpisodicScheduler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (EpisodicScheduler::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_scan_skips_gaps_and_advances_progress() {
        let (scheduler, store) = scheduler();
        store.set_current_episode("Foo", Some("S1"), 3).await.unwrap();
        let candidates = vec![episode(1, Some("S1"), 1), episode(5, Some("S1"), 5), episode(7, Some("S1"), 7)];
        let item = item(Some("S1"));
        let mut progress = ProgressMap::new();

        let first = scheduler
            .resolve_next_episode(&item, &mut progress, "Foo", Some("S1"), &candidates)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.episode.episode_number, 5);
        assert_eq!(progress[&item.progress_key()], 6);

        let second = scheduler
            .resolve_next_episode(&item, &mut progress, "Foo", Some("S1"), &candidates)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.episode.episode_number, 7);
        assert_eq!(second.info.effective_episode_number, 7);
    }

    #[tokio::test]
    async fn test_past_the_end_wraps_to_lowest() {
        let (scheduler, store) = scheduler();
        store.set_current_episode("Foo", Some("S1"), 9).await.unwrap();
        let candidates = vec![episode(3, Some("S1"), 3), episode(2, Some("S1"), 2)];
        let item = item(Some("S1"));
        let mut progress = ProgressMap::new();

        let resolved = scheduler
            .resolve_next_episode(&item, &mut progress, "Foo", Some("S1"), &candidates)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.episode.episode_number, 2);
        assert_eq!(progress[&item.progress_key()], 3);
    }

    #[tokio::test]
    async fn test_resolution_is_deterministic() {
        let (scheduler, _) = scheduler();
        let candidates = vec![episode(1, None, 1), episode(2, None, 2)];
        let item = item(None);

        let mut a = ProgressMap::new();
        a.insert(item.progress_key(), 2);
        let mut b = a.clone();

        let ra = scheduler.resolve_next_episode(&item, &mut a, "Foo", None, &candidates).await.unwrap();
        let rb = scheduler.resolve_next_episode(&item, &mut b, "Foo", None, &candidates).await.unwrap();
        assert_eq!(ra, rb);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_picks_of_same_season_share_progress() {
        let (scheduler, _) = scheduler();
        let candidates = vec![episode(1, Some("S1"), 1), episode(2, Some("S1"), 2)];
        let first = item(Some("S1"));
        let second = ScheduledItem {
            series: " foo ".to_string(),
            season: Some("s1".to_string()),
            commercial_break_minutes: 2,
        };
        let mut progress = ProgressMap::new();

        let a = scheduler
            .resolve_next_episode(&first, &mut progress, "Foo", Some("S1"), &candidates)
            .await
            .unwrap()
            .unwrap();
        let b = scheduler
            .resolve_next_episode(&second, &mut progress, "Foo", Some("S1"), &candidates)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.episode.episode_number, 1);
        assert_eq!(b.episode.episode_number, 2);
        assert_eq!(progress.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_numbers_keep_last_listed() {
        let (scheduler, _) = scheduler();
        let candidates = vec![episode(10, None, 1), episode(11, None, 1)];
        let mut progress = ProgressMap::new();

        let resolved = scheduler
            .resolve_next_episode(&item(None), &mut progress, "Foo", None, &candidates)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.episode.id, 11);
    }

    #[tokio::test]
    async fn test_no_candidates_resolves_nothing() {
        let (scheduler, _) = scheduler();
        let mut progress = ProgressMap::new();
        let resolved = scheduler
            .resolve_next_episode(&item(None), &mut progress, "Foo", None, &[])
            .await
            .unwrap();
        assert!(resolved.is_none());
        assert!(progress.is_empty());
    }

    #[tokio::test]
    async fn test_flattened_indexes_across_seasons() {
        let (scheduler, store) = scheduler();
        store.set_current_episode("Foo", None, 3).await.unwrap();
        let series = seasoned_series();
        let item = item(None);
        let mut progress = ProgressMap::new();

        // Position 3 is S2 episode 1
        let resolved = scheduler.resolve_for_item(&item, &mut progress, &series).await.unwrap().unwrap();
        assert_eq!(resolved.episode.id, 3);
        assert_eq!(resolved.info.effective_episode_number, 3);
        assert_eq!(resolved.info.season_name, None);
        assert_eq!(progress[&item.progress_key()], 4);

        let resolved = scheduler.resolve_for_item(&item, &mut progress, &series).await.unwrap().unwrap();
        assert_eq!(resolved.episode.id, 4);

        // Past the end restarts at position 1 (S1 episode 1)
        let resolved = scheduler.resolve_for_item(&item, &mut progress, &series).await.unwrap().unwrap();
        assert_eq!(resolved.episode.id, 1);
        assert_eq!(progress[&item.progress_key()], 2);
    }

    #[tokio::test]
    async fn test_named_season_uses_raw_numbers() {
        let (scheduler, _) = scheduler();
        let series = seasoned_series();
        let item = item(Some(" s2 "));
        let mut progress = ProgressMap::new();

        let resolved = scheduler.resolve_for_item(&item, &mut progress, &series).await.unwrap().unwrap();
        assert_eq!(resolved.episode.id, 3);
        assert_eq!(resolved.info.season_name.as_deref(), Some("S2"));
        assert_eq!(resolved.info.effective_episode_number, 1);
    }

    #[tokio::test]
    async fn test_unknown_season_is_not_found() {
        let (scheduler, _) = scheduler();
        let mut progress = ProgressMap::new();
        let result = scheduler
            .resolve_for_item(&item(Some("S9")), &mut progress, &seasoned_series())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
