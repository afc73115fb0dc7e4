//! Media library
//!
//! Agents report what they hold; the hub aggregates those inventories into
//! one listing. Commercials live on the hub and are copied into a scratch
//! directory for each airing so the played copy can be deleted afterwards.

use crate::config::CommercialSource;
use crate::error::{Error, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};
use tvcast_common::media::{Commercial, Listing, Media, MediaId, Series, LOCAL_AGENT_ID};

#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Everything currently schedulable
    async fn listings(&self) -> Result<Listing>;

    /// A fresh commercial whose backing file the caller owns
    async fn commercial(&self) -> Result<Commercial>;

    async fn find_media(&self, agent_id: &str, media_id: MediaId) -> Result<Media>;
}

pub struct InventoryLibrary {
    inventories: RwLock<HashMap<String, Listing>>,
    commercials: Vec<CommercialSource>,
    scratch_dir: PathBuf,
    next_commercial_id: AtomicU64,
}

impl InventoryLibrary {
    pub fn new(commercials: Vec<CommercialSource>, scratch_dir: PathBuf) -> Self {
        Self {
            inventories: RwLock::new(HashMap::new()),
            commercials,
            scratch_dir,
            next_commercial_id: AtomicU64::new(1),
        }
    }

    /// Replace the inventory reported by `agent_id`
    ///
    /// Ownership and series/season names on every item are overwritten from
    /// the agent id and the enclosing series/season. Returns the number of
    /// playable items.
    pub async fn update_inventory(&self, agent_id: &str, mut listing: Listing) -> usize {
        for movie in &mut listing.movies {
            movie.agent_id = agent_id.to_string();
        }
        for series in &mut listing.series {
            for episode in &mut series.episodes {
                episode.agent_id = agent_id.to_string();
                episode.series_name = series.name.clone();
                episode.season_name = None;
            }
            for season in &mut series.seasons {
                for episode in &mut season.episodes {
                    episode.agent_id = agent_id.to_string();
                    episode.series_name = series.name.clone();
                    episode.season_name = Some(season.name.clone());
                }
            }
        }

        let count = listing.movies.len()
            + listing
                .series
                .iter()
                .map(|s| s.episodes.len() + s.seasons.iter().map(|x| x.episodes.len()).sum::<usize>())
                .sum::<usize>();

        info!(agent_id, movies = listing.movies.len(), series = listing.series.len(), "Inventory updated");
        self.inventories
            .write()
            .await
            .insert(agent_id.to_string(), listing);
        count
    }

    pub async fn remove_inventory(&self, agent_id: &str) -> bool {
        self.inventories.write().await.remove(agent_id).is_some()
    }
}

/// Fold `incoming` into `merged`, joining series and seasons by name
fn merge_series(merged: &mut Vec<Series>, incoming: &Series) {
    let existing = merged
        .iter_mut()
        .find(|s| s.name.eq_ignore_ascii_case(&incoming.name));

    let Some(target) = existing else {
        merged.push(incoming.clone());
        return;
    };

    target.episodes.extend(incoming.episodes.iter().cloned());
    for season in &incoming.seasons {
        match target
            .seasons
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(&season.name))
        {
            Some(existing) => existing.episodes.extend(season.episodes.iter().cloned()),
            None => target.seasons.push(season.clone()),
        }
    }
}

#[async_trait]
impl MediaLibrary for InventoryLibrary {
    async fn listings(&self) -> Result<Listing> {
        let inventories = self.inventories.read().await;

        // Agent order is fixed so merged listings are stable
        let mut agent_ids: Vec<&String> = inventories.keys().collect();
        agent_ids.sort();

        let mut listing = Listing::default();
        for agent_id in agent_ids {
            let inventory = &inventories[agent_id];
            listing.movies.extend(inventory.movies.iter().cloned());
            for series in &inventory.series {
                merge_series(&mut listing.series, series);
            }
        }
        Ok(listing)
    }

    async fn commercial(&self) -> Result<Commercial> {
        let source = {
            let mut rng = rand::thread_rng();
            self.commercials.choose(&mut rng).cloned()
        }
        .ok_or_else(|| Error::Library("No commercials configured".to_string()))?;

        let id = self.next_commercial_id.fetch_add(1, Ordering::Relaxed);
        let extension = source
            .path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let file_path = self.scratch_dir.join(format!("commercial-{}{}", id, extension));

        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        tokio::fs::copy(&source.path, &file_path).await.map_err(|e| {
            Error::Library(format!("Copying commercial {}: {}", source.path.display(), e))
        })?;
        debug!(id, path = %file_path.display(), "Staged commercial");

        Ok(Commercial {
            id,
            agent_id: LOCAL_AGENT_ID.to_string(),
            name: source.display_name(),
            file_path,
            duration_seconds: source.duration_seconds,
        })
    }

    async fn find_media(&self, agent_id: &str, media_id: MediaId) -> Result<Media> {
        let inventories = self.inventories.read().await;
        let not_found = || Error::NotFound(format!("Media {} on agent {}", media_id, agent_id));
        let inventory = inventories.get(agent_id).ok_or_else(not_found)?;

        if let Some(movie) = inventory.movies.iter().find(|m| m.id == media_id) {
            return Ok(Media::Movie(movie.clone()));
        }

        inventory
            .series
            .iter()
            .flat_map(|s| {
                s.episodes
                    .iter()
                    .chain(s.seasons.iter().flat_map(|season| season.episodes.iter()))
            })
            .find(|e| e.id == media_id)
            .map(|e| Media::Episode(e.clone()))
            .ok_or_else(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tvcast_common::media::{Episode, Movie, Season};

    fn episode(id: MediaId, number: u32) -> Episode {
        Episode {
            id,
            agent_id: String::new(),
            name: format!("Ep {}", number),
            series_name: String::new(),
            season_name: None,
            episode_number: number,
            duration_seconds: 1500,
        }
    }

    fn inventory() -> Listing {
        Listing {
            movies: vec![Movie {
                id: 1,
                agent_id: String::new(),
                name: "Heat".to_string(),
                duration_seconds: 10_200,
            }],
            series: vec![Series {
                name: "Foo".to_string(),
                seasons: vec![Season {
                    name: "S1".to_string(),
                    episodes: vec![episode(10, 1), episode(11, 2)],
                }],
                episodes: Vec::new(),
            }],
        }
    }

    #[tokio::test]
    async fn test_inventory_items_are_stamped_with_owner() {
        let library = InventoryLibrary::new(Vec::new(), std::env::temp_dir());
        assert_eq!(library.update_inventory("A1", inventory()).await, 3);

        match library.find_media("A1", 11).await.unwrap() {
            Media::Episode(e) => {
                assert_eq!(e.agent_id, "A1");
                assert_eq!(e.series_name, "Foo");
                assert_eq!(e.season_name.as_deref(), Some("S1"));
            }
            other => panic!("expected episode, got {:?}", other),
        }
        assert!(matches!(library.find_media("A1", 1).await.unwrap(), Media::Movie(_)));
        assert!(matches!(library.find_media("A2", 1).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_listings_merge_series_across_agents() {
        let library = InventoryLibrary::new(Vec::new(), std::env::temp_dir());
        library.update_inventory("A1", inventory()).await;

        let mut other = inventory();
        other.series[0].name = "FOO".to_string();
        other.series[0].seasons[0].episodes = vec![episode(20, 3)];
        library.update_inventory("A2", other).await;

        let listing = library.listings().await.unwrap();
        assert_eq!(listing.movies.len(), 2);
        let series = listing.find_series("foo").unwrap();
        assert_eq!(series.seasons.len(), 1);
        assert_eq!(series.seasons[0].episodes.len(), 3);
    }

    #[tokio::test]
    async fn test_commercial_is_copied_to_scratch_with_fresh_ids() {
        let sources = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let path = sources.path().join("soda.mp4");
        std::fs::write(&path, b"not really video").unwrap();

        let library = InventoryLibrary::new(
            vec![CommercialSource {
                path: path.clone(),
                duration_seconds: 30,
                name: None,
            }],
            scratch.path().to_path_buf(),
        );

        let first = library.commercial().await.unwrap();
        let second = library.commercial().await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(first.agent_id, LOCAL_AGENT_ID);
        assert_eq!(first.name, "soda");
        assert!(first.file_path.starts_with(scratch.path()));
        assert!(first.file_path.exists());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_no_commercials_is_a_library_error() {
        let library = InventoryLibrary::new(Vec::new(), std::env::temp_dir());
        assert!(matches!(library.commercial().await, Err(Error::Library(_))));
    }
}
