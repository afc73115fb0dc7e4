//! Programming blocks and lineup types

use crate::media::QueuedItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One pick inside a programming block
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduledItem {
    pub series: String,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub commercial_break_minutes: u32,
}

impl ScheduledItem {
    /// Season name, treating blank strings as absent
    pub fn season_name(&self) -> Option<&str> {
        self.season
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Continuation key shared by every pick of the same series and season
    pub fn progress_key(&self) -> ProgressKey {
        ProgressKey {
            series: self.series.trim().to_lowercase(),
            season: self.season_name().map(str::to_lowercase),
        }
    }
}

/// Series and season, compared case-insensitively
///
/// Break length is not part of the key: picks differing only in their
/// commercial break share episode continuation within a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgressKey {
    series: String,
    season: Option<String>,
}

/// An authored programming block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledBlock {
    pub name: String,
    #[serde(default)]
    pub items: Vec<ScheduledItem>,
}

impl ScheduledBlock {
    /// Summary of this block for a given next fire time (epoch millis)
    pub fn summary(&self, start_time: i64) -> ScheduledBlockSummary {
        let shows: BTreeSet<&str> = self.items.iter().map(|i| i.series.as_str()).collect();
        ScheduledBlockSummary {
            name: self.name.clone(),
            start_time,
            shows: shows.into_iter().map(str::to_string).collect(),
        }
    }
}

/// Forward-looking view of an upcoming block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledBlockSummary {
    pub name: String,
    /// Next fire time, epoch millis
    pub start_time: i64,
    /// Distinct series in the block
    pub shows: Vec<String>,
}

/// Read-only snapshot of what is on air and what comes next
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lineup {
    pub now_playing: Option<QueuedItem>,
    pub queue: Vec<QueuedItem>,
    pub remaining_blocks: Vec<ScheduledBlockSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn item(series: &str, season: Option<&str>, breaks: u32) -> ScheduledItem {
        ScheduledItem {
            series: series.to_string(),
            season: season.map(str::to_string),
            commercial_break_minutes: breaks,
        }
    }

    #[test]
    fn test_season_name_ignores_blank() {
        assert_eq!(item("Foo", Some("S1"), 0).season_name(), Some("S1"));
        assert_eq!(item("Foo", Some(" S1 "), 0).season_name(), Some("S1"));
        assert_eq!(item("Foo", Some("   "), 0).season_name(), None);
        assert_eq!(item("Foo", None, 0).season_name(), None);
    }

    #[test]
    fn test_equal_items_share_map_key() {
        let mut map = HashMap::new();
        map.insert(item("Foo", None, 0), 4);
        assert_eq!(map.get(&item("Foo", None, 0)), Some(&4));
        assert_eq!(map.get(&item("Foo", None, 2)), None);
    }

    #[test]
    fn test_summary_lists_distinct_series() {
        let block = ScheduledBlock {
            name: "Saturday Morning".to_string(),
            items: vec![item("Foo", None, 0), item("Bar", Some("S2"), 3), item("Foo", None, 0)],
        };

        let summary = block.summary(1_000);
        assert_eq!(summary.name, "Saturday Morning");
        assert_eq!(summary.start_time, 1_000);
        assert_eq!(summary.shows, vec!["Bar".to_string(), "Foo".to_string()]);
    }

    #[test]
    fn test_block_deserializes_with_defaults() {
        let block: ScheduledBlock = serde_json::from_str(
            r#"{"name": "Late Night", "items": [{"series": "Foo"}]}"#,
        )
        .unwrap();
        assert_eq!(block.items[0].season, None);
        assert_eq!(block.items[0].commercial_break_minutes, 0);
    }
}
