//! Hub bootstrap configuration
//!
//! Loaded once from TOML at startup (see `tvcast_common::config` for file
//! resolution). Every field has a built-in default so an empty file, or no
//! file at all, yields a runnable hub.

use crate::error::{Error, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tvcast_common::schedule::{ScheduledBlock, ScheduledItem};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// HTTP server port
    pub port: u16,

    /// SQLite database file; `<data dir>/tvcast/tvcast.db` when unset
    pub database_path: Option<PathBuf>,

    /// Streaming endpoint agents push media to
    pub stream_url: String,

    /// Browser link appended to now-playing announcements
    pub viewer_url: Option<String>,

    /// Where commercial copies are staged before playback
    pub scratch_dir: Option<PathBuf>,

    pub timing: TimingConfig,
    pub agents: AgentAuthConfig,
    pub announce: AnnounceConfig,
    pub commercials: Vec<CommercialSource>,
    pub blocks: Vec<BlockConfig>,
    pub logging: LoggingConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_path: None,
            stream_url: "rtmp://localhost/live/tvcast".to_string(),
            viewer_url: None,
            scratch_dir: None,
            timing: TimingConfig::default(),
            agents: AgentAuthConfig::default(),
            announce: AnnounceConfig::default(),
            commercials: Vec::new(),
            blocks: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    5780
}

/// Intervals and deadlines, all in milliseconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub heartbeat_period_ms: u64,
    pub reaper_interval_ms: u64,
    pub promotion_interval_ms: u64,
    /// Gap inserted between consecutive queue items
    pub fudge_factor_ms: u64,
    pub play_timeout_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_period_ms: 15_000,
            reaper_interval_ms: 10_000,
            promotion_interval_ms: 2_000,
            fudge_factor_ms: 5_000,
            play_timeout_ms: 20_000,
            stop_timeout_ms: 10_000,
        }
    }
}

impl TimingConfig {
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    pub fn promotion_interval(&self) -> Duration {
        Duration::from_millis(self.promotion_interval_ms)
    }

    pub fn play_timeout(&self) -> Duration {
        Duration::from_millis(self.play_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentAuthConfig {
    /// Shared secret expected in `X-Agent-Password`; open when unset
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnnounceConfig {
    pub webhook_url: Option<String>,
    pub prefix: String,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            prefix: "[TV]".to_string(),
        }
    }
}

/// A commercial file on the hub's disk
#[derive(Debug, Clone, Deserialize)]
pub struct CommercialSource {
    pub path: PathBuf,
    pub duration_seconds: u32,
    #[serde(default)]
    pub name: Option<String>,
}

impl CommercialSource {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.path.display().to_string())
        })
    }
}

/// A block that fires once a day at a local wall-clock time
#[derive(Debug, Clone, Deserialize)]
pub struct BlockConfig {
    pub name: String,
    /// "HH:MM", local time
    pub daily_at: String,
    #[serde(default)]
    pub items: Vec<ScheduledItem>,
}

impl BlockConfig {
    pub fn fire_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.daily_at.trim(), "%H:%M").map_err(|e| {
            Error::Config(format!(
                "Block '{}' has invalid daily_at '{}': {}",
                self.name, self.daily_at, e
            ))
        })
    }

    pub fn to_block(&self) -> ScheduledBlock {
        ScheduledBlock {
            name: self.name.clone(),
            items: self.items.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl HubConfig {
    /// Reject settings the hub cannot run with
    pub fn validate(&self) -> Result<()> {
        let timing = &self.timing;
        for (name, value) in [
            ("timing.heartbeat_period_ms", timing.heartbeat_period_ms),
            ("timing.reaper_interval_ms", timing.reaper_interval_ms),
            ("timing.promotion_interval_ms", timing.promotion_interval_ms),
            ("timing.play_timeout_ms", timing.play_timeout_ms),
            ("timing.stop_timeout_ms", timing.stop_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }

        if self.stream_url.trim().is_empty() {
            return Err(Error::Config("stream_url must not be empty".to_string()));
        }

        for block in &self.blocks {
            block.fire_time()?;
        }

        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| tvcast_common::config::default_data_dir().join("tvcast.db"))
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| tvcast_common::config::default_data_dir().join("scratch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: HubConfig = toml::from_str("").unwrap();
        assert_eq!(config.port, 5780);
        assert_eq!(config.timing.fudge_factor_ms, 5_000);
        assert_eq!(config.timing.play_timeout(), Duration::from_secs(20));
        assert_eq!(config.announce.prefix, "[TV]");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blocks_and_commercials_parse() {
        let config: HubConfig = toml::from_str(
            r#"
            port = 6000
            stream_url = "rtmp://tv/live"

            [timing]
            fudge_factor_ms = 2000

            [[commercials]]
            path = "/ads/soda.mp4"
            duration_seconds = 30

            [[blocks]]
            name = "Saturday Morning"
            daily_at = "09:30"
            items = [
                { series = "Foo", season = "S1", commercial_break_minutes = 2 },
                { series = "Bar" },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 6000);
        assert_eq!(config.timing.fudge_factor_ms, 2000);
        assert_eq!(config.timing.heartbeat_period_ms, 15_000);
        assert_eq!(config.commercials[0].display_name(), "soda");
        let block = &config.blocks[0];
        assert_eq!(block.fire_time().unwrap(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(block.to_block().items.len(), 2);
        assert_eq!(block.items[1].season_name(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config: HubConfig = toml::from_str("[timing]\npromotion_interval_ms = 0").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_daily_at_is_rejected() {
        let config: HubConfig =
            toml::from_str("[[blocks]]\nname = \"Late\"\ndaily_at = \"25:99\"").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
