//! Local stream player for commercials

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use tvcast_common::media::Commercial;

/// How a local playback ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Finished,
    Failed(String),
}

/// Streams a hub-local file to the broadcast endpoint, returning when done
#[async_trait]
pub trait StreamPlayer: Send + Sync {
    async fn play(&self, commercial: &Commercial, target_url: &str) -> PlayOutcome;
}

/// Pushes files with an external `ffmpeg` process at native frame rate
pub struct FfmpegPlayer {
    program: String,
}

impl FfmpegPlayer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, commercial: &Commercial, target_url: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-re")
            .arg("-i")
            .arg(&commercial.file_path)
            .args(["-c", "copy", "-f", "flv"])
            .arg(target_url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

impl Default for FfmpegPlayer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl StreamPlayer for FfmpegPlayer {
    async fn play(&self, commercial: &Commercial, target_url: &str) -> PlayOutcome {
        debug!(path = %commercial.file_path.display(), target_url, "Starting {}", self.program);

        match self.command(commercial, target_url).status().await {
            Ok(status) if status.success() => {
                info!(commercial = %commercial.name, "Commercial stream ended normally");
                PlayOutcome::Finished
            }
            Ok(status) => PlayOutcome::Failed(format!("{} exited with {}", self.program, status)),
            Err(e) => PlayOutcome::Failed(format!("Failed to run {}: {}", self.program, e)),
        }
    }
}
