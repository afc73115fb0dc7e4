//! TVCast hub
//!
//! Coordinates remote playback agents into one continuous broadcast: a
//! single now-playing slot fed by a queue, refilled by hand or by
//! expanding scheduled programming blocks.

pub mod agents;
pub mod announce;
pub mod api;
pub mod config;
pub mod episodes;
pub mod error;
pub mod jobs;
pub mod library;
pub mod playback;
pub mod player;
pub mod schedule;
pub mod store;

pub use error::{Error, Result};
