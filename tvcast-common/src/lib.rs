//! # TVCast Common Library
//!
//! Shared code for the TVCast hub and its playback agents:
//! - Media, queue and schedule data model
//! - Agent records and heartbeat payloads
//! - Job wire types exchanged with agents
//! - Event types (TvEvent) and the EventBus
//! - Bootstrap configuration loading
//! - SQLite initialization

pub mod agent;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod jobs;
pub mod media;
pub mod schedule;
pub mod time;

pub use error::{Error, Result};
