//! Playback coordination
//!
//! - `coordinator`: the now-playing slot, the queue, and block expansion
//! - `promotion`: background loop feeding the slot from the queue

mod coordinator;
mod promotion;

pub use coordinator::{CoordinatorSettings, PlaybackCoordinator};
pub use promotion::spawn_promotion_loop;
