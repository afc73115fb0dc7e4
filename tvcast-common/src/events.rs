//! Event types for the TVCast event system
//!
//! Provides the shared event enum and the EventBus used by the hub to fan
//! events out to SSE clients and announcement sinks.

use crate::media::{Media, MediaId};
use crate::schedule::ScheduledBlockSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// TVCast event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TvEvent {
    /// Agent sent its first heartbeat since it was last offline
    AgentOnline {
        agent_id: String,
        source_address: String,
        timestamp: DateTime<Utc>,
    },

    /// Agent reaped for missing heartbeats
    AgentOffline {
        agent_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Agent blacklisted and evicted from the online set
    AgentBlacklisted {
        agent_id: String,
        timestamp: DateTime<Utc>,
    },

    /// An agent confirmed it started streaming
    NowPlaying {
        media: Media,
        /// Agent-reported start, epoch millis
        start_time: i64,
        end_time: i64,
        timestamp: DateTime<Utc>,
    },

    /// The now-playing slot was cleared
    PlaybackStopped {
        media_id: MediaId,
        timestamp: DateTime<Utc>,
    },

    /// Queue contents changed (notification only)
    QueueChanged {
        queue_len: usize,
        timestamp: DateTime<Utc>,
    },

    /// A scheduled block preempted playback and was expanded
    BlockStarted {
        block: ScheduledBlockSummary,
        items: usize,
        timestamp: DateTime<Utc>,
    },

    /// Free-form text for chat/notification surfaces
    Announcement {
        text: String,
        timestamp: DateTime<Utc>,
    },
}

impl TvEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            TvEvent::AgentOnline { .. } => "AgentOnline",
            TvEvent::AgentOffline { .. } => "AgentOffline",
            TvEvent::AgentBlacklisted { .. } => "AgentBlacklisted",
            TvEvent::NowPlaying { .. } => "NowPlaying",
            TvEvent::PlaybackStopped { .. } => "PlaybackStopped",
            TvEvent::QueueChanged { .. } => "QueueChanged",
            TvEvent::BlockStarted { .. } => "BlockStarted",
            TvEvent::Announcement { .. } => "Announcement",
        }
    }
}

/// Broadcast bus for TvEvents
///
/// Cloning the bus shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TvEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TvEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: TvEvent) -> Result<usize, broadcast::error::SendError<TvEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TvEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(TvEvent::AgentOffline {
            agent_id: "A1".to_string(),
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            TvEvent::AgentOffline { agent_id, .. } => assert_eq!(agent_id, "A1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_errors_but_lossy_does_not() {
        let bus = EventBus::new(4);
        let event = TvEvent::QueueChanged {
            queue_len: 0,
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 4);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = TvEvent::Announcement {
            text: "hello".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Announcement");
        assert_eq!(event.event_type(), "Announcement");
    }
}
