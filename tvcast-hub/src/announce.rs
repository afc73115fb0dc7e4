//! Announcement sinks
//!
//! Announcements are fire-and-forget: a failing sink is logged and never
//! surfaces to the playback path.

use serde_json::json;
use tracing::{info, warn};
use tvcast_common::events::{EventBus, TvEvent};

pub trait Announcer: Send + Sync {
    fn announce(&self, text: &str);
}

/// Publishes announcements on the event bus
pub struct EventAnnouncer {
    events: EventBus,
    prefix: String,
}

impl EventAnnouncer {
    pub fn new(events: EventBus, prefix: impl Into<String>) -> Self {
        Self {
            events,
            prefix: prefix.into(),
        }
    }

    fn format(&self, text: &str) -> String {
        if self.prefix.is_empty() {
            text.to_string()
        } else {
            format!("{} {}", self.prefix, text)
        }
    }
}

impl Announcer for EventAnnouncer {
    fn announce(&self, text: &str) {
        let text = self.format(text);
        info!("Announcement: {}", text);
        self.events.emit_lossy(TvEvent::Announcement {
            text,
            timestamp: tvcast_common::time::now(),
        });
    }
}

/// Event-bus announcer that also posts `{"content": text}` to a webhook
pub struct WebhookAnnouncer {
    inner: EventAnnouncer,
    client: reqwest::Client,
    url: String,
}

impl WebhookAnnouncer {
    pub fn new(inner: EventAnnouncer, url: impl Into<String>) -> Self {
        Self {
            inner,
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl Announcer for WebhookAnnouncer {
    fn announce(&self, text: &str) {
        self.inner.announce(text);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available, webhook announcement dropped");
            return;
        };

        let request = self
            .client
            .post(&self.url)
            .json(&json!({ "content": self.inner.format(text) }));
        let url = self.url.clone();
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!("Webhook {} rejected announcement: {}", url, response.status()),
                Err(e) => warn!("Webhook {} unreachable: {}", url, e),
            }
        });
    }
}
