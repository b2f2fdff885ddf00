// src/notify/mod.rs
//! Event notification delivery
//!
//! Safety and crash events are fire-and-forget: a sink that fails only
//! logs a warning and never affects the control loops that published the
//! event. The [`EventBus`] fans events out to every configured sink and
//! keeps a bounded log of recent events for the status surface.

use crate::types::RigEvent;
use crate::utils::error::RigError;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Number of events retained for `last_events()` queries
const RECENT_EVENTS_CAP: usize = 100;

/// Destination for safety and crash events
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one event; failures must be swallowed by the implementation
    async fn notify(&self, event: RigEvent);
}

/// Sink that writes events to the application log
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, event: RigEvent) {
        match &event {
            RigEvent::Safety(e) => match e.kind {
                crate::types::SafetyEventKind::EmergencyStop => {
                    log::error!("Safety event: {}", event)
                }
                _ => log::warn!("Safety event: {}", event),
            },
            RigEvent::Crash(_) => log::error!("Crash event: {}", event),
        }
    }
}

/// Sink that posts events to a Discord webhook
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    /// Creates a webhook sink for the given URL
    pub fn new(url: impl Into<String>) -> Self {
        WebhookSink {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn post(&self, event: &RigEvent) -> Result<(), RigError> {
        let body = json!({ "content": format!("⛏️ {}", event) });
        self.client
            .post(&self.url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, event: RigEvent) {
        if let Err(e) = self.post(&event).await {
            log::warn!("Webhook delivery failed: {}", e);
        }
    }
}

/// Fans events out to the configured sinks and records them
///
/// Delivery happens on detached tasks so publishing never blocks a
/// control loop on a slow sink.
pub struct EventBus {
    sinks: Vec<Arc<dyn NotificationSink>>,
    recent: Mutex<VecDeque<RigEvent>>,
}

impl EventBus {
    /// Creates a bus delivering to the given sinks
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        EventBus {
            sinks,
            recent: Mutex::new(VecDeque::with_capacity(RECENT_EVENTS_CAP)),
        }
    }

    /// Records an event and dispatches it to every sink
    pub fn publish(&self, event: RigEvent) {
        {
            let mut recent = self.recent.lock().expect("event log lock poisoned");
            if recent.len() == RECENT_EVENTS_CAP {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        for sink in &self.sinks {
            let sink = Arc::clone(sink);
            let event = event.clone();
            tokio::spawn(async move {
                sink.notify(event).await;
            });
        }
    }

    /// Returns the recorded events, oldest first
    pub fn recent(&self) -> Vec<RigEvent> {
        self.recent
            .lock()
            .expect("event log lock poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Sink that records delivered events for assertions
    pub struct RecordingSink {
        pub delivered: Mutex<Vec<RigEvent>>,
    }

    impl RecordingSink {
        pub fn new() -> Arc<Self> {
            Arc::new(RecordingSink {
                delivered: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, event: RigEvent) {
            self.delivered.lock().unwrap().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;
    use crate::types::{SafetyEvent, SafetyEventKind};
    use chrono::Utc;

    fn event(kind: SafetyEventKind) -> RigEvent {
        RigEvent::Safety(SafetyEvent {
            kind,
            gpu_index: 0,
            temperature_c: 86.0,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn publish_records_and_delivers() {
        let sink = RecordingSink::new();
        let bus = EventBus::new(vec![sink.clone()]);
        bus.publish(event(SafetyEventKind::EmergencyStop));

        // Delivery runs on a detached task
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(bus.recent().len(), 1);
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recent_log_is_bounded() {
        let bus = EventBus::new(vec![]);
        for _ in 0..(RECENT_EVENTS_CAP + 20) {
            bus.publish(event(SafetyEventKind::Warning));
        }
        assert_eq!(bus.recent().len(), RECENT_EVENTS_CAP);
    }
}
