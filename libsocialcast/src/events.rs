//! Pipeline events for downstream consumers
//!
//! The engine emits [`Event`]s through an [`EventSink`]. Two sinks ship
//! with the crate: an in-process [`EventBus`] over a tokio broadcast
//! channel, and [`TracingEventSink`] which writes each event to the log.
//!
//! ```no_run
//! use libsocialcast::events::EventBus;
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{}: {}", event.name, event.payload);
//! }
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;

use crate::collaborators::EventSink;
use crate::error::Result;

pub const POST_PUBLISHED: &str = "post.published";
pub const POST_PUBLISH_FAILED: &str = "post.publish_failed";
pub const SCHEDULE_CANCELLED: &str = "schedule.cancelled";

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub payload: Value,
}

/// In-process broadcast of pipeline events.
///
/// Emitting never blocks: with no subscribers the event is dropped, and a
/// lagging subscriber loses the oldest events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn publish(&self, event: &str, payload: Value) -> Result<()> {
        self.emit(Event {
            name: event.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Sink that records events in the log under the `socialcast::events` target
#[derive(Debug, Clone, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: &str, payload: Value) -> Result<()> {
        info!(target: "socialcast::events", event, %payload, "event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_bus_delivers_to_all_subscribers() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(POST_PUBLISHED, json!({"post_id": "p1"}))
            .await
            .unwrap();

        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "post.published");
        assert_eq!(a.payload["post_id"], "p1");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new(10);
        assert!(bus
            .publish(SCHEDULE_CANCELLED, json!({"schedule_id": "s1"}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block() {
        let bus = EventBus::new(2);
        let mut receiver = bus.subscribe();

        for i in 0..5 {
            bus.emit(Event {
                name: POST_PUBLISH_FAILED.to_string(),
                payload: json!({ "n": i }),
            });
        }

        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let sink = TracingEventSink;
        assert!(sink.publish(POST_PUBLISHED, json!({})).await.is_ok());
    }
}
