//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`LifecycleEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use workbg_core::types::{ConnectionId, Timestamp};

// ---------------------------------------------------------------------------
// LifecycleEvent
// ---------------------------------------------------------------------------

/// Something that happened to a connection, the worker, or a download.
///
/// Constructed via [`LifecycleEvent::new`] and enriched with the builder
/// methods [`with_source`](LifecycleEvent::with_source),
/// [`with_connection`](LifecycleEvent::with_connection), and
/// [`with_payload`](LifecycleEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Dot-separated event name, see `workbg_core::event_names`.
    pub event_type: String,

    /// Component that emitted the event (e.g. `"controller"`, `"worker"`).
    pub source: Option<String>,

    /// Connection the event concerns, if any.
    pub connection_id: Option<ConnectionId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl LifecycleEvent {
    /// Create a new event with only the required `event_type`.
    ///
    /// All optional fields default to `None` / empty object.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source: None,
            connection_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Name the emitting component.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach the connection the event concerns.
    pub fn with_connection(mut self, connection_id: ConnectionId) -> Self {
        self.connection_id = Some(connection_id);
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Events buffered per subscriber before the slowest one starts lagging.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out hub for [`LifecycleEvent`]s.
///
/// Every subscriber sees every event published after it subscribed.
/// Publishing never blocks and never fails; with nobody listening the
/// event is simply gone.
///
/// ```rust
/// use workbg_events::bus::{EventBus, LifecycleEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(LifecycleEvent::new("worker.started").with_source("worker"));
/// assert_eq!(rx.try_recv().unwrap().event_type, "worker.started");
/// ```
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Bus whose subscribers each buffer up to `capacity` events. A
    /// subscriber that falls further behind gets `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// Returns how many subscribers it reached.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        tracing::trace!(event_type = %event.event_type, source = ?event.source, "Publishing event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_every_field() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            LifecycleEvent::new("connection.established")
                .with_source("controller")
                .with_connection(3)
                .with_payload(serde_json::json!({"attempt": 1})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "connection.established");
        assert_eq!(received.source.as_deref(), Some("controller"));
        assert_eq!(received.connection_id, Some(3));
        assert_eq!(received.payload["attempt"], 1);
    }

    #[test]
    fn publish_reports_reach() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(LifecycleEvent::new("worker.created")), 0);

        let _a = bus.subscribe();
        let _b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        assert_eq!(bus.publish(LifecycleEvent::new("worker.created")), 2);
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::default();
        bus.publish(LifecycleEvent::new("worker.created"));

        let mut rx = bus.subscribe();
        bus.publish(LifecycleEvent::new("worker.bound"));

        assert_eq!(rx.try_recv().unwrap().event_type, "worker.bound");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for name in ["a", "b", "c"] {
            bus.publish(LifecycleEvent::new(name));
        }

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
        assert_eq!(rx.try_recv().unwrap().event_type, "b");
    }

    #[test]
    fn new_event_has_empty_optional_fields() {
        let event = LifecycleEvent::new("bare.event");
        assert!(event.source.is_none());
        assert!(event.connection_id.is_none());
        assert!(event.payload.is_object());
    }
}
