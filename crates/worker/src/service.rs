//! The worker service.
//!
//! [`WorkerService`] keeps no state of its own. Every hook and command is
//! logged and published on the event bus; that record is the only effect.

use std::fmt;
use std::sync::Arc;

use workbg_core::event_names::{WORKER_BOUND, WORKER_STARTED, WORKER_STOPPED, WORKER_UNBOUND};
use workbg_core::types::ConnectionId;
use workbg_events::{EventBus, LifecycleEvent};

/// Event source name for everything the worker publishes.
const SOURCE: &str = "worker";

/// The backgroundable worker reached through a [`WorkerHandle`](crate::binder::WorkerHandle).
pub struct WorkerService {
    event_bus: Arc<EventBus>,
}

impl WorkerService {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self { event_bus }
    }

    /// Called by the host when a connection to this worker is established.
    pub fn on_bind(&self, connection_id: ConnectionId) {
        tracing::debug!(connection_id, "Service bound");
        self.event_bus.publish(
            LifecycleEvent::new(WORKER_BOUND)
                .with_source(SOURCE)
                .with_connection(connection_id),
        );
    }

    /// Called by the host once the last connection has been released.
    ///
    /// Returns whether the worker wants to be told about later rebinds,
    /// which it never does.
    pub fn on_unbind(&self) -> bool {
        tracing::debug!("Service unbound");
        self.event_bus
            .publish(LifecycleEvent::new(WORKER_UNBOUND).with_source(SOURCE));
        false
    }

    /// Record that a start was requested.
    pub fn start(&self) {
        tracing::info!("Service started");
        self.event_bus
            .publish(LifecycleEvent::new(WORKER_STARTED).with_source(SOURCE));
    }

    /// Record that a stop was requested.
    pub fn stop(&self) {
        tracing::info!("Service stopped");
        self.event_bus
            .publish(LifecycleEvent::new(WORKER_STOPPED).with_source(SOURCE));
    }
}

impl fmt::Debug for WorkerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerService").finish_non_exhaustive()
    }
}
