//! Connection state machine.
//!
//! [`Controller`] is synchronous and single-owner: every method runs to
//! completion without awaiting, and callbacks are fed to it by the actor
//! task in the order they arrive. Binding is requested through a
//! [`ServiceBinder`]; its answer comes back later on the callback channel.

use std::sync::Arc;

use workbg_core::event_names::{
    CONNECTION_ESTABLISHED, CONNECTION_FAILED, CONNECTION_LOST, CONNECTION_RELEASED,
    CONNECTION_REQUESTED,
};
use workbg_core::types::{AttemptId, ConnectionId};
use workbg_events::{EventBus, LifecycleEvent};
use workbg_worker::{CallbackSender, ServiceBinder, WorkerHandle};

use super::connection::{ConnectFailure, ConnectOutcome, ConnectionState, ControllerStatus};
use super::messages::CommandOutcome;

/// Event source name for everything the controller publishes.
const SOURCE: &str = "controller";

pub struct Controller<B: ServiceBinder> {
    binder: B,
    /// Handed to the binder with every bind request.
    callbacks: CallbackSender,
    event_bus: Arc<EventBus>,
    state: ConnectionState,
    /// Attempt whose callback is still outstanding.
    pending: Option<AttemptId>,
    last_attempt: AttemptId,
    last_failure: Option<ConnectFailure>,
}

impl<B: ServiceBinder> Controller<B> {
    pub fn new(binder: B, callbacks: CallbackSender, event_bus: Arc<EventBus>) -> Self {
        Self {
            binder,
            callbacks,
            event_bus,
            state: ConnectionState::Unbound,
            pending: None,
            last_attempt: 0,
            last_failure: None,
        }
    }

    /// Ask the binder for a connection.
    ///
    /// Does nothing while bound or while another attempt is outstanding, so
    /// at most one connection is ever live. Returns the new attempt id.
    pub fn request_connect(&mut self) -> Option<AttemptId> {
        if self.state.is_bound() {
            tracing::debug!("Already bound, connect request ignored");
            return None;
        }
        if let Some(attempt) = self.pending {
            tracing::debug!(attempt, "Connect already pending");
            return None;
        }

        self.last_attempt += 1;
        let attempt = self.last_attempt;
        self.pending = Some(attempt);

        tracing::debug!(attempt, "Requesting connection");
        self.event_bus.publish(
            LifecycleEvent::new(CONNECTION_REQUESTED)
                .with_source(SOURCE)
                .with_payload(serde_json::json!({ "attempt": attempt })),
        );
        self.binder.bind(attempt, self.callbacks.clone());
        Some(attempt)
    }

    /// The binder delivered a live connection for `attempt`.
    ///
    /// A connection for an attempt that is no longer pending is released
    /// on the spot.
    pub fn on_connected(&mut self, attempt: AttemptId, handle: WorkerHandle) -> ConnectOutcome {
        let connection_id = handle.connection_id();

        if self.pending != Some(attempt) {
            tracing::debug!(attempt, connection_id, "Stale connection released");
            self.binder.unbind(connection_id);
            return ConnectOutcome::Stale;
        }

        self.pending = None;
        self.last_failure = None;
        self.state = ConnectionState::Bound(handle);

        tracing::info!(connection_id, "Service connected");
        self.event_bus.publish(
            LifecycleEvent::new(CONNECTION_ESTABLISHED)
                .with_source(SOURCE)
                .with_connection(connection_id),
        );
        ConnectOutcome::Connected { connection_id }
    }

    /// The connection was lost without the controller releasing it.
    ///
    /// Clears the handle without stopping the worker. Returns whether the
    /// notice applied to the current connection.
    pub fn on_disconnected(&mut self, connection_id: ConnectionId) -> bool {
        if self.state.connection_id() != Some(connection_id) {
            tracing::debug!(connection_id, "Disconnect for unknown connection ignored");
            return false;
        }

        self.state = ConnectionState::Unbound;
        tracing::warn!(connection_id, "Service disconnected");
        self.event_bus.publish(
            LifecycleEvent::new(CONNECTION_LOST)
                .with_source(SOURCE)
                .with_connection(connection_id),
        );
        true
    }

    /// The binder could not satisfy `attempt`.
    pub fn on_connect_failed(&mut self, attempt: AttemptId, reason: String) -> ConnectOutcome {
        if self.pending != Some(attempt) {
            tracing::debug!(attempt, "Failure for attempt that is not pending ignored");
            return ConnectOutcome::Stale;
        }

        self.pending = None;
        tracing::warn!(attempt, %reason, "Connection failed");
        self.event_bus.publish(
            LifecycleEvent::new(CONNECTION_FAILED)
                .with_source(SOURCE)
                .with_payload(serde_json::json!({ "attempt": attempt, "reason": reason })),
        );
        self.last_failure = Some(ConnectFailure {
            attempt,
            reason: reason.clone(),
        });
        ConnectOutcome::Failed { attempt, reason }
    }

    /// No callback arrived for `attempt` in time.
    ///
    /// A connection delivered afterwards is stale and gets released.
    pub fn on_connect_timeout(&mut self, attempt: AttemptId) -> ConnectOutcome {
        self.on_connect_failed(attempt, "timed out waiting for the service".to_string())
    }

    /// Forward a start to the worker, or request a connection when unbound.
    ///
    /// The command is not queued: after connecting, the user has to start
    /// again.
    pub fn start(&mut self) -> CommandOutcome {
        if let Some(handle) = self.state.handle() {
            handle.service().start();
            return CommandOutcome::Forwarded;
        }

        match self.request_connect() {
            Some(_) => CommandOutcome::ConnectRequested,
            None => CommandOutcome::Dropped,
        }
    }

    /// Stop the worker, then release the connection.
    pub fn stop(&mut self) -> CommandOutcome {
        let Some(handle) = self.state.handle() else {
            tracing::debug!("Not bound, stop ignored");
            return CommandOutcome::Dropped;
        };

        handle.service().stop();
        self.release();
        CommandOutcome::Forwarded
    }

    /// Drop any pending attempt and release the connection, if any.
    ///
    /// Safe to call any number of times. Returns whether a connection was
    /// released.
    pub fn teardown(&mut self) -> bool {
        if let Some(attempt) = self.pending.take() {
            tracing::debug!(attempt, "Pending connect abandoned");
        }
        self.release()
    }

    fn release(&mut self) -> bool {
        let ConnectionState::Bound(handle) = std::mem::take(&mut self.state) else {
            return false;
        };

        let connection_id = handle.connection_id();
        self.binder.unbind(connection_id);
        tracing::info!(connection_id, "Connection released");
        self.event_bus.publish(
            LifecycleEvent::new(CONNECTION_RELEASED)
                .with_source(SOURCE)
                .with_connection(connection_id),
        );
        true
    }

    pub fn is_bound(&self) -> bool {
        self.state.is_bound()
    }

    pub fn pending_attempt(&self) -> Option<AttemptId> {
        self.pending
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            bound: self.state.is_bound(),
            connection_id: self.state.connection_id(),
            pending_attempt: self.pending,
            last_failure: self.last_failure.clone(),
        }
    }
}
