//! Service host: the platform side of the connection handshake.
//!
//! [`ServiceHost`] owns at most one [`WorkerService`] and the registry of
//! live connections to it. Binding creates the worker on demand; releasing
//! the last connection destroys it. Callbacks are always delivered from a
//! spawned task, never from inside [`ServiceBinder::bind`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use workbg_core::event_names::{WORKER_CREATED, WORKER_DESTROYED};
use workbg_core::types::{AttemptId, ConnectionId};
use workbg_events::{EventBus, LifecycleEvent};

use crate::binder::{CallbackSender, ConnectionCallback, ServiceBinder, WorkerHandle};
use crate::service::WorkerService;

/// Event source name for everything the host publishes.
const SOURCE: &str = "host";

/// Tunable parameters for the host.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    /// Delay between a bind request and its callback.
    pub bind_latency: Duration,
}

/// In-process stand-in for the platform that runs the worker.
///
/// Cheap to clone; all clones share the same registry.
#[derive(Clone)]
pub struct ServiceHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    config: HostConfig,
    event_bus: Arc<EventBus>,
    state: Mutex<HostState>,
}

struct HostState {
    service: Option<Arc<WorkerService>>,
    /// Live connections and the channel that receives their callbacks.
    connections: HashMap<ConnectionId, CallbackSender>,
    next_connection_id: ConnectionId,
    accepting: bool,
}

impl ServiceHost {
    pub fn new(config: HostConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(HostInner {
                config,
                event_bus,
                state: Mutex::new(HostState {
                    service: None,
                    connections: HashMap::new(),
                    next_connection_id: 0,
                    accepting: true,
                }),
            }),
        }
    }

    /// Whether a worker instance currently exists.
    pub fn is_running(&self) -> bool {
        self.inner.lock().service.is_some()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Accept or refuse further bind requests. Refused requests receive
    /// [`ConnectionCallback::Failed`].
    pub fn set_accepting(&self, accepting: bool) {
        self.inner.lock().accepting = accepting;
        tracing::info!(accepting, "Service host bind policy changed");
    }

    /// Simulate the worker dying underneath its clients.
    ///
    /// Every live connection receives [`ConnectionCallback::Disconnected`]
    /// and is dropped from the registry. Returns the number of connections
    /// that were notified.
    pub fn crash(&self) -> usize {
        self.inner.drop_all("crash")
    }

    /// Stop accepting bindings and dispose of the worker.
    ///
    /// Connections still open at this point are reported as disconnected.
    pub fn shutdown(&self) {
        self.set_accepting(false);
        let notified = self.inner.drop_all("shutdown");
        tracing::info!(notified, "Service host shut down");
    }
}

impl ServiceBinder for ServiceHost {
    fn bind(&self, attempt: AttemptId, callbacks: CallbackSender) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if !inner.config.bind_latency.is_zero() {
                tokio::time::sleep(inner.config.bind_latency).await;
            }
            inner.complete_bind(attempt, callbacks);
        });
    }

    fn unbind(&self, connection_id: ConnectionId) {
        self.inner.release(connection_id);
    }
}

impl HostInner {
    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete_bind(&self, attempt: AttemptId, callbacks: CallbackSender) {
        if callbacks.is_closed() {
            tracing::debug!(attempt, "Bind requester went away before completion");
            return;
        }

        let bound = {
            let mut state = self.lock();
            if !state.accepting {
                None
            } else {
                let created = state.service.is_none();
                let service = Arc::clone(state.service.get_or_insert_with(|| {
                    Arc::new(WorkerService::new(Arc::clone(&self.event_bus)))
                }));
                state.next_connection_id += 1;
                let connection_id = state.next_connection_id;
                state.connections.insert(connection_id, callbacks.clone());
                Some((connection_id, service, created))
            }
        };

        let Some((connection_id, service, created)) = bound else {
            tracing::warn!(attempt, "Bind refused: host is not accepting connections");
            let _ = callbacks.send(ConnectionCallback::Failed {
                attempt,
                reason: "service host is not accepting connections".to_string(),
            });
            return;
        };

        if created {
            tracing::info!("Worker created");
            self.event_bus
                .publish(LifecycleEvent::new(WORKER_CREATED).with_source(SOURCE));
        }

        service.on_bind(connection_id);

        let handle = WorkerHandle::new(connection_id, service);
        if callbacks
            .send(ConnectionCallback::Connected { attempt, handle })
            .is_err()
        {
            tracing::debug!(connection_id, "Connect callback undeliverable, releasing");
            self.release(connection_id);
        }
    }

    fn release(&self, connection_id: ConnectionId) {
        let last = {
            let mut state = self.lock();
            if state.connections.remove(&connection_id).is_none() {
                tracing::debug!(connection_id, "Unbind for unknown connection ignored");
                return;
            }
            if state.connections.is_empty() {
                state.service.take()
            } else {
                None
            }
        };

        if let Some(service) = last {
            service.on_unbind();
            tracing::info!("Worker destroyed");
            self.event_bus.publish(
                LifecycleEvent::new(WORKER_DESTROYED)
                    .with_source(SOURCE)
                    .with_payload(serde_json::json!({ "reason": "unbound" })),
            );
        }
    }

    fn drop_all(&self, reason: &str) -> usize {
        let (service, connections) = {
            let mut state = self.lock();
            let connections: Vec<_> = state.connections.drain().collect();
            (state.service.take(), connections)
        };

        if service.is_some() {
            tracing::warn!(reason, connections = connections.len(), "Worker lost");
            self.event_bus.publish(
                LifecycleEvent::new(WORKER_DESTROYED)
                    .with_source(SOURCE)
                    .with_payload(serde_json::json!({ "reason": reason })),
            );
        }

        let notified = connections.len();
        for (connection_id, callbacks) in connections {
            let _ = callbacks.send(ConnectionCallback::Disconnected { connection_id });
        }
        notified
    }
}
