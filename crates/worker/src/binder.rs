//! Connection handle and the binder seam.
//!
//! A controller never constructs a [`WorkerService`] itself. It asks a
//! [`ServiceBinder`] for a connection and later receives a
//! [`ConnectionCallback`] on the channel it passed in.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use workbg_core::types::{AttemptId, ConnectionId};

use crate::service::WorkerService;

/// Live link from a controller to the worker.
///
/// Cheap to clone; every clone reaches the same worker instance.
#[derive(Clone)]
pub struct WorkerHandle {
    connection_id: ConnectionId,
    service: Arc<WorkerService>,
}

impl WorkerHandle {
    pub fn new(connection_id: ConnectionId, service: Arc<WorkerService>) -> Self {
        Self {
            connection_id,
            service,
        }
    }

    /// Connection this handle was delivered on.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// The worker behind this connection.
    pub fn service(&self) -> &WorkerService {
        &self.service
    }

    /// Whether both handles reach the same worker instance.
    pub fn same_worker(&self, other: &WorkerHandle) -> bool {
        Arc::ptr_eq(&self.service, &other.service)
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

/// Outcome of a bind request, or a later loss of the connection.
#[derive(Debug)]
pub enum ConnectionCallback {
    /// The connection requested by `attempt` is up.
    Connected {
        attempt: AttemptId,
        handle: WorkerHandle,
    },

    /// The connection was lost without the controller releasing it.
    Disconnected { connection_id: ConnectionId },

    /// The bind request for `attempt` could not be satisfied.
    Failed { attempt: AttemptId, reason: String },
}

/// Channel on which a binder delivers [`ConnectionCallback`]s.
pub type CallbackSender = mpsc::UnboundedSender<ConnectionCallback>;

/// Platform side of the connection handshake.
pub trait ServiceBinder: Send + Sync {
    /// Request a connection. Completion is reported later on `callbacks`,
    /// never synchronously.
    fn bind(&self, attempt: AttemptId, callbacks: CallbackSender);

    /// Release a connection previously delivered by
    /// [`ConnectionCallback::Connected`]. Unknown ids are ignored.
    fn unbind(&self, connection_id: ConnectionId);
}

impl<T: ServiceBinder + ?Sized> ServiceBinder for Arc<T> {
    fn bind(&self, attempt: AttemptId, callbacks: CallbackSender) {
        (**self).bind(attempt, callbacks)
    }

    fn unbind(&self, connection_id: ConnectionId) {
        (**self).unbind(connection_id)
    }
}
