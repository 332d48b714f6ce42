use serde::Serialize;
use workbg_core::types::{AttemptId, ConnectionId};
use workbg_worker::WorkerHandle;

/// The controller's link to the worker.
///
/// A handle exists exactly when the state is [`ConnectionState::Bound`].
#[derive(Debug, Clone, Default)]
pub enum ConnectionState {
    #[default]
    Unbound,
    Bound(WorkerHandle),
}

impl ConnectionState {
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }

    pub fn handle(&self) -> Option<&WorkerHandle> {
        match self {
            Self::Bound(handle) => Some(handle),
            Self::Unbound => None,
        }
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.handle().map(WorkerHandle::connection_id)
    }
}

/// What a connect callback did to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The pending attempt completed and the controller is now bound.
    Connected { connection_id: ConnectionId },
    /// The attempt could not be completed.
    Failed { attempt: AttemptId, reason: String },
    /// The callback answered an attempt that is no longer pending.
    Stale,
}

/// Why the most recent connect attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectFailure {
    pub attempt: AttemptId,
    pub reason: String,
}

/// Snapshot of the controller published after every message it handles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    pub bound: bool,
    pub connection_id: Option<ConnectionId>,
    pub pending_attempt: Option<AttemptId>,
    pub last_failure: Option<ConnectFailure>,
}
