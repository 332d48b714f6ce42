use std::fmt;
use std::str::FromStr;

use tokio::sync::oneshot;
use workbg_core::error::CoreError;
use workbg_core::permission::PermissionResult;
use workbg_core::types::{AttemptId, DownloadId};

use super::connection::ControllerStatus;

/// The three user-triggered actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Start,
    Stop,
    Download,
}

impl UserAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Download => "download",
        }
    }
}

impl fmt::Display for UserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "download" => Ok(Self::Download),
            other => Err(CoreError::Validation(format!("Unknown action: '{other}'"))),
        }
    }
}

/// What the controller did with a user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command reached the worker.
    Forwarded,
    /// The controller was unbound; a connection was requested instead.
    ConnectRequested,
    /// Nothing happened.
    Dropped,
    DownloadEnqueued(DownloadId),
    /// The storage permission is being asked for.
    PermissionRequested,
    /// The download manager refused the request.
    Rejected(String),
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forwarded => f.write_str("forwarded to worker"),
            Self::ConnectRequested => f.write_str("not bound, connection requested"),
            Self::Dropped => f.write_str("dropped"),
            Self::DownloadEnqueued(id) => write!(f, "download enqueued ({id})"),
            Self::PermissionRequested => f.write_str("storage permission requested"),
            Self::Rejected(reason) => write!(f, "download rejected: {reason}"),
        }
    }
}

/// Messages processed by the controller task.
#[derive(Debug)]
pub enum ControllerMessage {
    Action {
        action: UserAction,
        reply: oneshot::Sender<CommandOutcome>,
    },
    /// Request a connection without sending a command. Replies with the new
    /// attempt, or `None` when already bound or connecting.
    Connect {
        reply: oneshot::Sender<Option<AttemptId>>,
    },
    ConnectTimeout { attempt: AttemptId },
    PermissionResult(PermissionResult),
    Status {
        reply: oneshot::Sender<ControllerStatus>,
    },
    Teardown { reply: oneshot::Sender<()> },
}
