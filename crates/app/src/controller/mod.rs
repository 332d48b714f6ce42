//! The Controller: the front end's side of the worker connection.
//!
//! [`lifecycle`] holds the synchronous state machine, [`actor`] runs it on a
//! single task, and [`launcher`] implements the `download` action.

pub mod actor;
pub mod connection;
pub mod launcher;
pub mod lifecycle;
pub mod messages;

pub use actor::{spawn_controller, ControllerHandle, ControllerSettings};
pub use connection::{ConnectFailure, ConnectOutcome, ConnectionState, ControllerStatus};
pub use launcher::{DownloadLauncher, DownloadTarget};
pub use lifecycle::Controller;
pub use messages::{CommandOutcome, ControllerMessage, UserAction};
