//! `workbg-worker` -- the backgroundable worker and its host.
//!
//! - [`service::WorkerService`] is the worker itself: bind/unbind hooks and
//!   the `start`/`stop` commands.
//! - [`binder`] holds the connection handle, the callback channel and the
//!   [`ServiceBinder`](binder::ServiceBinder) seam the controller talks to.
//! - [`host::ServiceHost`] mediates connections: it creates the worker on
//!   demand and delivers connect/disconnect callbacks asynchronously.

pub mod binder;
pub mod host;
pub mod service;

pub use binder::{CallbackSender, ConnectionCallback, ServiceBinder, WorkerHandle};
pub use host::{HostConfig, ServiceHost};
pub use service::WorkerService;
