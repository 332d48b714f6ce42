//! Well-known lifecycle event names.
//!
//! Every transition of the connection, the worker, the permission prompt
//! and the download path is published on the event bus under one of these
//! names.

/// A controller asked the host for a connection.
pub const CONNECTION_REQUESTED: &str = "connection.requested";

/// A connect callback was accepted and the controller is now bound.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";

/// The host reported an unexpected disconnect.
pub const CONNECTION_LOST: &str = "connection.lost";

/// The controller released its connection explicitly (stop or teardown).
pub const CONNECTION_RELEASED: &str = "connection.released";

/// A connect attempt failed or timed out.
pub const CONNECTION_FAILED: &str = "connection.failed";

/// The host instantiated the worker for a first binding.
pub const WORKER_CREATED: &str = "worker.created";

/// The worker accepted a binding.
pub const WORKER_BOUND: &str = "worker.bound";

/// The last binding to the worker went away.
pub const WORKER_UNBOUND: &str = "worker.unbound";

/// `start` was invoked on the worker.
pub const WORKER_STARTED: &str = "worker.started";

/// `stop` was invoked on the worker.
pub const WORKER_STOPPED: &str = "worker.stopped";

/// The host disposed of the worker instance.
pub const WORKER_DESTROYED: &str = "worker.destroyed";

/// A download request was handed to the download manager.
pub const DOWNLOAD_ENQUEUED: &str = "download.enqueued";

/// A download job finished writing its file.
pub const DOWNLOAD_COMPLETED: &str = "download.completed";

/// A download job gave up.
pub const DOWNLOAD_FAILED: &str = "download.failed";

/// The user granted a permission.
pub const PERMISSION_GRANTED: &str = "permission.granted";

/// The user denied a permission.
pub const PERMISSION_DENIED: &str = "permission.denied";
