/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Sequence number of a single connect request issued by a controller.
pub type AttemptId = u64;

/// Identifier the service host assigns to each live connection.
pub type ConnectionId = u64;

/// Opaque identifier returned when a download is enqueued.
pub type DownloadId = uuid::Uuid;
