//! Download manager.
//!
//! [`DownloadManager::enqueue`] returns as soon as the request is accepted.
//! [`HttpDownloadManager`] then streams the body to a `.part` file under the
//! public storage root on a tracked background task and links it to a free
//! name when the transfer completes. Outcomes are published on the event
//! bus; the caller is never told.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use workbg_core::download::{check_network_policy, DownloadRequest, NetworkConditions};
use workbg_core::error::CoreError;
use workbg_core::event_names::{DOWNLOAD_COMPLETED, DOWNLOAD_ENQUEUED, DOWNLOAD_FAILED};
use workbg_core::types::DownloadId;
use workbg_events::{EventBus, LifecycleEvent};

use crate::error::AppResult;

/// Event source name for everything the manager publishes.
const SOURCE: &str = "download_manager";

/// Time allowed to establish the HTTP connection. The transfer itself is
/// not bounded.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Accepts download requests and runs them to completion on its own.
pub trait DownloadManager: Send + Sync {
    /// Validate and queue `request`. Never waits for the transfer.
    fn enqueue(&self, request: DownloadRequest) -> Result<DownloadId, CoreError>;
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
enum DownloadError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// HttpDownloadManager
// ---------------------------------------------------------------------------

/// Downloads over HTTP into `<public_root>/<destination_dir>/<file_name>`.
///
/// Cheap to clone; clones share the same task tracker.
#[derive(Clone)]
pub struct HttpDownloadManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    client: reqwest::Client,
    public_root: PathBuf,
    network: NetworkConditions,
    event_bus: Arc<EventBus>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    shut_down: AtomicBool,
}

impl HttpDownloadManager {
    pub fn new(
        public_root: impl Into<PathBuf>,
        network: NetworkConditions,
        event_bus: Arc<EventBus>,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(ManagerInner {
                client,
                public_root: public_root.into(),
                network,
                event_bus,
                tracker: TaskTracker::new(),
                cancel: CancellationToken::new(),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Where `request` would land if no file of that name existed yet.
    pub fn destination_path(&self, request: &DownloadRequest) -> PathBuf {
        self.inner
            .public_root
            .join(&request.destination_dir)
            .join(&request.destination_file_name)
    }

    /// Number of transfers still running.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Wait until every transfer started so far has finished.
    pub async fn wait_idle(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    /// Refuse new requests and wait up to `grace` for running transfers,
    /// then cancel whatever is left.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.inner.tracker.close();

        if tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.inner.tracker.len(),
                "Downloads still running after grace period, cancelling"
            );
            self.inner.cancel.cancel();
            self.inner.tracker.wait().await;
        }
        tracing::info!("Download manager shut down");
    }
}

impl DownloadManager for HttpDownloadManager {
    fn enqueue(&self, request: DownloadRequest) -> Result<DownloadId, CoreError> {
        request.validate()?;
        check_network_policy(&request, self.inner.network)?;
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(CoreError::Internal(
                "Download manager is shut down".to_string(),
            ));
        }

        let id = DownloadId::now_v7();
        tracing::debug!(download_id = %id, url = %request.url, "Download enqueued");
        self.inner.event_bus.publish(
            LifecycleEvent::new(DOWNLOAD_ENQUEUED)
                .with_source(SOURCE)
                .with_payload(serde_json::json!({
                    "download_id": id,
                    "url": request.url,
                    "title": request.title,
                    "file_name": request.destination_file_name,
                })),
        );

        let inner = Arc::clone(&self.inner);
        self.inner.tracker.spawn(async move {
            inner.run_job(id, request).await;
        });
        Ok(id)
    }
}

impl ManagerInner {
    async fn run_job(&self, id: DownloadId, request: DownloadRequest) {
        let dir = self.public_root.join(&request.destination_dir);
        let part = dir.join(format!("{}.{id}.part", request.destination_file_name));

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(DownloadError::Cancelled),
            r = self.fetch(&request, &dir, &part) => r,
        };

        match result {
            Ok((path, bytes)) => {
                if request.notification.notifies_completion() {
                    tracing::info!(download_id = %id, path = %path.display(), bytes, "Download complete");
                } else {
                    tracing::debug!(download_id = %id, path = %path.display(), bytes, "Download complete");
                }
                self.event_bus.publish(
                    LifecycleEvent::new(DOWNLOAD_COMPLETED)
                        .with_source(SOURCE)
                        .with_payload(serde_json::json!({
                            "download_id": id,
                            "path": path.display().to_string(),
                            "bytes": bytes,
                        })),
                );
            }
            Err(e) => {
                if let Err(io) = tokio::fs::remove_file(&part).await {
                    if io.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %part.display(), error = %io, "Failed to remove partial download");
                    }
                }
                tracing::error!(download_id = %id, url = %request.url, error = %e, "Download failed");
                self.event_bus.publish(
                    LifecycleEvent::new(DOWNLOAD_FAILED)
                        .with_source(SOURCE)
                        .with_payload(serde_json::json!({
                            "download_id": id,
                            "error": e.to_string(),
                        })),
                );
            }
        }
    }

    async fn fetch(
        &self,
        request: &DownloadRequest,
        dir: &Path,
        part: &Path,
    ) -> Result<(PathBuf, u64), DownloadError> {
        let response = self
            .client
            .get(&request.url)
            .send()
            .await?
            .error_for_status()?;

        tokio::fs::create_dir_all(dir).await?;
        let mut file = tokio::fs::File::create(part).await?;
        let mut body = response.bytes_stream();
        let mut bytes: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        let path = claim_path(part, dir, &request.destination_file_name).await?;
        if let Err(e) = tokio::fs::remove_file(part).await {
            tracing::warn!(path = %part.display(), error = %e, "Failed to remove partial download");
        }
        Ok((path, bytes))
    }
}

/// Link `part` to `dir/name`, or to `dir/stem-N.ext` for the first free `N`.
///
/// Linking fails on an existing name, so two transfers finishing together
/// can never claim the same file.
async fn claim_path(part: &Path, dir: &Path, name: &str) -> std::io::Result<PathBuf> {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let mut n: u32 = 0;
    loop {
        let candidate = match (n, ext) {
            (0, _) => dir.join(name),
            (_, Some(ext)) => dir.join(format!("{stem}-{n}.{ext}")),
            (_, None) => dir.join(format!("{stem}-{n}")),
        };
        match tokio::fs::hard_link(part, &candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}
