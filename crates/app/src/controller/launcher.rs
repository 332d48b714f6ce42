//! The `download` action.
//!
//! Checks the storage permission, asks for it when missing, and hands a
//! [`DownloadRequest`] to the [`DownloadManager`]. Nothing here waits for
//! the download to finish.

use std::sync::Arc;

use tokio::sync::mpsc;
use workbg_core::download::DownloadRequest;
use workbg_core::event_names::{PERMISSION_DENIED, PERMISSION_GRANTED};
use workbg_core::permission::{
    Permission, PermissionResult, PermissionStore, PERMISSION_REQUEST_CODE,
};
use workbg_events::{EventBus, LifecycleEvent};

use super::messages::{CommandOutcome, ControllerMessage};
use crate::download_manager::DownloadManager;
use crate::permission::PermissionPrompt;

/// Event source name for everything the launcher publishes.
const SOURCE: &str = "launcher";

/// The asset fetched by the `download` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub url: String,
    pub mime_type: Option<String>,
}

pub struct DownloadLauncher {
    manager: Arc<dyn DownloadManager>,
    prompt: Arc<dyn PermissionPrompt>,
    permissions: PermissionStore,
    target: DownloadTarget,
    event_bus: Arc<EventBus>,
    /// A prompt is on screen; further downloads are dropped until it answers.
    prompting: bool,
}

impl DownloadLauncher {
    pub fn new(
        manager: Arc<dyn DownloadManager>,
        prompt: Arc<dyn PermissionPrompt>,
        permissions: PermissionStore,
        target: DownloadTarget,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            manager,
            prompt,
            permissions,
            target,
            event_bus,
            prompting: false,
        }
    }

    /// Start the download, or ask for the storage permission first.
    ///
    /// The prompt's answer is sent back as
    /// [`ControllerMessage::PermissionResult`] on `results`.
    pub fn download(&mut self, results: &mpsc::WeakSender<ControllerMessage>) -> CommandOutcome {
        if self.permissions.is_granted(Permission::WriteStorage) {
            return self.start_download();
        }
        if self.prompting {
            tracing::debug!("Permission prompt already open, download dropped");
            return CommandOutcome::Dropped;
        }

        self.prompting = true;
        let prompt = Arc::clone(&self.prompt);
        let results = results.clone();
        tokio::spawn(async move {
            let permissions = vec![Permission::WriteStorage];
            let grants = prompt.request(&permissions).await;
            let result = PermissionResult {
                request_code: PERMISSION_REQUEST_CODE,
                permissions,
                grants,
            };
            match results.upgrade() {
                Some(tx) => {
                    if tx.send(ControllerMessage::PermissionResult(result)).await.is_err() {
                        tracing::debug!("Controller gone before permission result arrived");
                    }
                }
                None => tracing::debug!("Controller gone before permission result arrived"),
            }
        });

        tracing::debug!(permission = %Permission::WriteStorage, "Requesting permission");
        CommandOutcome::PermissionRequested
    }

    /// Handle the answer to a prompt opened by [`download`](Self::download).
    ///
    /// A denial is reported and not retried.
    pub fn on_permission_result(&mut self, result: PermissionResult) -> CommandOutcome {
        self.prompting = false;

        if !result.is_granted_for(PERMISSION_REQUEST_CODE) {
            tracing::warn!(
                request_code = result.request_code,
                "Storage permission denied"
            );
            self.event_bus.publish(
                LifecycleEvent::new(PERMISSION_DENIED)
                    .with_source(SOURCE)
                    .with_payload(serde_json::json!({ "request_code": result.request_code })),
            );
            return CommandOutcome::Dropped;
        }

        self.permissions.grant(Permission::WriteStorage);
        tracing::info!(permission = %Permission::WriteStorage, "Permission granted");
        self.event_bus.publish(
            LifecycleEvent::new(PERMISSION_GRANTED)
                .with_source(SOURCE)
                .with_payload(serde_json::json!({ "permission": Permission::WriteStorage.as_str() })),
        );
        self.start_download()
    }

    fn start_download(&self) -> CommandOutcome {
        let request =
            match DownloadRequest::new(&self.target.url, self.target.mime_type.as_deref()) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(url = %self.target.url, error = %e, "Download request invalid");
                    return CommandOutcome::Rejected(e.to_string());
                }
            };
        let file_name = request.destination_file_name.clone();

        match self.manager.enqueue(request) {
            Ok(id) => {
                tracing::info!(download_id = %id, %file_name, "Download started");
                CommandOutcome::DownloadEnqueued(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Download manager rejected request");
                CommandOutcome::Rejected(e.to_string())
            }
        }
    }
}
