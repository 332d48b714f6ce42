//! Controller task.
//!
//! One tokio task owns the [`Controller`] and the [`DownloadLauncher`] and
//! handles user actions, binder callbacks, connect timeouts and permission
//! results strictly one at a time. [`ControllerHandle`] is the only way in.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use workbg_core::error::CoreError;
use workbg_core::types::{AttemptId, ConnectionId};
use workbg_events::EventBus;
use workbg_worker::{ConnectionCallback, ServiceBinder};

use super::connection::ControllerStatus;
use super::launcher::DownloadLauncher;
use super::lifecycle::Controller;
use super::messages::{CommandOutcome, ControllerMessage, UserAction};
use crate::error::{AppError, AppResult};

/// Messages buffered before senders wait.
const INBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// How long a connect attempt may stay unanswered before it fails.
    pub connect_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Spawn the controller task.
///
/// The task runs until `cancel` fires or every [`ControllerHandle`] is
/// dropped, and tears the connection down on the way out.
pub fn spawn_controller<B>(
    binder: B,
    launcher: DownloadLauncher,
    event_bus: Arc<EventBus>,
    settings: ControllerSettings,
    cancel: CancellationToken,
) -> (ControllerHandle, JoinHandle<()>)
where
    B: ServiceBinder + 'static,
{
    let (callbacks_tx, callbacks) = mpsc::unbounded_channel();
    let (inbox_tx, inbox) = mpsc::channel(INBOX_CAPACITY);
    let (status_tx, status_rx) = watch::channel(ControllerStatus::default());

    let actor = ControllerActor {
        controller: Controller::new(binder, callbacks_tx, event_bus),
        launcher,
        inbox,
        loopback: inbox_tx.downgrade(),
        callbacks,
        status: status_tx,
        settings,
        cancel,
    };
    let task = tokio::spawn(actor.run());

    let handle = ControllerHandle {
        inbox: inbox_tx,
        status: status_rx,
    };
    (handle, task)
}

struct ControllerActor<B: ServiceBinder> {
    controller: Controller<B>,
    launcher: DownloadLauncher,
    inbox: mpsc::Receiver<ControllerMessage>,
    /// Lets timers and prompts report back without keeping the inbox open.
    loopback: mpsc::WeakSender<ControllerMessage>,
    callbacks: mpsc::UnboundedReceiver<ConnectionCallback>,
    status: watch::Sender<ControllerStatus>,
    settings: ControllerSettings,
    cancel: CancellationToken,
}

impl<B: ServiceBinder + 'static> ControllerActor<B> {
    async fn run(mut self) {
        tracing::debug!("Controller task started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    tracing::debug!("Controller cancelled");
                    break;
                }

                Some(callback) = self.callbacks.recv() => {
                    self.handle_callback(callback);
                }

                message = self.inbox.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => {
                        tracing::debug!("All controller handles dropped");
                        break;
                    }
                },
            }
        }

        self.controller.teardown();
        self.publish_status();
        tracing::debug!("Controller task stopped");
    }

    fn handle_callback(&mut self, callback: ConnectionCallback) {
        match callback {
            ConnectionCallback::Connected { attempt, handle } => {
                self.controller.on_connected(attempt, handle);
            }
            ConnectionCallback::Disconnected { connection_id } => {
                self.controller.on_disconnected(connection_id);
            }
            ConnectionCallback::Failed { attempt, reason } => {
                self.controller.on_connect_failed(attempt, reason);
            }
        }
        self.publish_status();
    }

    fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Action { action, reply } => {
                let outcome = self.handle_action(action);
                tracing::debug!(%action, %outcome, "Action handled");
                self.publish_status();
                let _ = reply.send(outcome);
            }
            ControllerMessage::Connect { reply } => {
                let attempt = self.controller.request_connect();
                if let Some(attempt) = attempt {
                    self.arm_connect_timeout(attempt);
                }
                self.publish_status();
                let _ = reply.send(attempt);
            }
            ControllerMessage::ConnectTimeout { attempt } => {
                self.controller.on_connect_timeout(attempt);
                self.publish_status();
            }
            ControllerMessage::PermissionResult(result) => {
                let outcome = self.launcher.on_permission_result(result);
                tracing::debug!(%outcome, "Permission result handled");
            }
            ControllerMessage::Status { reply } => {
                let _ = reply.send(self.controller.status());
            }
            ControllerMessage::Teardown { reply } => {
                self.controller.teardown();
                self.publish_status();
                let _ = reply.send(());
            }
        }
    }

    fn handle_action(&mut self, action: UserAction) -> CommandOutcome {
        match action {
            UserAction::Start => {
                let outcome = self.controller.start();
                if outcome == CommandOutcome::ConnectRequested {
                    if let Some(attempt) = self.controller.pending_attempt() {
                        self.arm_connect_timeout(attempt);
                    }
                }
                outcome
            }
            UserAction::Stop => self.controller.stop(),
            UserAction::Download => self.launcher.download(&self.loopback),
        }
    }

    fn arm_connect_timeout(&self, attempt: AttemptId) {
        let loopback = self.loopback.clone();
        let cancel = self.cancel.clone();
        let timeout = self.settings.connect_timeout;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(inbox) = loopback.upgrade() {
                        let _ = inbox.send(ControllerMessage::ConnectTimeout { attempt }).await;
                    }
                }
            }
        });
    }

    fn publish_status(&self) {
        self.status.send_replace(self.controller.status());
    }
}

/// Cloneable front door to the controller task.
#[derive(Clone)]
pub struct ControllerHandle {
    inbox: mpsc::Sender<ControllerMessage>,
    status: watch::Receiver<ControllerStatus>,
}

impl ControllerHandle {
    pub async fn start(&self) -> AppResult<CommandOutcome> {
        self.act(UserAction::Start).await
    }

    pub async fn stop(&self) -> AppResult<CommandOutcome> {
        self.act(UserAction::Stop).await
    }

    pub async fn download(&self) -> AppResult<CommandOutcome> {
        self.act(UserAction::Download).await
    }

    pub async fn act(&self, action: UserAction) -> AppResult<CommandOutcome> {
        self.request(|reply| ControllerMessage::Action { action, reply })
            .await
    }

    /// Connect and wait for the outcome.
    ///
    /// Returns immediately when already bound. A refused bind or an elapsed
    /// connect timeout yields [`CoreError::ConnectionFailed`].
    pub async fn connect(&self) -> AppResult<ConnectionId> {
        self.request(|reply| ControllerMessage::Connect { reply })
            .await?;

        let mut status = self.status.clone();
        let settled = status
            .wait_for(|s| s.bound || s.pending_attempt.is_none())
            .await
            .map_err(|_| AppError::ControllerClosed)?
            .clone();

        if let Some(connection_id) = settled.connection_id {
            return Ok(connection_id);
        }
        let reason = settled
            .last_failure
            .map(|f| f.reason)
            .unwrap_or_else(|| "connect attempt abandoned".to_string());
        Err(CoreError::ConnectionFailed(reason).into())
    }

    pub async fn status(&self) -> AppResult<ControllerStatus> {
        self.request(|reply| ControllerMessage::Status { reply })
            .await
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ControllerStatus> {
        self.status.clone()
    }

    /// Release the connection. Succeeds even if the task has already exited.
    pub async fn teardown(&self) -> AppResult<()> {
        match self.request(|reply| ControllerMessage::Teardown { reply }).await {
            Ok(()) | Err(AppError::ControllerClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> ControllerMessage,
    ) -> AppResult<T> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(message(reply))
            .await
            .map_err(|_| AppError::ControllerClosed)?;
        rx.await.map_err(|_| AppError::ControllerClosed)
    }
}
