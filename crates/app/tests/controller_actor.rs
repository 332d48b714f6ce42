//! Tests for the controller task.
//!
//! Most run against the real [`ServiceHost`] so the whole handshake is
//! exercised: bind on a spawned task, callback over the channel, release
//! destroying the worker.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use workbg_app::controller::{
    spawn_controller, CommandOutcome, ControllerHandle, ControllerSettings, DownloadLauncher,
    DownloadTarget,
};
use workbg_app::download_manager::DownloadManager;
use workbg_app::error::AppError;
use workbg_app::permission::{ChannelPrompt, PermissionPrompt, PresetPrompt};
use workbg_core::download::{NotificationVisibility, DIRECTORY_DOWNLOADS};
use workbg_core::error::CoreError;
use workbg_core::event_names::{PERMISSION_DENIED, PERMISSION_GRANTED, WORKER_STARTED, WORKER_STOPPED};
use workbg_core::permission::{Permission, PermissionStatus, PermissionStore};
use workbg_events::EventBus;
use workbg_worker::{ConnectionCallback, HostConfig, ServiceBinder, ServiceHost};

use common::{eventually, wait_for_event, worker_handle, RecordingBinder, RecordingManager};

const TARGET_URL: &str = "https://example.com/media/theme.mp3";

struct Harness {
    controller: ControllerHandle,
    task: JoinHandle<()>,
    cancel: CancellationToken,
    bus: Arc<EventBus>,
}

fn target() -> DownloadTarget {
    DownloadTarget {
        url: TARGET_URL.to_string(),
        mime_type: Some("audio/mpeg".to_string()),
    }
}

fn launcher(
    manager: Arc<dyn DownloadManager>,
    prompt: Arc<dyn PermissionPrompt>,
    permissions: PermissionStore,
    bus: &Arc<EventBus>,
) -> DownloadLauncher {
    DownloadLauncher::new(manager, prompt, permissions, target(), Arc::clone(bus))
}

fn spawn_with<B: ServiceBinder + 'static>(
    binder: B,
    launcher: DownloadLauncher,
    bus: Arc<EventBus>,
    connect_timeout: Duration,
) -> Harness {
    let cancel = CancellationToken::new();
    let (controller, task) = spawn_controller(
        binder,
        launcher,
        Arc::clone(&bus),
        ControllerSettings { connect_timeout },
        cancel.clone(),
    );
    Harness {
        controller,
        task,
        cancel,
        bus,
    }
}

/// Controller bound to a fresh host, downloads going nowhere.
fn hosted() -> (Harness, ServiceHost) {
    let bus = Arc::new(EventBus::default());
    let host = ServiceHost::new(HostConfig::default(), Arc::clone(&bus));
    let launcher = launcher(
        RecordingManager::new(),
        Arc::new(PresetPrompt::new(PermissionStatus::Denied)),
        PermissionStore::new(),
        &bus,
    );
    let harness = spawn_with(host.clone(), launcher, bus, Duration::from_secs(1));
    (harness, host)
}

/// Controller with a host that is never asked to connect, for downloads.
fn downloads(
    manager: Arc<RecordingManager>,
    prompt: Arc<dyn PermissionPrompt>,
    permissions: PermissionStore,
) -> Harness {
    let bus = Arc::new(EventBus::default());
    let launcher = launcher(manager, prompt, permissions, &bus);
    spawn_with(RecordingBinder::new(), launcher, bus, Duration::from_secs(1))
}

// ---------------------------------------------------------------------------
// Test: start connects first, the next start reaches the worker
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_connects_then_forwards() {
    let (h, host) = hosted();
    let mut events = h.bus.subscribe();

    assert_eq!(h.controller.start().await.unwrap(), CommandOutcome::ConnectRequested);
    let connection_id = h.controller.connect().await.unwrap();

    assert!(host.is_running());
    assert_eq!(host.connection_count(), 1);
    let status = h.controller.status().await.unwrap();
    assert!(status.bound);
    assert_eq!(status.connection_id, Some(connection_id));

    assert_eq!(h.controller.start().await.unwrap(), CommandOutcome::Forwarded);
    wait_for_event(&mut events, WORKER_STARTED).await;
}

// ---------------------------------------------------------------------------
// Test: stop releases the connection and the host destroys the worker
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stop_releases_connection_and_worker() {
    let (h, host) = hosted();
    let mut events = h.bus.subscribe();
    h.controller.connect().await.unwrap();

    assert_eq!(h.controller.stop().await.unwrap(), CommandOutcome::Forwarded);

    wait_for_event(&mut events, WORKER_STOPPED).await;
    assert!(!h.controller.status().await.unwrap().bound);
    assert_eq!(host.connection_count(), 0);
    assert!(!host.is_running());

    assert_eq!(h.controller.stop().await.unwrap(), CommandOutcome::Dropped);
}

// ---------------------------------------------------------------------------
// Test: a crashed worker leaves the controller unbound
// ---------------------------------------------------------------------------

#[tokio::test]
async fn crash_unbinds_without_stop() {
    let (h, host) = hosted();
    let mut events = h.bus.subscribe();
    h.controller.connect().await.unwrap();

    assert_eq!(host.crash(), 1);

    let mut status = h.controller.watch_status();
    tokio::time::timeout(Duration::from_secs(1), status.wait_for(|s| !s.bound))
        .await
        .expect("disconnect should be observed")
        .unwrap();
    let names: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.event_type)
        .collect();
    assert!(!names.iter().any(|n| n == WORKER_STOPPED));

    assert_eq!(h.controller.start().await.unwrap(), CommandOutcome::ConnectRequested);
    h.controller.connect().await.unwrap();
    assert!(host.is_running());
}

// ---------------------------------------------------------------------------
// Test: connecting while bound reuses the connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_while_bound_reuses_connection() {
    let (h, host) = hosted();

    let first = h.controller.connect().await.unwrap();
    let second = h.controller.connect().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(host.connection_count(), 1);
}

// ---------------------------------------------------------------------------
// Test: connection failures are reported
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refused_bind_fails_connect() {
    let (h, host) = hosted();
    host.set_accepting(false);

    let err = h.controller.connect().await.unwrap_err();

    assert_matches!(err, AppError::Core(CoreError::ConnectionFailed(_)));
    let status = h.controller.status().await.unwrap();
    assert!(!status.bound);
    assert!(status.last_failure.is_some());

    host.set_accepting(true);
    h.controller.connect().await.unwrap();
}

#[tokio::test]
async fn unanswered_bind_times_out_and_late_connection_is_released() {
    let bus = Arc::new(EventBus::default());
    let binder = RecordingBinder::new();
    let launcher = launcher(
        RecordingManager::new(),
        Arc::new(PresetPrompt::new(PermissionStatus::Denied)),
        PermissionStore::new(),
        &bus,
    );
    let h = spawn_with(
        Arc::clone(&binder),
        launcher,
        Arc::clone(&bus),
        Duration::from_millis(50),
    );

    let err = h.controller.connect().await.unwrap_err();
    assert_matches!(err, AppError::Core(CoreError::ConnectionFailed(reason)) if reason.contains("timed out"));

    let callbacks = binder.callbacks_for(1).expect("bind should have been requested");
    callbacks
        .send(ConnectionCallback::Connected {
            attempt: 1,
            handle: worker_handle(42, &bus),
        })
        .unwrap();

    eventually(|| binder.unbinds() == vec![42]).await;
    assert!(!h.controller.status().await.unwrap().bound);
}

// ---------------------------------------------------------------------------
// Test: teardown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn teardown_is_idempotent() {
    let (h, host) = hosted();
    h.controller.connect().await.unwrap();

    h.controller.teardown().await.unwrap();
    h.controller.teardown().await.unwrap();

    assert_eq!(host.connection_count(), 0);
    assert!(!h.controller.status().await.unwrap().bound);
}

#[tokio::test]
async fn cancelling_tears_down_and_closes() {
    let (h, host) = hosted();
    h.controller.connect().await.unwrap();

    h.cancel.cancel();
    h.task.await.unwrap();

    assert_eq!(host.connection_count(), 0);
    assert!(!host.is_running());
    assert_matches!(h.controller.start().await, Err(AppError::ControllerClosed));
    h.controller.teardown().await.unwrap();
}

// ---------------------------------------------------------------------------
// Test: download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_with_permission_enqueues_request() {
    let manager = RecordingManager::new();
    let h = downloads(
        Arc::clone(&manager),
        Arc::new(PresetPrompt::new(PermissionStatus::Denied)),
        PermissionStore::with_granted([Permission::WriteStorage]),
    );

    let outcome = h.controller.download().await.unwrap();

    assert_matches!(outcome, CommandOutcome::DownloadEnqueued(_));
    let requests = manager.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.url, TARGET_URL);
    assert_eq!(request.title, "MP3 Download");
    assert_eq!(request.description, "Downloading theme.mp3");
    assert_eq!(request.destination_dir, DIRECTORY_DOWNLOADS);
    assert_eq!(request.destination_file_name, "theme.mp3");
    assert_eq!(request.notification, NotificationVisibility::VisibleNotifyCompleted);
    assert!(request.allow_metered);
    assert!(request.allow_roaming);
}

#[tokio::test]
async fn granted_prompt_starts_download_and_is_remembered() {
    let manager = RecordingManager::new();
    let h = downloads(
        Arc::clone(&manager),
        Arc::new(PresetPrompt::new(PermissionStatus::Granted)),
        PermissionStore::new(),
    );
    let mut events = h.bus.subscribe();

    assert_eq!(
        h.controller.download().await.unwrap(),
        CommandOutcome::PermissionRequested
    );
    wait_for_event(&mut events, PERMISSION_GRANTED).await;
    eventually(|| manager.requests().len() == 1).await;

    assert_matches!(
        h.controller.download().await.unwrap(),
        CommandOutcome::DownloadEnqueued(_)
    );
    assert_eq!(manager.requests().len(), 2);
}

#[tokio::test]
async fn denied_prompt_downloads_nothing_and_asks_again() {
    let manager = RecordingManager::new();
    let h = downloads(
        Arc::clone(&manager),
        Arc::new(PresetPrompt::new(PermissionStatus::Denied)),
        PermissionStore::new(),
    );
    let mut events = h.bus.subscribe();

    assert_eq!(
        h.controller.download().await.unwrap(),
        CommandOutcome::PermissionRequested
    );
    wait_for_event(&mut events, PERMISSION_DENIED).await;
    assert!(manager.requests().is_empty());

    assert_eq!(
        h.controller.download().await.unwrap(),
        CommandOutcome::PermissionRequested
    );
    wait_for_event(&mut events, PERMISSION_DENIED).await;
    assert!(manager.requests().is_empty());
}

#[tokio::test]
async fn download_while_prompt_open_is_dropped() {
    let manager = RecordingManager::new();
    let (prompt, mut questions) = ChannelPrompt::new();
    let h = downloads(Arc::clone(&manager), Arc::new(prompt), PermissionStore::new());

    assert_eq!(
        h.controller.download().await.unwrap(),
        CommandOutcome::PermissionRequested
    );
    let question = questions.recv().await.expect("prompt should be shown");
    assert_eq!(question.permissions, vec![Permission::WriteStorage]);

    assert_eq!(h.controller.download().await.unwrap(), CommandOutcome::Dropped);

    question.answer(PermissionStatus::Granted);
    eventually(|| manager.requests().len() == 1).await;
}

#[tokio::test]
async fn invalid_target_is_rejected() {
    let manager = RecordingManager::new();
    let bus = Arc::new(EventBus::default());
    let launcher = DownloadLauncher::new(
        manager.clone(),
        Arc::new(PresetPrompt::new(PermissionStatus::Granted)),
        PermissionStore::with_granted([Permission::WriteStorage]),
        DownloadTarget {
            url: "ftp://example.com/theme.mp3".to_string(),
            mime_type: None,
        },
        Arc::clone(&bus),
    );
    let h = spawn_with(RecordingBinder::new(), launcher, bus, Duration::from_secs(1));

    assert_matches!(
        h.controller.download().await.unwrap(),
        CommandOutcome::Rejected(_)
    );
    assert!(manager.requests().is_empty());
}
