#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use workbg_app::download_manager::DownloadManager;
use workbg_core::download::DownloadRequest;
use workbg_core::error::CoreError;
use workbg_core::types::{AttemptId, ConnectionId, DownloadId};
use workbg_events::{EventBus, LifecycleEvent};
use workbg_worker::{CallbackSender, ServiceBinder, WorkerHandle, WorkerService};

/// Binder that records every request and never answers on its own.
///
/// Tests deliver callbacks by hand through the controller methods, or via
/// [`RecordingBinder::callbacks_for`].
#[derive(Default)]
pub struct RecordingBinder {
    binds: Mutex<Vec<(AttemptId, CallbackSender)>>,
    unbinds: Mutex<Vec<ConnectionId>>,
}

impl RecordingBinder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn bind_count(&self) -> usize {
        self.binds.lock().unwrap().len()
    }

    pub fn attempts(&self) -> Vec<AttemptId> {
        self.binds.lock().unwrap().iter().map(|(a, _)| *a).collect()
    }

    /// Callback channel passed with the bind for `attempt`.
    pub fn callbacks_for(&self, attempt: AttemptId) -> Option<CallbackSender> {
        self.binds
            .lock()
            .unwrap()
            .iter()
            .find(|(a, _)| *a == attempt)
            .map(|(_, tx)| tx.clone())
    }

    pub fn unbinds(&self) -> Vec<ConnectionId> {
        self.unbinds.lock().unwrap().clone()
    }
}

impl ServiceBinder for RecordingBinder {
    fn bind(&self, attempt: AttemptId, callbacks: CallbackSender) {
        self.binds.lock().unwrap().push((attempt, callbacks));
    }

    fn unbind(&self, connection_id: ConnectionId) {
        self.unbinds.lock().unwrap().push(connection_id);
    }
}

/// Download manager that keeps the requests it is given.
#[derive(Default)]
pub struct RecordingManager {
    requests: Mutex<Vec<DownloadRequest>>,
}

impl RecordingManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl DownloadManager for RecordingManager {
    fn enqueue(&self, request: DownloadRequest) -> Result<DownloadId, CoreError> {
        request.validate()?;
        self.requests.lock().unwrap().push(request);
        Ok(DownloadId::now_v7())
    }
}

/// A handle to a fresh worker, as the host would deliver it.
pub fn worker_handle(connection_id: ConnectionId, bus: &Arc<EventBus>) -> WorkerHandle {
    WorkerHandle::new(connection_id, Arc::new(WorkerService::new(Arc::clone(bus))))
}

/// Names of every event published so far.
pub fn drain_events(rx: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<String> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|e| e.event_type)
        .collect()
}

pub fn count(events: &[String], event_type: &str) -> usize {
    events.iter().filter(|e| *e == event_type).count()
}

/// Poll `condition` until it holds, failing the test after one second.
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(std::time::Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition should hold within a second");
}

/// Receive until an event named `event_type` arrives, failing the test
/// after one second.
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<LifecycleEvent>,
    event_type: &str,
) -> LifecycleEvent {
    tokio::time::timeout(std::time::Duration::from_secs(1), async {
        loop {
            let event = rx.recv().await.expect("event bus should stay open");
            if event.event_type == event_type {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{event_type} should be published within a second"))
}
