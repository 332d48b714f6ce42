//! In-memory event journal.
//!
//! [`EventJournal`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! broadcast channel and keeps the most recent [`LifecycleEvent`]s in a
//! bounded ring. It runs as a long-lived background task and shuts down
//! when the bus sender is dropped.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::bus::LifecycleEvent;

/// Default number of events retained.
const DEFAULT_RETAINED: usize = 256;

/// Bounded history of lifecycle events.
pub struct EventJournal {
    retained: usize,
    entries: Mutex<VecDeque<LifecycleEvent>>,
}

impl EventJournal {
    /// Journal retaining at most `retained` events (oldest dropped first).
    pub fn new(retained: usize) -> Self {
        Self {
            retained: retained.max(1),
            entries: Mutex::new(VecDeque::with_capacity(retained.max(1))),
        }
    }

    /// Run the journal loop.
    ///
    /// Records every event received on `receiver`. The loop exits when the
    /// channel is closed (i.e. the [`EventBus`](crate::bus::EventBus) is
    /// dropped).
    pub async fn run(&self, mut receiver: broadcast::Receiver<LifecycleEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.record(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event journal lagged, some events were not recorded");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, journal shutting down");
                    break;
                }
            }
        }
    }

    /// Append a single event, evicting the oldest when full.
    pub fn record(&self, event: LifecycleEvent) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.retained {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    /// Copy of the retained events, oldest first.
    pub fn snapshot(&self) -> Vec<LifecycleEvent> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Number of retained events named `event_type`.
    pub fn count(&self, event_type: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new(DEFAULT_RETAINED)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bus::EventBus;

    #[test]
    fn oldest_events_are_evicted() {
        let journal = EventJournal::new(2);
        journal.record(LifecycleEvent::new("a"));
        journal.record(LifecycleEvent::new("b"));
        journal.record(LifecycleEvent::new("c"));

        let names: Vec<_> = journal
            .snapshot()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn run_records_until_bus_is_dropped() {
        let bus = EventBus::default();
        let journal = Arc::new(EventJournal::default());

        let receiver = bus.subscribe();
        let task = {
            let journal = Arc::clone(&journal);
            tokio::spawn(async move { journal.run(receiver).await })
        };

        bus.publish(LifecycleEvent::new("worker.started"));
        bus.publish(LifecycleEvent::new("worker.started"));
        bus.publish(LifecycleEvent::new("worker.stopped"));
        drop(bus);

        task.await.expect("journal task should exit cleanly");

        assert_eq!(journal.count("worker.started"), 2);
        assert_eq!(journal.count("worker.stopped"), 1);
        assert_eq!(journal.snapshot().len(), 3);
    }
}
