//! Lifecycle event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`LifecycleEvent`]: the event envelope every component publishes.
//! - [`EventJournal`]: background subscriber keeping the most recent
//!   events in memory.

pub mod bus;
pub mod journal;

pub use bus::{EventBus, LifecycleEvent};
pub use journal::EventJournal;
