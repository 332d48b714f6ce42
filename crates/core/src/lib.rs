//! Domain types shared by the controller, the worker and the download path.
//!
//! Nothing in this crate performs I/O; it holds the error type, the event
//! name constants, the download request record and the permission model.

pub mod download;
pub mod error;
pub mod event_names;
pub mod permission;
pub mod types;
