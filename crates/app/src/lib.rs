//! workbg controller library.
//!
//! Exposes the building blocks (config, error handling, controller state
//! machine and actor, download manager, permission prompts, console) so
//! integration tests and the binary entrypoint can both access them.

pub mod config;
pub mod console;
pub mod controller;
pub mod download_manager;
pub mod error;
pub mod permission;
