#![forbid(unsafe_code)]

//! Point-in-time project snapshots with auto-save and crash recovery.
//!
//! A [`snapshot::SnapshotStore`] captures the live file tree, chat history
//! and settings through the collaborator traits in [`providers`], persists
//! snapshots through a [`persistence::KeyValueStore`], and restores them on
//! demand or after an unexpected shutdown.

pub mod config;
pub mod errors;
pub mod models;
pub mod persistence;
pub mod providers;
pub mod snapshot;
pub mod workspace;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
