//! Durable key-value persistence for store state.
//!
//! The store writes a handful of JSON documents under fixed keys (see
//! [`keys`]). [`KeyValueStore`] is the storage seam; [`file_store`] backs it
//! with one file per key and [`memory_store`] keeps everything in process.

pub mod file_store;
pub mod memory_store;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{AppError, Result};

pub use file_store::FileKeyValueStore;
pub use memory_store::MemoryKeyValueStore;

/// Keys of the persisted state layout.
pub mod keys {
    /// JSON map of snapshot id to snapshot.
    pub const SNAPSHOTS: &str = "project_snapshots";
    /// JSON boolean.
    pub const AUTO_SAVE_ENABLED: &str = "auto_save_enabled";
    /// JSON integer, minutes.
    pub const AUTO_SAVE_INTERVAL: &str = "auto_save_interval";
    /// JSON integer, epoch milliseconds.
    pub const LAST_AUTO_SAVE: &str = "last_auto_save";
    /// JSON payload written at shutdown.
    pub const EMERGENCY_SNAPSHOT: &str = "emergency_snapshot";
    /// JSON integer, epoch milliseconds of the emergency payload.
    pub const EMERGENCY_SNAPSHOT_TIMESTAMP: &str = "emergency_snapshot_timestamp";
}

/// Synchronous durable storage of string values under string keys.
///
/// Writes must be durable when they return; there is no batching.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the write fails.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the removal fails.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Read and decode a JSON value stored under `key`.
///
/// # Errors
///
/// Returns `AppError::Storage` on read failure or `AppError::Decode` if the
/// stored document is not valid JSON for `T`.
pub fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| AppError::Decode(format!("stored value for {key} is invalid: {err}"))),
        None => Ok(None),
    }
}

/// Encode `value` as JSON and store it under `key`.
///
/// # Errors
///
/// Returns `AppError::Storage` if encoding or the write fails.
pub fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)
        .map_err(|err| AppError::Storage(format!("failed to encode {key}: {err}")))?;
    store.set(key, &raw)
}

/// Reject keys that cannot be used as portable file names.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::Storage(format!("invalid storage key: {key:?}")))
    }
}
