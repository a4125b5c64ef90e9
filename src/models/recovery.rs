//! Pending-restore candidates surfaced by the recovery detector.

use serde::{Deserialize, Serialize};

use super::snapshot::Snapshot;

/// Where a pending-restore candidate came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecoverySource {
    /// A recent auto-save snapshot in the store.
    AutoSave,
    /// An emergency backup written at shutdown, outside the store.
    EmergencyBackup,
}

/// The single restore offer presented to the user after an unclean exit.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRestore {
    /// Snapshot to restore. Emergency candidates are transient and not stored.
    pub snapshot: Snapshot,
    /// Origin of the candidate.
    pub source: RecoverySource,
}

impl PendingRestore {
    /// Identifier to pass to `restore`.
    #[must_use]
    pub fn snapshot_id(&self) -> &str {
        &self.snapshot.id
    }
}
