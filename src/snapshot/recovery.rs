//! Crash/reload recovery detection and emergency backups.
//!
//! At startup the detector decides whether the previous session may have
//! ended unexpectedly and, if so, picks at most one snapshot to offer back
//! to the user. Emergency backups written at shutdown take precedence over
//! recent auto-saves.

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn};

use crate::config::RecoveryConfig;
use crate::models::recovery::{PendingRestore, RecoverySource};
use crate::models::snapshot::{Snapshot, SnapshotData, SnapshotPayload};
use crate::persistence::{get_json, keys, set_json, KeyValueStore};
use crate::{AppError, Result};

/// Detector windows in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryWindows {
    /// A last auto-save younger than this suggests an unclean exit.
    pub recent_auto_save_ms: i64,
    /// Auto-save candidates must be at most this old.
    pub candidate_freshness_ms: i64,
    /// Emergency backups older than this are discarded.
    pub emergency_max_age_ms: i64,
}

fn seconds_to_ms(seconds: u64) -> i64 {
    i64::try_from(seconds.saturating_mul(1000)).unwrap_or(i64::MAX)
}

impl From<&RecoveryConfig> for RecoveryWindows {
    fn from(config: &RecoveryConfig) -> Self {
        Self {
            recent_auto_save_ms: seconds_to_ms(config.recent_auto_save_seconds),
            candidate_freshness_ms: seconds_to_ms(config.candidate_freshness_seconds),
            emergency_max_age_ms: seconds_to_ms(config.emergency_max_age_seconds),
        }
    }
}

impl Default for RecoveryWindows {
    fn default() -> Self {
        Self::from(&RecoveryConfig::default())
    }
}

/// How startup detection treats a stored emergency backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupRecovery {
    /// Detect a candidate and delete the emergency backup straight away.
    #[default]
    Consume,
    /// Detect a candidate but keep a usable emergency backup stored until
    /// the candidate is accepted or dismissed.
    Retain,
    /// Skip detection; storage is left untouched and nothing is offered.
    Skip,
}

/// Decide which snapshot, if any, to offer for restoration at `now_ms`.
///
/// Never fails: any error is logged and treated as "no offer". The
/// emergency backup, if present, is consumed (deleted) whether or not it
/// is offered.
#[must_use]
pub fn detect_pending_restore(
    store: &dyn KeyValueStore,
    snapshots: &[Snapshot],
    last_auto_save_at: Option<i64>,
    windows: &RecoveryWindows,
    now_ms: i64,
) -> Option<PendingRestore> {
    detect(store, snapshots, last_auto_save_at, windows, now_ms, true)
}

/// Like [`detect_pending_restore`], but a usable emergency backup stays in
/// storage. Stale, incomplete or corrupt backups are still discarded.
/// Resolve the offer with [`clear_emergency_backup`].
#[must_use]
pub fn inspect_pending_restore(
    store: &dyn KeyValueStore,
    snapshots: &[Snapshot],
    last_auto_save_at: Option<i64>,
    windows: &RecoveryWindows,
    now_ms: i64,
) -> Option<PendingRestore> {
    detect(store, snapshots, last_auto_save_at, windows, now_ms, false)
}

fn detect(
    store: &dyn KeyValueStore,
    snapshots: &[Snapshot],
    last_auto_save_at: Option<i64>,
    windows: &RecoveryWindows,
    now_ms: i64,
    consume: bool,
) -> Option<PendingRestore> {
    let span = info_span!("detect_pending_restore", now_ms, consume);
    let _guard = span.enter();

    let auto_save = recent_auto_save_candidate(snapshots, last_auto_save_at, windows, now_ms);

    let emergency = match read_emergency_backup(store, windows, now_ms, consume) {
        Ok(found) => found,
        Err(err) => {
            warn!(%err, "emergency backup check failed");
            None
        }
    };

    let pending = emergency
        .map(|snapshot| PendingRestore {
            snapshot,
            source: RecoverySource::EmergencyBackup,
        })
        .or_else(|| {
            auto_save.map(|snapshot| PendingRestore {
                snapshot,
                source: RecoverySource::AutoSave,
            })
        });

    match &pending {
        Some(candidate) => info!(
            snapshot_id = candidate.snapshot_id(),
            source = ?candidate.source,
            "restore candidate detected"
        ),
        None => debug!("no restore candidate"),
    }
    pending
}

/// The most recent auto-save, if the last session looks like it ended
/// unexpectedly and that auto-save is fresh enough to offer.
fn recent_auto_save_candidate(
    snapshots: &[Snapshot],
    last_auto_save_at: Option<i64>,
    windows: &RecoveryWindows,
    now_ms: i64,
) -> Option<Snapshot> {
    let last = last_auto_save_at?;
    if now_ms.saturating_sub(last) > windows.recent_auto_save_ms {
        debug!(last_auto_save_at = last, "last auto-save too old for recovery");
        return None;
    }

    let latest = snapshots
        .iter()
        .filter(|snapshot| snapshot.is_auto_save())
        .max_by_key(|snapshot| snapshot.timestamp)?;

    if now_ms.saturating_sub(latest.timestamp) <= windows.candidate_freshness_ms {
        Some(latest.clone())
    } else {
        debug!(
            snapshot_id = %latest.id,
            "latest auto-save not fresh enough to offer"
        );
        None
    }
}

/// Read the emergency backup and return it as a transient snapshot when it
/// is young enough. With `consume` the backup is deleted whether or not it
/// is offered; otherwise only unusable backups are deleted.
fn read_emergency_backup(
    store: &dyn KeyValueStore,
    windows: &RecoveryWindows,
    now_ms: i64,
    consume: bool,
) -> Result<Option<Snapshot>> {
    let raw = store.get(keys::EMERGENCY_SNAPSHOT)?;
    let written_at: Option<i64> = get_json(store, keys::EMERGENCY_SNAPSHOT_TIMESTAMP)
        .unwrap_or_else(|err| {
            warn!(%err, "emergency backup timestamp unreadable");
            None
        });

    if raw.is_none() && written_at.is_none() {
        return Ok(None);
    }
    if consume {
        clear_emergency_backup(store)?;
    }

    let (Some(raw), Some(written_at)) = (raw, written_at) else {
        warn!("incomplete emergency backup discarded");
        clear_emergency_backup(store)?;
        return Ok(None);
    };

    let age = now_ms.saturating_sub(written_at);
    if age > windows.emergency_max_age_ms {
        info!(age_ms = age, "stale emergency backup discarded");
        clear_emergency_backup(store)?;
        return Ok(None);
    }

    let mut payload: SnapshotPayload = match serde_json::from_str(&raw) {
        Ok(payload) => payload,
        Err(err) => {
            clear_emergency_backup(store)?;
            return Err(AppError::Decode(format!("emergency backup is corrupt: {err}")));
        }
    };
    payload.recompute_metadata();

    Ok(Some(Snapshot::new(
        emergency_name(written_at),
        Some("Recovered from an unexpected shutdown".to_owned()),
        written_at,
        false,
        SnapshotData::Raw(payload),
    )))
}

fn emergency_name(written_at: i64) -> String {
    let stamp = DateTime::<Utc>::from_timestamp_millis(written_at)
        .map(|at| at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| written_at.to_string());
    format!("Emergency backup {stamp}")
}

/// Delete the stored emergency backup. Idempotent.
///
/// # Errors
///
/// Returns `AppError::Storage` if the backup keys cannot be removed.
pub fn clear_emergency_backup(store: &dyn KeyValueStore) -> Result<()> {
    store.remove(keys::EMERGENCY_SNAPSHOT)?;
    store.remove(keys::EMERGENCY_SNAPSHOT_TIMESTAMP)
}

/// Write an emergency backup of `payload` stamped `now_ms`.
///
/// Best-effort and fire-and-forget: the host may be terminating, so failures
/// are logged and swallowed, and nothing is retried.
pub fn write_emergency_backup(store: &dyn KeyValueStore, payload: &SnapshotPayload, now_ms: i64) {
    let result = set_json(store, keys::EMERGENCY_SNAPSHOT, payload)
        .and_then(|()| set_json(store, keys::EMERGENCY_SNAPSHOT_TIMESTAMP, &now_ms));
    match result {
        Ok(()) => debug!(files = payload.metadata.files_count, "emergency backup written"),
        Err(err) => debug!(%err, "emergency backup write failed"),
    }
}
