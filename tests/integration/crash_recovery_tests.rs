//! Startup recovery detection and the pending-restore lifecycle.

use restorepoint::models::recovery::RecoverySource;
use restorepoint::persistence::{keys, set_json};
use restorepoint::snapshot::store::now_ms;
use restorepoint::snapshot::{CreateRequest, StartupRecovery};
use restorepoint::AppError;
use serde_json::json;

use super::test_helpers::Harness;

const HOUR_MS: i64 = 60 * 60 * 1000;

#[tokio::test]
async fn fresh_auto_save_is_offered_after_reload() {
    let mut h = Harness::new();
    h.files.insert_text("work.txt", "unsaved work");
    let id = h.store.auto_save_now().await.unwrap().unwrap();

    h.reopen();

    let pending = h.store.pending_restore().expect("candidate offered");
    assert_eq!(pending.source, RecoverySource::AutoSave);
    assert_eq!(pending.snapshot_id(), id);
}

#[tokio::test]
async fn manual_snapshots_are_never_offered() {
    let mut h = Harness::new();
    h.store.create(CreateRequest::named("Manual only")).await.unwrap();
    set_json(h.kv.as_ref(), keys::LAST_AUTO_SAVE, &now_ms()).unwrap();

    h.reopen();

    assert!(h.store.pending_restore().is_none());
}

#[tokio::test]
async fn stale_last_auto_save_offers_nothing() {
    let mut h = Harness::new();
    h.store.auto_save_now().await.unwrap();
    set_json(h.kv.as_ref(), keys::LAST_AUTO_SAVE, &(now_ms() - 6 * 60 * 1000)).unwrap();

    h.reopen();

    assert!(h.store.pending_restore().is_none());
}

#[tokio::test]
async fn emergency_backup_takes_precedence_and_is_consumed() {
    let mut h = Harness::new();
    h.files.insert_text("draft.txt", "draft at shutdown");
    h.store.auto_save_now().await.unwrap();
    h.store.capture_emergency_backup().await;
    assert!(h.kv.contains(keys::EMERGENCY_SNAPSHOT));

    h.reopen();

    let pending = h.store.pending_restore().expect("candidate offered");
    assert_eq!(pending.source, RecoverySource::EmergencyBackup);
    assert!(pending.snapshot.name.starts_with("Emergency backup"));
    assert!(!h.kv.contains(keys::EMERGENCY_SNAPSHOT));
    assert!(!h.kv.contains(keys::EMERGENCY_SNAPSHOT_TIMESTAMP));
    assert!(h.store.get(pending.snapshot_id()).unwrap().is_none());
}

#[tokio::test]
async fn accepting_the_emergency_backup_restores_it() {
    let mut h = Harness::new();
    h.files.insert_text("draft.txt", "draft at shutdown");
    h.chats.set_chats(vec![json!({"id": "c1"})]);
    h.store.capture_emergency_backup().await;

    h.reopen();
    h.files.insert_text("draft.txt", "overwritten");
    h.chats.set_chats(Vec::new());

    let report = h.store.accept_pending().await.unwrap();

    assert_eq!(report.files_restored, 1);
    assert_eq!(h.files.text("draft.txt").as_deref(), Some("draft at shutdown"));
    assert_eq!(h.chats.chats(), vec![json!({"id": "c1"})]);
    assert!(h.store.pending_restore().is_none());
}

#[tokio::test]
async fn stale_emergency_backup_is_discarded() {
    let mut h = Harness::new();
    h.files.insert_text("old.txt", "old");
    h.store.capture_emergency_backup().await;
    set_json(
        h.kv.as_ref(),
        keys::EMERGENCY_SNAPSHOT_TIMESTAMP,
        &(now_ms() - 2 * HOUR_MS),
    )
    .unwrap();

    h.reopen();

    assert!(h.store.pending_restore().is_none());
    assert!(!h.kv.contains(keys::EMERGENCY_SNAPSHOT));
    assert!(!h.kv.contains(keys::EMERGENCY_SNAPSHOT_TIMESTAMP));
}

#[tokio::test]
async fn failed_emergency_write_is_swallowed() {
    let h = Harness::new();
    h.kv.fail_writes(true);

    h.store.capture_emergency_backup().await;

    assert!(!h.kv.contains(keys::EMERGENCY_SNAPSHOT));
}

#[tokio::test]
async fn dismissing_clears_the_candidate() {
    let mut h = Harness::new();
    h.store.auto_save_now().await.unwrap();
    h.reopen();
    assert!(h.store.pending_restore().is_some());

    h.store.dismiss_pending();

    assert!(h.store.pending_restore().is_none());
    let accepted = h.store.accept_pending().await;
    assert!(matches!(accepted, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn failed_restore_still_clears_the_candidate() {
    let mut h = Harness::new();
    h.files.insert_text("a.txt", "a");
    h.store.auto_save_now().await.unwrap();
    h.reopen();
    h.files.fail_writes_for("a.txt");

    let result = h.store.accept_pending().await;

    assert!(matches!(result, Err(AppError::PartialRestore { .. })));
    assert!(h.store.pending_restore().is_none());
}

#[tokio::test]
async fn retained_emergency_backup_survives_until_accepted() {
    let mut h = Harness::new();
    h.files.insert_text("draft.txt", "draft at shutdown");
    h.store.capture_emergency_backup().await;

    // Unrelated commands leave recovery state alone.
    h.reopen_with(StartupRecovery::Skip);
    assert!(h.store.pending_restore().is_none());
    assert!(h.kv.contains(keys::EMERGENCY_SNAPSHOT));

    // Reviewing the offer does not use it up.
    h.reopen_with(StartupRecovery::Retain);
    let shown = h.store.pending_restore().expect("candidate offered");
    assert_eq!(shown.source, RecoverySource::EmergencyBackup);
    assert!(h.kv.contains(keys::EMERGENCY_SNAPSHOT));

    h.reopen_with(StartupRecovery::Retain);
    h.files.insert_text("draft.txt", "overwritten");
    let report = h.store.accept_pending().await.unwrap();

    assert_eq!(report.files_restored, 1);
    assert_eq!(h.files.text("draft.txt").as_deref(), Some("draft at shutdown"));
    assert!(!h.kv.contains(keys::EMERGENCY_SNAPSHOT));
    assert!(!h.kv.contains(keys::EMERGENCY_SNAPSHOT_TIMESTAMP));

    h.reopen_with(StartupRecovery::Retain);
    assert!(h.store.pending_restore().is_none());
}

#[tokio::test]
async fn dismissing_a_retained_emergency_backup_deletes_it() {
    let mut h = Harness::new();
    h.files.insert_text("draft.txt", "draft at shutdown");
    h.store.capture_emergency_backup().await;

    h.reopen_with(StartupRecovery::Retain);
    assert!(h.store.pending_restore().is_some());
    h.store.dismiss_pending();

    assert!(!h.kv.contains(keys::EMERGENCY_SNAPSHOT));
    h.reopen_with(StartupRecovery::Retain);
    assert!(h.store.pending_restore().is_none());
}

#[tokio::test]
async fn retain_still_discards_a_stale_emergency_backup() {
    let mut h = Harness::new();
    h.store.capture_emergency_backup().await;
    set_json(h.kv.as_ref(), keys::EMERGENCY_SNAPSHOT_TIMESTAMP, &(now_ms() - 2 * HOUR_MS)).unwrap();

    h.reopen_with(StartupRecovery::Retain);

    assert!(h.store.pending_restore().is_none());
    assert!(!h.kv.contains(keys::EMERGENCY_SNAPSHOT));
}
