//! Folding per-category outcomes into a restore result.

use restorepoint::snapshot::{CategoryOutcome, RestoreReport};
use restorepoint::AppError;

fn report(
    files: CategoryOutcome,
    restored: usize,
    failed: usize,
    chats: CategoryOutcome,
    settings: CategoryOutcome,
) -> RestoreReport {
    RestoreReport {
        files,
        files_restored: restored,
        files_failed: failed,
        failed_paths: (0..failed).map(|n| format!("f{n}")).collect(),
        chats,
        settings,
    }
}

#[test]
fn full_success_is_ok() {
    let r = report(
        CategoryOutcome::Restored,
        3,
        0,
        CategoryOutcome::Restored,
        CategoryOutcome::Skipped,
    );

    let ok = r.clone().into_result().unwrap();

    assert_eq!(ok, r);
}

#[test]
fn nothing_restored_is_empty() {
    let r = report(
        CategoryOutcome::Skipped,
        0,
        0,
        CategoryOutcome::Skipped,
        CategoryOutcome::Skipped,
    );

    assert!(matches!(r.into_result(), Err(AppError::EmptyRestore(_))));
}

#[test]
fn all_files_failing_is_partial_even_if_chats_restored() {
    let r = report(
        CategoryOutcome::Failed("all 2 files failed".into()),
        0,
        2,
        CategoryOutcome::Restored,
        CategoryOutcome::Skipped,
    );

    assert!(matches!(
        r.into_result(),
        Err(AppError::PartialRestore {
            restored: 0,
            failed: 2,
            ..
        })
    ));
}

#[test]
fn some_files_failing_is_partial() {
    let r = report(
        CategoryOutcome::Restored,
        7,
        3,
        CategoryOutcome::Skipped,
        CategoryOutcome::Restored,
    );

    match r.into_result() {
        Err(AppError::PartialRestore {
            restored,
            failed,
            summary,
        }) => {
            assert_eq!((restored, failed), (7, 3));
            assert!(summary.contains("7 ok, 3 failed"), "summary: {summary}");
        }
        other => panic!("expected partial restore, got {other:?}"),
    }
}

#[test]
fn failed_chats_alongside_restored_files_is_partial() {
    let r = report(
        CategoryOutcome::Restored,
        1,
        0,
        CategoryOutcome::Failed("locked".into()),
        CategoryOutcome::Skipped,
    );

    assert!(matches!(
        r.into_result(),
        Err(AppError::PartialRestore { restored: 1, .. })
    ));
}

#[test]
fn only_failures_is_empty() {
    let r = report(
        CategoryOutcome::Skipped,
        0,
        0,
        CategoryOutcome::Skipped,
        CategoryOutcome::Failed("rejected".into()),
    );

    assert!(matches!(r.into_result(), Err(AppError::EmptyRestore(_))));
}

#[test]
fn summary_names_every_category() {
    let r = report(
        CategoryOutcome::Restored,
        2,
        0,
        CategoryOutcome::Skipped,
        CategoryOutcome::Failed("x".into()),
    );

    assert_eq!(
        r.summary(),
        "files restored (2 ok, 0 failed), chats skipped, settings failed"
    );
}
