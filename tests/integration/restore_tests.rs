//! Restore engine behaviour through the store.

use std::collections::BTreeMap;
use std::time::Duration;

use restorepoint::models::snapshot::FileContents;
use restorepoint::snapshot::{CategoryOutcome, CreateRequest};
use restorepoint::AppError;
use serde_json::json;

use super::test_helpers::Harness;

#[tokio::test]
async fn release_one_scenario_round_trips() {
    let h = Harness::new();
    h.files.insert_text("src/main.rs", "fn main() { v1(); }");
    h.files.insert_text("README.md", "# Project");
    h.chats.set_chats(vec![json!({"id": "chat-1", "title": "Design"})]);
    h.settings.set_settings(json!({"theme": "light"}));

    let id = h.store.create(CreateRequest::named("Release 1")).await.unwrap();
    let before = h.files.contents();
    assert_eq!(h.store.list().unwrap()[0].name, "Release 1");

    h.files.insert_text("src/main.rs", "fn main() { v2(); }");
    h.files.insert_text("src/new.rs", "pub fn added() {}");
    h.files.remove("README.md");
    h.chats.set_chats(Vec::new());
    h.settings.set_settings(json!({"theme": "dark"}));

    let report = h.store.restore(&id).await.unwrap();

    assert_eq!(report.files_restored, 2);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.chats, CategoryOutcome::Restored);
    assert_eq!(report.settings, CategoryOutcome::Restored);
    assert_eq!(h.files.contents(), before);
    assert_eq!(h.chats.chats(), vec![json!({"id": "chat-1", "title": "Design"})]);
    assert_eq!(h.settings.settings(), json!({"theme": "light"}));
    assert!(!h.store.is_restoring());
}

#[tokio::test]
async fn live_files_are_cleared_before_writing() {
    let h = Harness::new();
    h.files.insert_text("keep.txt", "keep");
    let id = h.store.create(CreateRequest::named("Clean slate")).await.unwrap();
    h.files.insert_text("stray.txt", "stray");

    h.store.restore(&id).await.unwrap();

    assert_eq!(h.files.paths(), vec!["keep.txt".to_owned()]);
    let deleted = h.files.deleted();
    assert!(deleted.contains(&"stray.txt".to_owned()));
    assert!(deleted.contains(&"keep.txt".to_owned()));
    assert_eq!(h.files.created(), vec!["keep.txt".to_owned()]);
}

#[tokio::test]
async fn binary_files_are_restored_byte_for_byte() {
    let h = Harness::new();
    let bytes = [0_u8, 159, 146, 150, 255];
    h.files.insert_binary("blob.bin", &bytes);
    let id = h.store.create(CreateRequest::named("Binary")).await.unwrap();
    h.files.remove("blob.bin");

    h.store.restore(&id).await.unwrap();

    assert_eq!(
        h.files.contents().get("blob.bin"),
        Some(&FileContents::Binary(bytes.to_vec()))
    );
}

#[tokio::test]
async fn three_of_ten_failing_is_partial() {
    let h = Harness::new();
    for n in 0..10 {
        h.files.insert_text(&format!("file{n}.txt"), &format!("content {n}"));
    }
    let id = h.store.create(CreateRequest::named("Ten files")).await.unwrap();
    for n in [2, 5, 8] {
        h.files.fail_writes_for(&format!("file{n}.txt"));
    }

    let result = h.store.restore(&id).await;

    match result {
        Err(AppError::PartialRestore {
            restored, failed, ..
        }) => {
            assert_eq!(restored, 7);
            assert_eq!(failed, 3);
        }
        other => panic!("expected partial restore, got {other:?}"),
    }
    assert!(!h.store.is_restoring());
    assert_eq!(h.files.paths().len(), 7);
}

#[tokio::test]
async fn every_file_failing_is_partial_with_zero_restored() {
    let h = Harness::new();
    h.files.insert_text("a.txt", "a");
    h.files.insert_text("b.txt", "b");
    h.settings.set_settings(json!({"theme": "dark"}));
    let id = h.store.create(CreateRequest::named("All fail")).await.unwrap();
    h.files.fail_writes_for("a.txt");
    h.files.fail_writes_for("b.txt");

    let result = h.store.restore(&id).await;

    assert!(matches!(
        result,
        Err(AppError::PartialRestore {
            restored: 0,
            failed: 2,
            ..
        })
    ));
}

#[tokio::test]
async fn concurrent_restore_is_rejected() {
    let h = Harness::new();
    h.files.insert_text("slow.txt", "slow");
    let id = h.store.create(CreateRequest::named("Slow restore")).await.unwrap();
    h.files.delay_writes(Duration::from_millis(50));

    let (first, second) = tokio::join!(h.store.restore(&id), h.store.restore(&id));

    assert!(first.is_ok());
    assert!(matches!(second, Err(AppError::ConcurrentRestore)));
    assert!(!h.store.is_restoring());
}

#[tokio::test]
async fn empty_snapshot_restores_nothing() {
    let h = Harness::new();
    let id = h
        .store
        .create(
            CreateRequest::named("Empty")
                .with_files(BTreeMap::new())
                .with_chats(Vec::new())
                .with_settings(json!({})),
        )
        .await
        .unwrap();

    let result = h.store.restore(&id).await;

    assert!(matches!(result, Err(AppError::EmptyRestore(_))));
    assert!(!h.store.is_restoring());
}

#[tokio::test]
async fn unknown_snapshot_is_not_found() {
    let h = Harness::new();

    let result = h.store.restore("missing").await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(!h.store.is_restoring());
}

#[tokio::test]
async fn chats_are_skipped_without_a_chat_store() {
    let h = Harness::without_chat_store();
    h.files.insert_text("a.txt", "a");
    let id = h
        .store
        .create(CreateRequest::named("No chats").with_chats(vec![json!({"id": "orphan"})]))
        .await
        .unwrap();

    let report = h.store.restore(&id).await.unwrap();

    assert_eq!(report.chats, CategoryOutcome::Skipped);
    assert_eq!(report.files_restored, 1);
}

#[tokio::test]
async fn settings_failure_alongside_restored_files_is_partial() {
    let h = Harness::new();
    h.files.insert_text("a.txt", "a");
    h.settings.set_settings(json!({"theme": "dark"}));
    let id = h.store.create(CreateRequest::named("Bad settings")).await.unwrap();
    h.settings.fail(true);

    let result = h.store.restore(&id).await;

    assert!(matches!(
        result,
        Err(AppError::PartialRestore {
            restored: 1,
            failed: 0,
            ..
        })
    ));
    assert_eq!(h.files.text("a.txt").as_deref(), Some("a"));
}

#[tokio::test]
async fn only_settings_failing_is_empty() {
    let h = Harness::new();
    let id = h
        .store
        .create(
            CreateRequest::named("Settings only")
                .with_files(BTreeMap::new())
                .with_settings(json!({"theme": "dark"})),
        )
        .await
        .unwrap();
    h.settings.fail(true);

    let result = h.store.restore(&id).await;

    assert!(matches!(result, Err(AppError::EmptyRestore(_))));
}

#[tokio::test]
async fn preview_reports_divergence_without_touching_state() {
    let h = Harness::new();
    h.files.insert_text("same.txt", "same");
    h.files.insert_text("changed.txt", "before");
    h.files.insert_text("gone.txt", "gone");
    let id = h.store.create(CreateRequest::named("Preview me")).await.unwrap();
    h.files.insert_text("changed.txt", "after");
    h.files.remove("gone.txt");
    h.files.insert_text("extra.txt", "extra");

    let entries = h.store.preview_restore(&id).await.unwrap();

    let summary: Vec<(String, String)> = entries
        .iter()
        .map(|entry| (entry.file_path.clone(), format!("{:?}", entry.kind)))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("changed.txt".to_owned(), "Modified".to_owned()),
            ("extra.txt".to_owned(), "Added".to_owned()),
            ("gone.txt".to_owned(), "Deleted".to_owned()),
        ]
    );
    assert!(h.files.created().is_empty());
    assert!(h.files.deleted().is_empty());
}

#[tokio::test]
async fn chat_failure_alongside_restored_files_is_partial() {
    let h = Harness::new();
    h.files.insert_text("a.txt", "a");
    h.chats.set_chats(vec![json!({"id": "c1"})]);
    let id = h.store.create(CreateRequest::named("Chat trouble")).await.unwrap();
    h.chats.fail(true);

    let result = h.store.restore(&id).await;

    match result {
        Err(AppError::PartialRestore {
            restored, summary, ..
        }) => {
            assert_eq!(restored, 1);
            assert!(summary.contains("chats failed"), "summary: {summary}");
        }
        other => panic!("expected partial restore, got {other:?}"),
    }
}
