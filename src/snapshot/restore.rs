//! Restore engine: writes a decoded payload back onto live project state.
//!
//! Files, chats and settings are restored independently. Per-file failures
//! are counted rather than raised; only the aggregate outcome becomes an
//! error (see [`RestoreReport::into_result`]).

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::models::snapshot::SnapshotPayload;
use crate::providers::{EntryKind, Providers};
use crate::{AppError, Result};

/// Outcome of restoring one category of state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryOutcome {
    /// Nothing to restore, or no collaborator to restore into.
    Skipped,
    /// Restored (for files: at least one file written).
    Restored,
    /// Attempted and failed.
    Failed(String),
}

impl CategoryOutcome {
    fn attempted(&self) -> bool {
        !matches!(self, Self::Skipped)
    }

    fn succeeded(&self) -> bool {
        matches!(self, Self::Restored)
    }

    fn label(&self) -> &str {
        match self {
            Self::Skipped => "skipped",
            Self::Restored => "restored",
            Self::Failed(_) => "failed",
        }
    }
}

/// Per-category accounting for one restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Outcome for the file tree.
    pub files: CategoryOutcome,
    /// Files written successfully.
    pub files_restored: usize,
    /// Files that failed to write.
    pub files_failed: usize,
    /// Paths that failed to write, in restore order.
    pub failed_paths: Vec<String>,
    /// Outcome for chats.
    pub chats: CategoryOutcome,
    /// Outcome for settings.
    pub settings: CategoryOutcome,
}

impl RestoreReport {
    /// One-line summary of every category.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "files {} ({} ok, {} failed), chats {}, settings {}",
            self.files.label(),
            self.files_restored,
            self.files_failed,
            self.chats.label(),
            self.settings.label()
        )
    }

    /// Fold the report into the restore's final result.
    ///
    /// # Errors
    ///
    /// - `AppError::PartialRestore` when files were attempted and none was
    ///   written, or when anything failed alongside something that succeeded.
    /// - `AppError::EmptyRestore` when no category was restored.
    pub fn into_result(self) -> Result<Self> {
        if self.files_restored == 0 && self.files_failed > 0 {
            return Err(AppError::PartialRestore {
                restored: 0,
                failed: self.files_failed,
                summary: self.summary(),
            });
        }

        let categories = [&self.files, &self.chats, &self.settings];
        if !categories.iter().any(|c| c.succeeded()) {
            return Err(AppError::EmptyRestore(format!(
                "nothing was restored: {}",
                self.summary()
            )));
        }

        let any_failed = categories
            .iter()
            .any(|c| c.attempted() && !c.succeeded());
        if any_failed || self.files_failed > 0 {
            return Err(AppError::PartialRestore {
                restored: self.files_restored,
                failed: self.files_failed,
                summary: self.summary(),
            });
        }

        Ok(self)
    }
}

/// Holds the `restoring` flag for the lifetime of one restore.
///
/// Dropping the guard clears the flag, so every exit path resets it.
pub(crate) struct RestoringGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RestoringGuard<'a> {
    /// Claim the flag.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConcurrentRestore` if it is already held.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AppError::ConcurrentRestore)?;
        Ok(Self { flag })
    }
}

impl Drop for RestoringGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Apply `payload` to live state through `providers`.
///
/// Never fails as a whole; the returned report records what happened.
pub(crate) async fn apply_payload(providers: &Providers, payload: &SnapshotPayload) -> RestoreReport {
    let (files, files_restored, failed_paths) = restore_files(providers, payload).await;
    let chats = restore_chats(providers, payload).await;
    let settings = restore_settings(providers, payload).await;

    RestoreReport {
        files,
        files_restored,
        files_failed: failed_paths.len(),
        failed_paths,
        chats,
        settings,
    }
}

async fn restore_files(
    providers: &Providers,
    payload: &SnapshotPayload,
) -> (CategoryOutcome, usize, Vec<String>) {
    if payload.files.is_empty() {
        debug!("snapshot has no files");
        return (CategoryOutcome::Skipped, 0, Vec::new());
    }

    // Clear the live tree first so files absent from the snapshot disappear.
    match providers.files.list_entries().await {
        Ok(entries) => {
            for entry in entries.iter().filter(|e| e.kind == EntryKind::File) {
                if let Err(err) = providers.files.delete_file(&entry.path).await {
                    warn!(path = %entry.path, %err, "failed to delete live file");
                }
            }
        }
        Err(err) => warn!(%err, "failed to list live files before restore"),
    }

    let mut restored = 0;
    let mut failed_paths = Vec::new();
    for (path, record) in &payload.files {
        let written = match record.to_contents() {
            Ok(contents) => providers.files.create_file(path, &contents).await,
            Err(err) => Err(err),
        };
        match written {
            Ok(()) => restored += 1,
            Err(err) => {
                warn!(path = %path, %err, "failed to restore file");
                failed_paths.push(path.clone());
            }
        }
    }

    let outcome = if restored == 0 {
        CategoryOutcome::Failed(format!("all {} files failed", failed_paths.len()))
    } else {
        CategoryOutcome::Restored
    };
    info!(restored, failed = failed_paths.len(), "files restored");
    (outcome, restored, failed_paths)
}

async fn restore_chats(providers: &Providers, payload: &SnapshotPayload) -> CategoryOutcome {
    if payload.chats.is_empty() {
        return CategoryOutcome::Skipped;
    }
    let Some(chats) = &providers.chats else {
        warn!(
            chats = payload.chats.len(),
            "no chat store available; skipping chat restore"
        );
        return CategoryOutcome::Skipped;
    };
    match chats.replace_all(payload.chats.clone()).await {
        Ok(()) => {
            info!(chats = payload.chats.len(), "chats restored");
            CategoryOutcome::Restored
        }
        Err(err) => {
            warn!(%err, "failed to restore chats");
            CategoryOutcome::Failed(err.to_string())
        }
    }
}

async fn restore_settings(providers: &Providers, payload: &SnapshotPayload) -> CategoryOutcome {
    if !payload.has_settings() {
        return CategoryOutcome::Skipped;
    }
    match providers
        .settings
        .import_settings(payload.settings.clone())
        .await
    {
        Ok(()) => {
            info!("settings restored");
            CategoryOutcome::Restored
        }
        Err(err) => {
            warn!(%err, "failed to restore settings");
            CategoryOutcome::Failed(err.to_string())
        }
    }
}
