//! Directory-backed collaborators for hosts operating on a real project.
//!
//! Every path handed to these providers is validated against the
//! workspace root: `..` traversal and symlink escapes are rejected.

mod documents;
mod files;

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;

pub use documents::{JsonFileChats, JsonFileSettings};
pub use files::DirectoryFileTree;

use crate::{AppError, Result};

/// Resolve project-relative `candidate` inside `workspace_root`.
///
/// Returns the absolute path on success; existing paths are canonicalized so
/// symlinks are resolved before the containment check.
///
/// # Errors
///
/// Returns `AppError::PathViolation` if:
/// - The workspace root cannot be canonicalized.
/// - The candidate is empty or names the root itself.
/// - The candidate contains `..` segments that escape the root.
/// - The resolved path does not start with the workspace root.
/// - The resolved path is a symlink whose target escapes the workspace.
pub fn validate_workspace_path(
    workspace_root: &Path,
    candidate: impl AsRef<Path>,
) -> Result<PathBuf> {
    let root = workspace_root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("workspace root invalid: {err}")))?;

    let mut normalized = PathBuf::new();
    for component in candidate.as_ref().components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::PathViolation(format!(
                        "{} escapes the workspace",
                        candidate.as_ref().display()
                    )));
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => normalized.clear(),
            Component::Normal(part) => normalized.push(part),
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(AppError::PathViolation("empty file path".into()));
    }

    let absolute = if normalized.is_absolute() {
        normalized
    } else {
        root.join(normalized)
    };
    if !absolute.starts_with(&root) || absolute == root {
        return Err(AppError::PathViolation(format!(
            "{} is outside the workspace",
            absolute.display()
        )));
    }

    if absolute.symlink_metadata().is_ok() {
        let canonical = absolute
            .canonicalize()
            .map_err(|err| AppError::PathViolation(format!("cannot resolve path: {err}")))?;
        if !canonical.starts_with(&root) {
            return Err(AppError::PathViolation(format!(
                "{} links outside the workspace",
                absolute.display()
            )));
        }
        return Ok(canonical);
    }
    Ok(absolute)
}

/// Write `bytes` to `path` atomically, creating parent directories.
///
/// # Errors
///
/// Returns `AppError::Io` if a directory, the temporary file or the final
/// rename fails.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Io(format!("{} has no parent directory", path.display())))?;
    std::fs::create_dir_all(parent).map_err(|err| {
        AppError::Io(format!(
            "failed to create parent directories for {}: {err}",
            path.display()
        ))
    })?;

    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
    tmp.write_all(bytes)
        .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
    tmp.persist(path)
        .map_err(|err| AppError::Io(format!("failed to persist {}: {err}", path.display())))?;
    Ok(())
}

/// Run blocking file-system work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| AppError::Io(format!("file task failed: {err}")))?
}
