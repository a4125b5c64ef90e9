//! Live file tree rooted at a workspace directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{blocking, validate_workspace_path, write_atomic};
use crate::models::snapshot::FileContents;
use crate::providers::{BoxFuture, EntryKind, FileTreeProvider, TreeEntry};
use crate::{AppError, Result};

/// [`FileTreeProvider`] over a directory on disk.
///
/// Entries are reported with `/`-separated paths relative to the root.
/// Ignored directory names and excluded paths are never descended into.
#[derive(Debug, Clone)]
pub struct DirectoryFileTree {
    root: PathBuf,
    ignore: Vec<String>,
    excluded: Vec<PathBuf>,
}

impl DirectoryFileTree {
    /// Provider rooted at `root`, skipping directories named in `ignore`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PathViolation` if `root` cannot be canonicalized.
    pub fn new(root: impl AsRef<Path>, ignore: Vec<String>) -> Result<Self> {
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|err| AppError::PathViolation(format!("workspace root invalid: {err}")))?;
        Ok(Self {
            root,
            ignore,
            excluded: Vec::new(),
        })
    }

    /// Also skip the subtree at `path` (typically the state directory).
    #[must_use]
    pub fn excluding(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = path.canonicalize().unwrap_or_else(|_| self.root.join(path));
        self.excluded.push(absolute);
        self
    }

    fn walk(&self) -> Result<Vec<TreeEntry>> {
        let mut entries = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let listing = match std::fs::read_dir(&dir) {
                Ok(listing) => listing,
                Err(err) if dir == self.root => {
                    return Err(AppError::Io(format!(
                        "failed to list {}: {err}",
                        dir.display()
                    )));
                }
                Err(err) => {
                    warn!(dir = %dir.display(), %err, "skipping unreadable directory");
                    continue;
                }
            };

            for item in listing {
                let item = match item {
                    Ok(item) => item,
                    Err(err) => {
                        warn!(dir = %dir.display(), %err, "skipping unreadable entry");
                        continue;
                    }
                };
                let path = item.path();
                let Some(relative) = self.relative(&path) else {
                    continue;
                };
                let Ok(file_type) = item.file_type() else {
                    warn!(path = %relative, "skipping entry with unknown type");
                    continue;
                };

                if file_type.is_symlink() {
                    entries.push(TreeEntry {
                        path: relative,
                        kind: EntryKind::Symlink,
                    });
                } else if file_type.is_dir() {
                    if self.is_skipped_dir(&path) {
                        debug!(path = %relative, "directory skipped");
                        continue;
                    }
                    entries.push(TreeEntry::directory(relative));
                    pending.push(path);
                } else if file_type.is_file() {
                    entries.push(TreeEntry::file(relative));
                }
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn is_skipped_dir(&self, path: &Path) -> bool {
        let ignored_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.is_ignored_name(name));
        ignored_name || self.excluded.iter().any(|excluded| path == excluded)
    }

    fn is_ignored_name(&self, name: &str) -> bool {
        self.ignore.iter().any(|ignored| ignored == name)
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect();
        parts.map(|parts| parts.join("/"))
    }

    /// Validate `path` and reject anything inside a skipped subtree, so a
    /// restored payload can never write into the state directory.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let absolute = validate_workspace_path(&self.root, path)?;
        if self.excluded.iter().any(|excluded| absolute.starts_with(excluded)) {
            return Err(AppError::PathViolation(format!("{path} is in an excluded directory")));
        }
        let in_ignored_dir = absolute
            .strip_prefix(&self.root)
            .ok()
            .and_then(Path::parent)
            .is_some_and(|parent| {
                parent
                    .components()
                    .filter_map(|component| component.as_os_str().to_str())
                    .any(|name| self.is_ignored_name(name))
            });
        if in_ignored_dir {
            return Err(AppError::PathViolation(format!("{path} is in an ignored directory")));
        }
        Ok(absolute)
    }
}

impl FileTreeProvider for DirectoryFileTree {
    fn list_entries(&self) -> BoxFuture<'_, Result<Vec<TreeEntry>>> {
        Box::pin(async move {
            let tree = self.clone();
            blocking(move || tree.walk()).await
        })
    }

    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<FileContents>> {
        Box::pin(async move {
            let absolute = self.resolve(path)?;
            let bytes = tokio::fs::read(&absolute)
                .await
                .map_err(|err| AppError::Io(format!("failed to read {path}: {err}")))?;
            Ok(FileContents::from_bytes(bytes))
        })
    }

    fn create_file<'a>(
        &'a self,
        path: &'a str,
        contents: &'a FileContents,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let absolute = self.resolve(path)?;
            let bytes = contents.as_bytes().to_vec();
            blocking(move || write_atomic(&absolute, &bytes)).await
        })
    }

    fn delete_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let absolute = self.resolve(path)?;
            match tokio::fs::remove_file(&absolute).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(AppError::Io(format!("failed to delete {path}: {err}"))),
            }
        })
    }
}
