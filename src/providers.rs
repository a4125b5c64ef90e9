//! Collaborator interfaces into live project state.
//!
//! The snapshot subsystem never owns project files, chats or settings. It
//! reads and writes them through these traits, which the host implements
//! (see [`crate::workspace`] for the directory-backed implementations).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::models::snapshot::FileContents;
use crate::Result;

/// Boxed, sendable future returned by collaborator methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Kind of a file-tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file; the only kind that is captured.
    File,
    /// Directory.
    Directory,
    /// Symbolic link or other non-regular entry.
    Symlink,
}

/// One entry of the live file tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Project-relative path using `/` separators.
    pub path: String,
    /// Entry kind.
    pub kind: EntryKind,
}

impl TreeEntry {
    /// Regular file entry at `path`.
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    /// Directory entry at `path`.
    #[must_use]
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }
}

/// Live project file tree.
pub trait FileTreeProvider: Send + Sync {
    /// Enumerate every entry in the tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be enumerated at all.
    fn list_entries(&self) -> BoxFuture<'_, Result<Vec<TreeEntry>>>;

    /// Read one file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable.
    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<FileContents>>;

    /// Create (or overwrite) a file with `contents`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn create_file<'a>(
        &'a self,
        path: &'a str,
        contents: &'a FileContents,
    ) -> BoxFuture<'a, Result<()>>;

    /// Delete a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be removed.
    fn delete_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Chat transcript database.
pub trait ChatHistoryProvider: Send + Sync {
    /// All chat sessions, in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the chat store cannot be read.
    fn list_chats(&self) -> BoxFuture<'_, Result<Vec<serde_json::Value>>>;

    /// Replace every chat session with `chats`.
    ///
    /// # Errors
    ///
    /// Returns an error if the chat store cannot be written.
    fn replace_all(&self, chats: Vec<serde_json::Value>) -> BoxFuture<'_, Result<()>>;
}

/// Application settings import/export.
pub trait SettingsProvider: Send + Sync {
    /// Current settings as an opaque blob.
    ///
    /// # Errors
    ///
    /// Returns an error if settings cannot be exported.
    fn export_settings(&self) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Apply a previously exported settings blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is rejected or cannot be applied.
    fn import_settings(&self, settings: serde_json::Value) -> BoxFuture<'_, Result<()>>;
}

/// The set of collaborators a store reads from and restores into.
#[derive(Clone)]
pub struct Providers {
    /// Live file tree.
    pub files: Arc<dyn FileTreeProvider>,
    /// Chat database; `None` when the host has no chat store.
    pub chats: Option<Arc<dyn ChatHistoryProvider>>,
    /// Settings import/export.
    pub settings: Arc<dyn SettingsProvider>,
}

impl Providers {
    /// Bundle collaborators.
    #[must_use]
    pub fn new(
        files: Arc<dyn FileTreeProvider>,
        chats: Option<Arc<dyn ChatHistoryProvider>>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            files,
            chats,
            settings,
        }
    }
}
