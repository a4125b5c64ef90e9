//! Content serializer: captures live project state into a payload.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info_span, warn, Instrument};

use crate::models::snapshot::{FileRecord, SnapshotPayload};
use crate::providers::{EntryKind, Providers};
use crate::Result;

/// Reads the file tree, chats and settings collaborators into a
/// [`SnapshotPayload`] without mutating any of them.
#[derive(Clone)]
pub struct ContentSerializer {
    providers: Providers,
    read_timeout: Duration,
}

impl ContentSerializer {
    /// Construct a serializer bounding each file read by `read_timeout`.
    #[must_use]
    pub fn new(providers: Providers, read_timeout: Duration) -> Self {
        Self {
            providers,
            read_timeout,
        }
    }

    /// Capture every regular file.
    ///
    /// Directories and symlinks are skipped. A file that is missing,
    /// unreadable or slower than the read timeout is logged and left out.
    ///
    /// # Errors
    ///
    /// Returns an error only if the tree itself cannot be enumerated.
    pub async fn capture_files(&self) -> Result<BTreeMap<String, FileRecord>> {
        let entries = self.providers.files.list_entries().await?;
        let mut files = BTreeMap::new();

        for entry in entries {
            if entry.kind != EntryKind::File {
                continue;
            }

            match tokio::time::timeout(self.read_timeout, self.providers.files.read_file(&entry.path))
                .await
            {
                Ok(Ok(contents)) => {
                    files.insert(entry.path, contents.to_record());
                }
                Ok(Err(err)) => {
                    warn!(path = %entry.path, %err, "skipping unreadable file");
                }
                Err(_) => {
                    warn!(
                        path = %entry.path,
                        timeout_secs = self.read_timeout.as_secs(),
                        "skipping file: read timed out"
                    );
                }
            }
        }

        Ok(files)
    }

    /// Capture chat sessions. A missing or failing chat store yields none.
    pub async fn capture_chats(&self) -> Vec<serde_json::Value> {
        let Some(chats) = &self.providers.chats else {
            debug!("no chat store; capturing zero chats");
            return Vec::new();
        };
        match chats.list_chats().await {
            Ok(chats) => chats,
            Err(err) => {
                warn!(%err, "failed to read chats; capturing zero chats");
                Vec::new()
            }
        }
    }

    /// Capture settings. A failing export yields an empty object.
    pub async fn capture_settings(&self) -> serde_json::Value {
        match self.providers.settings.export_settings().await {
            Ok(settings) => settings,
            Err(err) => {
                warn!(%err, "failed to export settings; capturing empty settings");
                serde_json::Value::Object(serde_json::Map::new())
            }
        }
    }

    /// Capture the full live state in one pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the file tree cannot be enumerated.
    pub async fn serialize(&self) -> Result<SnapshotPayload> {
        async {
            let files = self.capture_files().await?;
            let chats = self.capture_chats().await;
            let settings = self.capture_settings().await;
            let payload = SnapshotPayload::new(files, chats, settings);
            debug!(
                files = payload.metadata.files_count,
                total_size = payload.metadata.total_size,
                chats = payload.metadata.chat_count,
                "live state serialized"
            );
            Ok(payload)
        }
        .instrument(info_span!("serialize_live_state"))
        .await
    }
}
