//! Restore preview: how the live tree differs from a snapshot.
//!
//! Files are compared by SHA-256 digest of their bytes.

use std::collections::BTreeMap;

use sha2::digest::Output;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::models::snapshot::SnapshotPayload;
use crate::providers::{EntryKind, FileTreeProvider};
use crate::Result;

/// A file whose live state differs from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivergenceEntry {
    /// Project-relative file path.
    pub file_path: String,
    /// Kind of divergence.
    pub kind: DivergenceKind,
}

/// The type of file divergence, seen from the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceKind {
    /// Content differs; restore will overwrite it.
    Modified,
    /// In the snapshot but missing live; restore will recreate it.
    Deleted,
    /// Live only; restore will remove it.
    Added,
}

/// Compare `payload` against the live file tree.
///
/// Only files present in both are read. An unreadable live file or an
/// undecodable snapshot file is reported as `Modified`. Entries come back
/// sorted by path.
///
/// # Errors
///
/// Returns an error if the live tree cannot be enumerated.
pub async fn diff_against_live(
    payload: &SnapshotPayload,
    files: &dyn FileTreeProvider,
) -> Result<Vec<DivergenceEntry>> {
    // Snapshot paths not yet matched against a live file.
    let mut unmatched: BTreeMap<&str, Option<Fingerprint>> = payload
        .files
        .iter()
        .map(|(path, record)| {
            let stored = match record.to_contents() {
                Ok(contents) => Some(fingerprint(contents.as_bytes())),
                Err(err) => {
                    warn!(path = %path, %err, "undecodable snapshot file");
                    None
                }
            };
            (path.as_str(), stored)
        })
        .collect();

    let mut entries = Vec::new();
    for entry in files.list_entries().await? {
        if entry.kind != EntryKind::File {
            continue;
        }
        let kind = match unmatched.remove(entry.path.as_str()) {
            None => Some(DivergenceKind::Added),
            Some(stored) => {
                let live = match files.read_file(&entry.path).await {
                    Ok(contents) => Some(fingerprint(contents.as_bytes())),
                    Err(err) => {
                        warn!(path = %entry.path, %err, "unreadable live file");
                        None
                    }
                };
                match (stored, live) {
                    (Some(stored), Some(live)) if stored == live => None,
                    _ => Some(DivergenceKind::Modified),
                }
            }
        };
        if let Some(kind) = kind {
            entries.push(DivergenceEntry {
                file_path: entry.path,
                kind,
            });
        }
    }

    entries.extend(unmatched.into_keys().map(|path| DivergenceEntry {
        file_path: path.to_owned(),
        kind: DivergenceKind::Deleted,
    }));
    entries.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    Ok(entries)
}

type Fingerprint = Output<Sha256>;

fn fingerprint(data: &[u8]) -> Fingerprint {
    Sha256::digest(data)
}
