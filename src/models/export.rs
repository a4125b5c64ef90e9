//! Portable export document wrapping a snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::Snapshot;

/// Version of the export document layout.
pub const EXPORT_VERSION: &str = "1.0";

/// Provenance block attached to every exported snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    /// When the export was produced.
    pub export_date: DateTime<Utc>,
    /// Export document layout version.
    pub export_version: String,
    /// Identifier of the snapshot in the exporting store.
    pub original_id: String,
    /// Crate version that produced the export.
    pub app_version: String,
}

impl ExportMetadata {
    /// Provenance for exporting `snapshot` now.
    #[must_use]
    pub fn for_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            export_date: Utc::now(),
            export_version: EXPORT_VERSION.to_owned(),
            original_id: snapshot.id.clone(),
            app_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

/// Full snapshot plus export provenance, as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSnapshot {
    /// The exported snapshot, flattened into the document root.
    #[serde(flatten)]
    pub snapshot: Snapshot,
    /// Provenance; absent in documents written by older exporters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_metadata: Option<ExportMetadata>,
}
