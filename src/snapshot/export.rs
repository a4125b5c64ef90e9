//! Snapshot export to portable files and import back into a store.

use serde_json::Value;
use tracing::{info, info_span, warn};

use super::codec;
use super::store::{now_ms, validate_name, SnapshotStore, MAX_NAME_CHARS};
use crate::models::export::{ExportMetadata, ExportedSnapshot};
use crate::models::snapshot::Snapshot;
use crate::{AppError, Result};

/// Fields every imported document must carry.
const REQUIRED_FIELDS: [&str; 6] = ["id", "name", "timestamp", "version", "compressed", "data"];

/// Longest sanitized name embedded in an export file name.
const MAX_FILE_NAME_CHARS: usize = 50;

/// On-disk encoding of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Pretty-printed JSON document, `.json`.
    Raw,
    /// base64 of a gzip stream of the JSON document, `.snapshot`.
    Compressed,
}

impl ExportFormat {
    /// File extension, without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Raw => "json",
            Self::Compressed => "snapshot",
        }
    }

    fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Raw),
            "snapshot" => Some(Self::Compressed),
            _ => None,
        }
    }
}

/// A rendered export, ready to be written wherever the host wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    /// Suggested file name.
    pub file_name: String,
    /// File body.
    pub contents: String,
}

/// Lowercase `name`, drop everything but ASCII alphanumerics and spaces,
/// turn spaces into `_`, and cap the result at 50 characters.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .map(|c| if c == ' ' { '_' } else { c })
        .take(MAX_FILE_NAME_CHARS)
        .collect()
}

/// `project-snapshot-<sanitized-name>-<epoch-ms>.<ext>`.
#[must_use]
pub fn export_file_name(name: &str, epoch_ms: i64, format: ExportFormat) -> String {
    format!(
        "project-snapshot-{}-{epoch_ms}.{}",
        sanitize_name(name),
        format.extension()
    )
}

/// Pick a name for an imported snapshot that does not collide with
/// `existing`: `name`, then `name (Imported)`, then `name (Imported 2)`, ...
///
/// `name` is shortened as needed so the suffixed result stays within the
/// name length limit.
#[must_use]
pub fn disambiguate_name(name: &str, existing: &[Snapshot]) -> String {
    let taken = |candidate: &str| existing.iter().any(|s| s.name == candidate);
    if !taken(name) {
        return name.to_owned();
    }
    let suffixed = |suffix: &str| {
        let room = MAX_NAME_CHARS.saturating_sub(suffix.chars().count());
        format!("{}{suffix}", truncate_chars(name, room))
    };
    let first = suffixed(" (Imported)");
    if !taken(&first) {
        return first;
    }
    (2_u32..)
        .map(|n| suffixed(&format!(" (Imported {n})")))
        .find(|candidate| !taken(candidate))
        .unwrap_or(first)
}

/// Name an imported snapshot under the same rules as `create`, cutting an
/// overlong name down to the limit instead of rejecting it.
fn imported_name(name: &str) -> Result<String> {
    validate_name(&truncate_chars(name.trim(), MAX_NAME_CHARS)).map_err(|err| match err {
        AppError::Validation(msg) => AppError::Import(msg),
        other => other,
    })
}

fn truncate_chars(text: &str, max: usize) -> String {
    let cut: String = text.chars().take(max).collect();
    cut.trim_end().to_owned()
}

/// Render snapshot `id` as an export file.
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id, or `AppError::Decode` /
/// `AppError::Io` if the document cannot be encoded.
pub fn export_snapshot(store: &SnapshotStore, id: &str, format: ExportFormat) -> Result<ExportedFile> {
    let snapshot = store
        .get(id)?
        .ok_or_else(|| AppError::NotFound(format!("snapshot {id} not found")))?;

    let document = ExportedSnapshot {
        export_metadata: Some(ExportMetadata::for_snapshot(&snapshot)),
        snapshot,
    };
    let json = serde_json::to_string_pretty(&document)?;
    let contents = match format {
        ExportFormat::Raw => json,
        ExportFormat::Compressed => codec::compress_bytes(json.as_bytes())?,
    };

    let file_name = export_file_name(&document.snapshot.name, now_ms(), format);
    info!(snapshot_id = id, file_name = %file_name, bytes = contents.len(), "snapshot exported");
    Ok(ExportedFile {
        file_name,
        contents,
    })
}

/// Import an exported snapshot file and return the new snapshot id.
///
/// The snapshot gets a fresh id and keeps its original timestamp; its
/// payload is decoded, its metadata recomputed, and it is re-encoded under
/// this store's size and compression limits.
///
/// # Errors
///
/// - `AppError::Import` if the file is too large, has an unknown extension,
///   is not a well-formed snapshot document, or its name is shorter than
///   three characters once trimmed.
/// - `AppError::Oversize` if the payload exceeds the snapshot size cap.
/// - `AppError::Storage` if the imported snapshot could not be persisted.
pub fn import_snapshot(store: &SnapshotStore, file_name: &str, bytes: &[u8]) -> Result<String> {
    let span = info_span!("import_snapshot", file_name);
    let _guard = span.enter();

    let max_bytes = store.config().limits.max_import_bytes;
    if bytes.len() as u64 > max_bytes {
        return Err(AppError::Import(format!(
            "file is {} bytes, limit is {max_bytes}",
            bytes.len()
        )));
    }
    if ExportFormat::from_file_name(file_name).is_none() {
        return Err(AppError::Import(format!(
            "unsupported file type: {file_name} (expected .json or .snapshot)"
        )));
    }

    let document = parse_document(bytes)?;
    validate_required_fields(&document)?;
    let exported: ExportedSnapshot = serde_json::from_value(document)
        .map_err(|err| AppError::Import(format!("malformed snapshot document: {err}")))?;
    let original = exported.snapshot;
    let name = imported_name(&original.name)?;

    let (payload, path) = codec::decode_data(&original.data, original.compressed)
        .map_err(|err| AppError::Import(format!("snapshot payload unreadable: {err}")))?;
    let limits = &store.config().limits;
    let encoded = codec::encode_for_storage(
        payload,
        limits.compression_threshold_bytes,
        limits.max_snapshot_bytes,
    )?;

    let snapshot = Snapshot::new(
        name,
        original.description,
        original.timestamp,
        encoded.compressed,
        encoded.data,
    );
    info!(
        original_id = %original.id,
        snapshot_id = %snapshot.id,
        decode_path = ?path,
        "snapshot imported"
    );
    store.insert_with(snapshot, disambiguate_name)
}

/// Try the compressed encoding first, then plain JSON.
fn parse_document(bytes: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| AppError::Import(format!("file is not text: {err}")))?
        .trim();
    if text.is_empty() {
        return Err(AppError::Import("file is empty".into()));
    }

    match codec::decompress_bytes(text) {
        Ok(raw) => serde_json::from_slice(&raw)
            .map_err(|err| AppError::Import(format!("compressed document is not JSON: {err}"))),
        Err(compressed_err) => serde_json::from_str(text).map_err(|json_err| {
            warn!(%compressed_err, %json_err, "import document unreadable");
            AppError::Import(format!("file is neither a compressed nor a JSON snapshot: {json_err}"))
        }),
    }
}

fn validate_required_fields(document: &Value) -> Result<()> {
    let Some(object) = document.as_object() else {
        return Err(AppError::Import("snapshot document must be a JSON object".into()));
    };
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| matches!(object.get(*field), None | Some(Value::Null)))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Import(format!(
            "snapshot document is missing required fields: {}",
            missing.join(", ")
        )))
    }
}
