//! Snapshot model: a named, point-in-time capture of project state.

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::{AppError, Result};

/// Schema version written into every new snapshot.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Name prefix shared by every system-generated auto-save.
pub const AUTO_SAVE_PREFIX: &str = "Auto-save ";

/// Whether `name` follows the auto-save naming convention.
#[must_use]
pub fn is_auto_save_name(name: &str) -> bool {
    name.starts_with(AUTO_SAVE_PREFIX)
}

/// Build an auto-save name stamped with the local wall-clock time.
#[must_use]
pub fn auto_save_name(at: DateTime<Utc>) -> String {
    let local = at.with_timezone(&Local);
    format!("{AUTO_SAVE_PREFIX}{}", local.format("%Y-%m-%d %H:%M:%S"))
}

/// A single captured file.
///
/// Binary content is kept base64-encoded so the payload stays valid JSON;
/// `size` is always the decoded byte length.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// UTF-8 text, or base64 when `is_binary` is set.
    pub content: String,
    /// Whether `content` holds base64-encoded bytes.
    pub is_binary: bool,
    /// Decoded content length in bytes.
    pub size: u64,
}

impl FileRecord {
    /// Record a text file.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        let content = content.into();
        let size = content.len() as u64;
        Self {
            content,
            is_binary: false,
            size,
        }
    }

    /// Record a binary file.
    #[must_use]
    pub fn binary(bytes: &[u8]) -> Self {
        Self {
            content: STANDARD.encode(bytes),
            is_binary: true,
            size: bytes.len() as u64,
        }
    }

    /// Recover the live representation of this record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Decode` if binary content is not valid base64.
    pub fn to_contents(&self) -> Result<FileContents> {
        if self.is_binary {
            let bytes = STANDARD
                .decode(self.content.as_bytes())
                .map_err(|err| AppError::Decode(format!("invalid binary file content: {err}")))?;
            Ok(FileContents::Binary(bytes))
        } else {
            Ok(FileContents::Text(self.content.clone()))
        }
    }

    /// Size recomputed from the content, ignoring the stored `size`.
    fn measured_size(&self) -> u64 {
        if self.is_binary {
            STANDARD
                .decode(self.content.as_bytes())
                .map_or(self.size, |bytes| bytes.len() as u64)
        } else {
            self.content.len() as u64
        }
    }
}

/// Live file contents exchanged with the file-tree collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContents {
    /// UTF-8 text file.
    Text(String),
    /// Arbitrary bytes.
    Binary(Vec<u8>),
}

impl FileContents {
    /// Raw bytes of the contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Classify raw bytes: valid UTF-8 becomes text, anything else binary.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(err) => Self::Binary(err.into_bytes()),
        }
    }

    /// Convert into a payload record.
    #[must_use]
    pub fn to_record(&self) -> FileRecord {
        match self {
            Self::Text(text) => FileRecord::text(text.clone()),
            Self::Binary(bytes) => FileRecord::binary(bytes),
        }
    }
}

/// Derived summary of a payload.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMetadata {
    /// Number of captured files.
    pub files_count: usize,
    /// Sum of captured file sizes in bytes.
    pub total_size: u64,
    /// Number of captured chat sessions.
    pub chat_count: usize,
}

/// Structured snapshot body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    /// Project-relative path to file record.
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,
    /// Opaque chat-session records, in order.
    #[serde(default)]
    pub chats: Vec<serde_json::Value>,
    /// Opaque settings blob.
    #[serde(default)]
    pub settings: serde_json::Value,
    /// Derived summary; recomputed on build and validation.
    #[serde(default)]
    pub metadata: PayloadMetadata,
}

impl SnapshotPayload {
    /// Assemble a payload and compute its metadata.
    #[must_use]
    pub fn new(
        files: BTreeMap<String, FileRecord>,
        chats: Vec<serde_json::Value>,
        settings: serde_json::Value,
    ) -> Self {
        let mut payload = Self {
            files,
            chats,
            settings,
            metadata: PayloadMetadata::default(),
        };
        payload.recompute_metadata();
        payload
    }

    /// Recompute file sizes and the metadata block from the payload contents.
    pub fn recompute_metadata(&mut self) {
        let mut total_size = 0_u64;
        for record in self.files.values_mut() {
            record.size = record.measured_size();
            total_size = total_size.saturating_add(record.size);
        }
        self.metadata = PayloadMetadata {
            files_count: self.files.len(),
            total_size,
            chat_count: self.chats.len(),
        };
    }

    /// Whether the settings blob carries anything worth importing.
    #[must_use]
    pub fn has_settings(&self) -> bool {
        match &self.settings {
            serde_json::Value::Null => false,
            serde_json::Value::Object(map) => !map.is_empty(),
            _ => true,
        }
    }
}

/// Stored payload: either the structured body or its compressed text form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SnapshotData {
    /// Compressed (or legacy string-wrapped) encoding.
    Encoded(String),
    /// Structured body stored as-is.
    Raw(SnapshotPayload),
}

/// A named, timestamped capture of project state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Unique record identifier.
    pub id: String,
    /// Display label.
    pub name: String,
    /// Optional free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
    /// Schema version.
    pub version: String,
    /// Whether `data` is a compressed encoding.
    pub compressed: bool,
    /// The payload.
    pub data: SnapshotData,
}

impl Snapshot {
    /// Construct a snapshot with a fresh identifier stamped at `timestamp`.
    #[must_use]
    pub fn new(
        name: String,
        description: Option<String>,
        timestamp: i64,
        compressed: bool,
        data: SnapshotData,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            timestamp,
            version: SNAPSHOT_VERSION.to_owned(),
            compressed,
            data,
        }
    }

    /// Whether this snapshot was produced by auto-save.
    #[must_use]
    pub fn is_auto_save(&self) -> bool {
        is_auto_save_name(&self.name)
    }

    /// Bytes occupied by the stored payload.
    #[must_use]
    pub fn stored_size(&self) -> u64 {
        match &self.data {
            SnapshotData::Encoded(text) => text.len() as u64,
            SnapshotData::Raw(payload) => {
                serde_json::to_vec(payload).map_or(payload.metadata.total_size, |v| v.len() as u64)
            }
        }
    }
}

/// Serialize an insertion-ordered snapshot list as an `id -> snapshot` map.
fn serialize_snapshot_map<S>(
    snapshots: &[Snapshot],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(snapshots.len()))?;
    for snapshot in snapshots {
        map.serialize_entry(&snapshot.id, snapshot)?;
    }
    map.end()
}

/// Deserialize an `id -> snapshot` map, keeping document order.
fn deserialize_snapshot_map<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<Snapshot>, D::Error>
where
    D: Deserializer<'de>,
{
    struct SnapshotMapVisitor;

    impl<'de> Visitor<'de> for SnapshotMapVisitor {
        type Value = Vec<Snapshot>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of snapshot id to snapshot")
        }

        fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut snapshots = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, mut snapshot)) = access.next_entry::<String, Snapshot>()? {
                // The map key is authoritative for the record id.
                snapshot.id = key;
                snapshots.push(snapshot);
            }
            Ok(snapshots)
        }
    }

    deserializer.deserialize_map(SnapshotMapVisitor)
}

/// Wrapper used to persist the snapshot collection under one key.
#[derive(Debug, Default)]
pub struct SnapshotMap(pub Vec<Snapshot>);

impl Serialize for SnapshotMap {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_snapshot_map(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for SnapshotMap {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_snapshot_map(deserializer).map(Self)
    }
}

/// Borrowed view of a snapshot list, serialized like [`SnapshotMap`].
#[derive(Debug, Clone, Copy)]
pub struct SnapshotMapRef<'a>(pub &'a [Snapshot]);

impl Serialize for SnapshotMapRef<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_snapshot_map(self.0, serializer)
    }
}
