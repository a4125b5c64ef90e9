//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration covering every snapshot and recovery failure mode.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Durable key-value storage read or write failure.
    Storage(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Caller-supplied name, description or setting is invalid.
    Validation(String),
    /// Payload or file exceeds a configured size cap.
    Oversize(String),
    /// Compressed or JSON data could not be decoded.
    Decode(String),
    /// Requested snapshot does not exist.
    NotFound(String),
    /// Snapshot held nothing that could be restored.
    EmptyRestore(String),
    /// Some, but not all, of a snapshot was restored.
    PartialRestore {
        /// Files written back successfully.
        restored: usize,
        /// Files that failed to write.
        failed: usize,
        /// Human-readable per-category summary.
        summary: String,
    },
    /// A restore was requested while another restore is running.
    ConcurrentRestore,
    /// Exported snapshot file was rejected during import.
    Import(String),
    /// File path failed validation against the workspace root.
    PathViolation(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Storage(msg) => write!(f, "storage: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Oversize(msg) => write!(f, "oversize: {msg}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::EmptyRestore(msg) => write!(f, "empty restore: {msg}"),
            Self::PartialRestore {
                restored,
                failed,
                summary,
            } => write!(
                f,
                "partial restore: {restored} files restored, {failed} failed ({summary})"
            ),
            Self::ConcurrentRestore => write!(f, "concurrent restore: a restore is already running"),
            Self::Import(msg) => write!(f, "import: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
