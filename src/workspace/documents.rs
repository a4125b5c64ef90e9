//! Chat and settings collaborators stored as JSON documents.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{blocking, write_atomic};
use crate::providers::{BoxFuture, ChatHistoryProvider, SettingsProvider};
use crate::{AppError, Result};

async fn read_document(path: &Path) -> Result<Option<Value>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => serde_json::from_str(&raw).map(Some).map_err(|err| {
            AppError::Decode(format!("{} is not valid JSON: {err}", path.display()))
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(AppError::Io(format!(
            "failed to read {}: {err}",
            path.display()
        ))),
    }
}

async fn write_document(path: PathBuf, value: &Value) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    blocking(move || write_atomic(&path, &bytes)).await
}

/// Chat transcripts kept as one JSON array. A missing file is no chats.
#[derive(Debug, Clone)]
pub struct JsonFileChats {
    path: PathBuf,
}

impl JsonFileChats {
    /// Chats stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ChatHistoryProvider for JsonFileChats {
    fn list_chats(&self) -> BoxFuture<'_, Result<Vec<Value>>> {
        Box::pin(async move {
            match read_document(&self.path).await? {
                None => Ok(Vec::new()),
                Some(Value::Array(chats)) => Ok(chats),
                Some(_) => Err(AppError::Decode(format!(
                    "{} must hold a JSON array",
                    self.path.display()
                ))),
            }
        })
    }

    fn replace_all(&self, chats: Vec<Value>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { write_document(self.path.clone(), &Value::Array(chats)).await })
    }
}

/// Settings kept as one JSON document. A missing file is `{}`.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    /// Settings stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsProvider for JsonFileSettings {
    fn export_settings(&self) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            Ok(read_document(&self.path)
                .await?
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
        })
    }

    fn import_settings(&self, settings: Value) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !settings.is_object() {
                return Err(AppError::Validation("settings must be a JSON object".into()));
            }
            write_document(self.path.clone(), &settings).await
        })
    }
}
