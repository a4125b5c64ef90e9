//! Global configuration parsing and validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::{AppError, Result};

/// Environment variable overriding the configured state directory.
pub const STATE_DIR_ENV: &str = "RESTOREPOINT_STATE_DIR";

/// Size caps and per-file bounds applied while capturing and importing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LimitsConfig {
    /// Hard cap on a serialized snapshot payload.
    #[serde(default = "default_max_snapshot_bytes")]
    pub max_snapshot_bytes: u64,
    /// Serialized payloads above this size are stored compressed.
    #[serde(default = "default_compression_threshold_bytes")]
    pub compression_threshold_bytes: u64,
    /// Largest exported snapshot file accepted by import.
    #[serde(default = "default_max_import_bytes")]
    pub max_import_bytes: u64,
    /// Upper bound on a single file read during capture.
    #[serde(default = "default_file_read_timeout_seconds")]
    pub file_read_timeout_seconds: u64,
    /// Number of auto-save snapshots kept by retention.
    #[serde(default = "default_max_auto_saves")]
    pub max_auto_saves: usize,
}

fn default_max_snapshot_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_compression_threshold_bytes() -> u64 {
    100 * 1024
}

fn default_max_import_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_file_read_timeout_seconds() -> u64 {
    30
}

fn default_max_auto_saves() -> usize {
    5
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_snapshot_bytes: default_max_snapshot_bytes(),
            compression_threshold_bytes: default_compression_threshold_bytes(),
            max_import_bytes: default_max_import_bytes(),
            file_read_timeout_seconds: default_file_read_timeout_seconds(),
            max_auto_saves: default_max_auto_saves(),
        }
    }
}

impl LimitsConfig {
    /// Per-file read timeout as a [`Duration`].
    #[must_use]
    pub fn file_read_timeout(&self) -> Duration {
        Duration::from_secs(self.file_read_timeout_seconds)
    }
}

/// Auto-save defaults. Persisted toggles override these once written.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AutoSaveConfig {
    /// Whether auto-save starts enabled on a fresh store.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Timer period in minutes.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    /// Significant file saves counted before a change-volume auto-save.
    #[serde(default = "default_change_threshold")]
    pub change_threshold: u32,
    /// Minimum gap between counted changes before the trigger may fire.
    #[serde(default = "default_change_cooldown_seconds")]
    pub change_cooldown_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_interval_minutes() -> u32 {
    5
}

fn default_change_threshold() -> u32 {
    5
}

fn default_change_cooldown_seconds() -> u64 {
    120
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_minutes: default_interval_minutes(),
            change_threshold: default_change_threshold(),
            change_cooldown_seconds: default_change_cooldown_seconds(),
        }
    }
}

/// Windows used by the crash/reload recovery detector.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RecoveryConfig {
    /// A last auto-save younger than this marks a possibly-unclean exit.
    #[serde(default = "default_recent_auto_save_seconds")]
    pub recent_auto_save_seconds: u64,
    /// Maximum age of an auto-save snapshot offered as a candidate.
    #[serde(default = "default_candidate_freshness_seconds")]
    pub candidate_freshness_seconds: u64,
    /// Emergency backups older than this are discarded.
    #[serde(default = "default_emergency_max_age_seconds")]
    pub emergency_max_age_seconds: u64,
}

fn default_recent_auto_save_seconds() -> u64 {
    300
}

fn default_candidate_freshness_seconds() -> u64 {
    30
}

fn default_emergency_max_age_seconds() -> u64 {
    3600
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            recent_auto_save_seconds: default_recent_auto_save_seconds(),
            candidate_freshness_seconds: default_candidate_freshness_seconds(),
            emergency_max_age_seconds: default_emergency_max_age_seconds(),
        }
    }
}

/// Locations of the directory-backed collaborators.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkspaceConfig {
    /// Chat transcript document, relative to the state directory.
    #[serde(default = "default_chats_file")]
    pub chats_file: PathBuf,
    /// Settings document, relative to the state directory.
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
    /// Directory names never descended into while walking the workspace.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

fn default_chats_file() -> PathBuf {
    PathBuf::from("chats.json")
}

fn default_settings_file() -> PathBuf {
    PathBuf::from("settings.json")
}

fn default_ignore() -> Vec<String> {
    vec![".git".into(), "target".into(), "node_modules".into()]
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            chats_file: default_chats_file(),
            settings_file: default_settings_file(),
            ignore: default_ignore(),
        }
    }
}

/// Global configuration parsed from `restorepoint.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Root of the project being snapshotted.
    pub workspace_root: PathBuf,
    /// Where persisted store state lives; defaults to `<workspace>/.restorepoint`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Size caps and timeouts.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Auto-save defaults.
    #[serde(default)]
    pub auto_save: AutoSaveConfig,
    /// Recovery detector windows.
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Directory-backed collaborator layout.
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Build an all-defaults configuration for `workspace_root`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the workspace root does not exist.
    pub fn for_workspace(workspace_root: impl Into<PathBuf>) -> Result<Self> {
        let mut config = Self {
            workspace_root: workspace_root.into(),
            state_dir: None,
            limits: LimitsConfig::default(),
            auto_save: AutoSaveConfig::default(),
            recovery: RecoveryConfig::default(),
            workspace: WorkspaceConfig::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Directory holding the persisted key-value documents.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.workspace_root.join(".restorepoint"))
    }

    /// Absolute path of the chat transcript document.
    #[must_use]
    pub fn chats_path(&self) -> PathBuf {
        self.state_dir().join(&self.workspace.chats_file)
    }

    /// Absolute path of the settings document.
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.state_dir().join(&self.workspace.settings_file)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var(STATE_DIR_ENV) {
            if !dir.trim().is_empty() {
                debug!(state_dir = %dir, "state directory overridden from environment");
                self.state_dir = Some(PathBuf::from(dir));
            }
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.auto_save.interval_minutes == 0 {
            return Err(AppError::Config(
                "auto_save.interval_minutes must be greater than zero".into(),
            ));
        }

        if self.auto_save.change_threshold == 0 {
            return Err(AppError::Config(
                "auto_save.change_threshold must be greater than zero".into(),
            ));
        }

        if self.limits.max_auto_saves == 0 {
            return Err(AppError::Config(
                "limits.max_auto_saves must be greater than zero".into(),
            ));
        }

        if self.limits.compression_threshold_bytes >= self.limits.max_snapshot_bytes {
            return Err(AppError::Config(
                "limits.compression_threshold_bytes must be below limits.max_snapshot_bytes"
                    .into(),
            ));
        }

        let canonical_root = self
            .workspace_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("workspace_root invalid: {err}")))?;
        self.workspace_root = canonical_root;

        Ok(())
    }
}
