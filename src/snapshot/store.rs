//! Snapshot store: the process-wide owner of snapshot state.
//!
//! A [`SnapshotStore`] is constructed once by the host, shared by `Arc`, and
//! driven through an explicit [`init`](SnapshotStore::init) /
//! [`teardown`](SnapshotStore::teardown) lifecycle. It persists every
//! mutation to the [`KeyValueStore`] before returning, owns the auto-save
//! scheduler, and guards restores with a single `restoring` flag.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::codec;
use super::preview::{self, DivergenceEntry};
use super::recovery::{self, RecoveryWindows, StartupRecovery};
use super::restore::{self, RestoreReport, RestoringGuard};
use super::retention;
use super::scheduler::{AutoSaveScheduler, AutoSaveTarget, ChangeTracker};
use super::serializer::ContentSerializer;
use crate::config::GlobalConfig;
use crate::models::recovery::{PendingRestore, RecoverySource};
use crate::models::snapshot::{
    auto_save_name, FileRecord, Snapshot, SnapshotMap, SnapshotMapRef, SnapshotPayload,
};
use crate::persistence::{get_json, keys, set_json, KeyValueStore};
use crate::providers::{BoxFuture, Providers};
use crate::{AppError, Result};

/// Shortest accepted snapshot name, in characters, after trimming.
pub const MIN_NAME_CHARS: usize = 3;
/// Longest accepted snapshot name, in characters, after trimming.
pub const MAX_NAME_CHARS: usize = 100;
/// Longest accepted description, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Validate and trim a snapshot name.
///
/// # Errors
///
/// Returns `AppError::Validation` if the trimmed name is empty or outside
/// 3–100 characters.
pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("snapshot name is required".into()));
    }
    let chars = trimmed.chars().count();
    if chars < MIN_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "snapshot name must be at least {MIN_NAME_CHARS} characters"
        )));
    }
    if chars > MAX_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "snapshot name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(trimmed.to_owned())
}

/// Validate and trim an optional description; blank becomes `None`.
///
/// # Errors
///
/// Returns `AppError::Validation` if it exceeds 500 characters.
pub fn validate_description(description: Option<&str>) -> Result<Option<String>> {
    let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(AppError::Validation(format!(
            "description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(Some(description.to_owned()))
}

/// Parameters for [`SnapshotStore::create`].
///
/// Any part left as `None` is captured from live state.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    /// Snapshot name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Files to store instead of the live tree.
    pub files: Option<BTreeMap<String, FileRecord>>,
    /// Chats to store instead of the live transcript.
    pub chats: Option<Vec<serde_json::Value>>,
    /// Settings to store instead of the live settings.
    pub settings: Option<serde_json::Value>,
}

impl CreateRequest {
    /// Request a snapshot of live state named `name`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Store these files instead of the live tree.
    #[must_use]
    pub fn with_files(mut self, files: BTreeMap<String, FileRecord>) -> Self {
        self.files = Some(files);
        self
    }

    /// Store these chats instead of the live transcript.
    #[must_use]
    pub fn with_chats(mut self, chats: Vec<serde_json::Value>) -> Self {
        self.chats = Some(chats);
        self
    }

    /// Store these settings instead of the live settings.
    #[must_use]
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// Aggregate numbers about stored snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// All snapshots.
    pub snapshot_count: usize,
    /// Auto-save snapshots.
    pub auto_save_count: usize,
    /// Manually named snapshots.
    pub manual_count: usize,
    /// Bytes of stored payloads.
    pub stored_bytes: u64,
    /// Newest snapshot timestamp.
    pub newest_timestamp: Option<i64>,
    /// Epoch milliseconds of the last auto-save.
    pub last_auto_save_at: Option<i64>,
}

/// Current auto-save configuration and scheduler state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSaveStatus {
    /// Persisted toggle.
    pub enabled: bool,
    /// Persisted interval.
    pub interval_minutes: u32,
    /// Epoch milliseconds of the last auto-save.
    pub last_auto_save_at: Option<i64>,
    /// Whether the timer task is running.
    pub running: bool,
    /// Changes counted toward the change-volume trigger.
    pub pending_changes: u32,
}

/// Persisted portion of the store state.
#[derive(Debug)]
struct StoreState {
    /// Insertion-ordered snapshots.
    snapshots: Vec<Snapshot>,
    auto_save_enabled: bool,
    auto_save_interval_minutes: u32,
    last_auto_save_at: Option<i64>,
}

/// Process-wide snapshot store.
pub struct SnapshotStore {
    config: Arc<GlobalConfig>,
    kv: Arc<dyn KeyValueStore>,
    providers: Providers,
    serializer: ContentSerializer,
    state: Mutex<StoreState>,
    restoring: AtomicBool,
    pending: Mutex<Option<PendingRestore>>,
    scheduler: Mutex<AutoSaveScheduler>,
    changes: ChangeTracker,
    /// Serializes snapshot creation so each create runs to completion.
    create_lock: tokio::sync::Mutex<()>,
}

impl SnapshotStore {
    /// Construct a store. Persisted state is not loaded until [`init`](Self::init).
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        kv: Arc<dyn KeyValueStore>,
        providers: Providers,
    ) -> Arc<Self> {
        let serializer =
            ContentSerializer::new(providers.clone(), config.limits.file_read_timeout());
        let changes = ChangeTracker::new(
            config.auto_save.change_threshold,
            Duration::from_secs(config.auto_save.change_cooldown_seconds),
        );
        let state = StoreState {
            snapshots: Vec::new(),
            auto_save_enabled: config.auto_save.enabled,
            auto_save_interval_minutes: config.auto_save.interval_minutes,
            last_auto_save_at: None,
        };

        Arc::new(Self {
            config,
            kv,
            providers,
            serializer,
            state: Mutex::new(state),
            restoring: AtomicBool::new(false),
            pending: Mutex::new(None),
            scheduler: Mutex::new(AutoSaveScheduler::new()),
            changes,
            create_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Load persisted state, run recovery detection and start auto-save.
    ///
    /// A corrupt persisted snapshot map is logged and treated as empty.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if persisted state cannot be read, or
    /// `AppError::Config` if auto-save is enabled but cannot be started.
    pub fn init(self: &Arc<Self>) -> Result<()> {
        self.init_with(StartupRecovery::Consume)
    }

    /// [`init`](Self::init) with an explicit recovery mode.
    ///
    /// Hosts that cannot resolve the offer in the same process pass
    /// [`StartupRecovery::Retain`] so an emergency backup survives until it
    /// is accepted or dismissed, or [`StartupRecovery::Skip`] to leave
    /// recovery state alone.
    ///
    /// # Errors
    ///
    /// Same as [`init`](Self::init).
    pub fn init_with(self: &Arc<Self>, mode: StartupRecovery) -> Result<()> {
        let span = info_span!("snapshot_store_init", recovery = ?mode);
        let _guard = span.enter();

        let snapshots = match get_json::<SnapshotMap>(self.kv.as_ref(), keys::SNAPSHOTS) {
            Ok(map) => map.map(|m| m.0).unwrap_or_default(),
            Err(AppError::Decode(msg)) => {
                error!(%msg, "persisted snapshots are corrupt; starting empty");
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        let enabled = self.read_setting(keys::AUTO_SAVE_ENABLED, self.config.auto_save.enabled);
        let interval = self
            .read_setting(keys::AUTO_SAVE_INTERVAL, self.config.auto_save.interval_minutes)
            .max(1);
        let last_auto_save_at = self.read_setting::<Option<i64>>(keys::LAST_AUTO_SAVE, None);

        let windows = RecoveryWindows::from(&self.config.recovery);
        let pending = match mode {
            StartupRecovery::Consume => recovery::detect_pending_restore(
                self.kv.as_ref(),
                &snapshots,
                last_auto_save_at,
                &windows,
                now_ms(),
            ),
            StartupRecovery::Retain => recovery::inspect_pending_restore(
                self.kv.as_ref(),
                &snapshots,
                last_auto_save_at,
                &windows,
                now_ms(),
            ),
            StartupRecovery::Skip => None,
        };

        info!(
            snapshots = snapshots.len(),
            auto_save_enabled = enabled,
            interval_minutes = interval,
            pending_restore = pending.is_some(),
            "snapshot store loaded"
        );

        {
            let mut state = self.lock_state()?;
            state.snapshots = snapshots;
            state.auto_save_enabled = enabled;
            state.auto_save_interval_minutes = interval;
            state.last_auto_save_at = last_auto_save_at;
        }
        *self.lock_pending()? = pending;

        if enabled {
            self.start_scheduler(interval)?;
        }
        Ok(())
    }

    /// Stop auto-save. An in-flight save is allowed to finish.
    pub fn teardown(&self) {
        if let Ok(mut scheduler) = self.scheduler.lock() {
            scheduler.stop();
        }
        info!("snapshot store torn down");
    }

    /// Loaded configuration.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Create a snapshot and return its id.
    ///
    /// # Errors
    ///
    /// - `AppError::Validation` for a bad name or description.
    /// - `AppError::Oversize` if the payload exceeds the size cap; nothing is
    ///   stored in that case.
    /// - `AppError::Storage` if the snapshot was created but could not be
    ///   persisted; it remains in memory.
    pub async fn create(&self, request: CreateRequest) -> Result<String> {
        let _serial = self.create_lock.lock().await;
        self.create_serialized(request, now_ms())
            .instrument(info_span!("create_snapshot"))
            .await
    }

    async fn create_serialized(&self, request: CreateRequest, timestamp: i64) -> Result<String> {
        let snapshot = self.build_snapshot(request, timestamp).await?;
        let id = snapshot.id.clone();

        let mut state = self.lock_state()?;
        state.snapshots.push(snapshot);
        self.persist_snapshots(&state)?;
        Ok(id)
    }

    /// Capture, validate and encode a snapshot without storing it.
    async fn build_snapshot(&self, request: CreateRequest, timestamp: i64) -> Result<Snapshot> {
        let name = validate_name(&request.name)?;
        let description = validate_description(request.description.as_deref())?;

        let files = match request.files {
            Some(files) => files,
            None => self.serializer.capture_files().await?,
        };
        let chats = match request.chats {
            Some(chats) => chats,
            None => self.serializer.capture_chats().await,
        };
        let settings = match request.settings {
            Some(settings) => settings,
            None => self.serializer.capture_settings().await,
        };
        let payload = SnapshotPayload::new(files, chats, settings);
        let metadata = payload.metadata;

        let encoded = codec::encode_for_storage(
            payload,
            self.config.limits.compression_threshold_bytes,
            self.config.limits.max_snapshot_bytes,
        )?;

        let snapshot = Snapshot::new(name, description, timestamp, encoded.compressed, encoded.data);

        info!(
            snapshot_id = %snapshot.id,
            name = %snapshot.name,
            files = metadata.files_count,
            total_size = metadata.total_size,
            chats = metadata.chat_count,
            compressed = snapshot.compressed,
            serialized_size = encoded.serialized_size,
            "snapshot created"
        );
        Ok(snapshot)
    }

    /// Take an auto-save now, then apply retention.
    ///
    /// Returns `None` without saving while a restore is running.
    ///
    /// # Errors
    ///
    /// Returns any error from snapshot creation or persistence.
    pub async fn auto_save_now(&self) -> Result<Option<String>> {
        if self.is_restoring() {
            debug!("restore in progress; auto-save skipped");
            return Ok(None);
        }
        let _serial = self.create_lock.lock().await;
        if self.is_restoring() {
            debug!("restore started while waiting; auto-save skipped");
            return Ok(None);
        }

        let now = Utc::now();
        let timestamp = now.timestamp_millis();
        let snapshot = self
            .build_snapshot(CreateRequest::named(auto_save_name(now)), timestamp)
            .instrument(info_span!("auto_save"))
            .await?;
        let id = snapshot.id.clone();

        // Insert, prune and record under one lock so retention holds even
        // when the write below fails.
        let persisted = {
            let mut state = self.lock_state()?;
            state.snapshots.push(snapshot);
            state.last_auto_save_at = Some(timestamp);
            let expired =
                retention::expired_auto_saves(&state.snapshots, self.config.limits.max_auto_saves);
            if !expired.is_empty() {
                state.snapshots.retain(|s| !expired.contains(&s.id));
                info!(pruned = expired.len(), "old auto-saves pruned");
            }
            self.persist_snapshots(&state)
        };
        let recorded = set_json(self.kv.as_ref(), keys::LAST_AUTO_SAVE, &timestamp)
            .inspect_err(|err| error!(%err, "failed to persist last auto-save time"));

        persisted?;
        recorded?;
        Ok(Some(id))
    }

    /// Look up a snapshot by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the state lock is poisoned.
    pub fn get(&self, id: &str) -> Result<Option<Snapshot>> {
        Ok(self
            .lock_state()?
            .snapshots
            .iter()
            .find(|snapshot| snapshot.id == id)
            .cloned())
    }

    /// All snapshots, newest first; equal timestamps keep insertion order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the state lock is poisoned.
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots = self.lock_state()?.snapshots.clone();
        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(snapshots)
    }

    /// Delete a snapshot. Deleting an unknown id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the deletion could not be persisted.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.lock_state()?;
        let Some(index) = state.snapshots.iter().position(|s| s.id == id) else {
            debug!(snapshot_id = id, "delete of unknown snapshot ignored");
            return Ok(());
        };
        state.snapshots.remove(index);
        info!(snapshot_id = id, "snapshot deleted");
        self.persist_snapshots(&state)
    }

    /// Decode a stored snapshot's payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id or `AppError::Decode`
    /// if the payload cannot be decoded.
    pub fn load_payload(&self, id: &str) -> Result<SnapshotPayload> {
        let snapshot = self.find_restorable(id)?;
        let (payload, path) = codec::decode_data(&snapshot.data, snapshot.compressed)?;
        debug!(snapshot_id = id, ?path, "payload decoded");
        Ok(payload)
    }

    /// Turn auto-save on or off, persisting the choice and starting or
    /// stopping the timer immediately.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the toggle could not be persisted (the
    /// scheduler change still applies), or `AppError::Config` if the timer
    /// cannot be started.
    pub fn set_auto_save_enabled(self: &Arc<Self>, enabled: bool) -> Result<()> {
        let (interval, persisted) = {
            let mut state = self.lock_state()?;
            state.auto_save_enabled = enabled;
            (
                state.auto_save_interval_minutes,
                set_json(self.kv.as_ref(), keys::AUTO_SAVE_ENABLED, &enabled),
            )
        };

        if enabled {
            self.start_scheduler(interval)?;
        } else {
            self.lock_scheduler()?.stop();
        }
        info!(enabled, "auto-save toggled");
        persisted.inspect_err(|err| error!(%err, "failed to persist auto-save toggle"))
    }

    /// Change the auto-save period, restarting the timer if it is enabled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for zero minutes, `AppError::Storage` if
    /// the interval could not be persisted, or `AppError::Config` if the
    /// timer cannot be restarted.
    pub fn set_auto_save_interval(self: &Arc<Self>, minutes: u32) -> Result<()> {
        if minutes == 0 {
            return Err(AppError::Validation(
                "auto-save interval must be at least one minute".into(),
            ));
        }
        let (enabled, persisted) = {
            let mut state = self.lock_state()?;
            state.auto_save_interval_minutes = minutes;
            (
                state.auto_save_enabled,
                set_json(self.kv.as_ref(), keys::AUTO_SAVE_INTERVAL, &minutes),
            )
        };

        if enabled {
            self.start_scheduler(minutes)?;
        }
        info!(minutes, "auto-save interval changed");
        persisted.inspect_err(|err| error!(%err, "failed to persist auto-save interval"))
    }

    /// Report a significant file save to the change-volume trigger.
    ///
    /// Returns the auto-save id when this change triggered one. Auto-save
    /// failures are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if internal locks are poisoned.
    pub async fn notify_file_saved(&self) -> Result<Option<String>> {
        self.notify_file_saved_at(now_ms()).await
    }

    /// [`notify_file_saved`](Self::notify_file_saved) with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if internal locks are poisoned.
    pub async fn notify_file_saved_at(&self, at_ms: i64) -> Result<Option<String>> {
        let armed = self.lock_scheduler()?.is_running() && !self.is_restoring();
        if !self.changes.record_at(at_ms, armed)? {
            return Ok(None);
        }
        match self.auto_save_now().await {
            Ok(id) => Ok(id),
            Err(err) => {
                error!(%err, "change-triggered auto-save failed");
                Ok(None)
            }
        }
    }

    /// Restore a snapshot (stored or pending) onto live state.
    ///
    /// # Errors
    ///
    /// - `AppError::ConcurrentRestore` if a restore is already running.
    /// - `AppError::NotFound` for an unknown id.
    /// - `AppError::Decode` if the payload cannot be decoded.
    /// - `AppError::EmptyRestore` / `AppError::PartialRestore` per
    ///   [`RestoreReport::into_result`].
    pub async fn restore(&self, id: &str) -> Result<RestoreReport> {
        let guard = RestoringGuard::acquire(&self.restoring)?;

        let result = self
            .restore_guarded(id)
            .instrument(info_span!("restore_snapshot", snapshot_id = id))
            .await;

        drop(guard);
        self.resolve_pending();

        match &result {
            Ok(report) => info!(snapshot_id = id, summary = %report.summary(), "restore completed"),
            Err(err) => warn!(snapshot_id = id, %err, "restore did not complete cleanly"),
        }
        result
    }

    async fn restore_guarded(&self, id: &str) -> Result<RestoreReport> {
        let payload = self.load_payload(id)?;
        let report = restore::apply_payload(&self.providers, &payload).await;
        report.into_result()
    }

    /// Compare a snapshot against the live file tree without changing anything.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Decode` for the snapshot, or
    /// any error enumerating the live tree.
    pub async fn preview_restore(&self, id: &str) -> Result<Vec<DivergenceEntry>> {
        let payload = self.load_payload(id)?;
        preview::diff_against_live(&payload, self.providers.files.as_ref()).await
    }

    /// Whether a restore is running.
    #[must_use]
    pub fn is_restoring(&self) -> bool {
        self.restoring.load(Ordering::SeqCst)
    }

    /// The restore candidate detected at startup, if any.
    #[must_use]
    pub fn pending_restore(&self) -> Option<PendingRestore> {
        self.pending.lock().ok().and_then(|pending| pending.clone())
    }

    /// Restore the pending candidate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if there is no candidate, or any
    /// [`restore`](Self::restore) error.
    pub async fn accept_pending(&self) -> Result<RestoreReport> {
        let candidate = self
            .pending_restore()
            .ok_or_else(|| AppError::NotFound("no pending restore".into()))?;
        self.restore(candidate.snapshot_id()).await
    }

    /// Drop the pending candidate without restoring it.
    pub fn dismiss_pending(&self) {
        if let Some(candidate) = self.resolve_pending() {
            info!(snapshot_id = candidate.snapshot_id(), "pending restore dismissed");
        }
    }

    /// Drop the candidate and any emergency backup still stored for it.
    fn resolve_pending(&self) -> Option<PendingRestore> {
        let candidate = self.pending.lock().ok().and_then(|mut pending| pending.take())?;
        if candidate.source == RecoverySource::EmergencyBackup {
            if let Err(err) = recovery::clear_emergency_backup(self.kv.as_ref()) {
                warn!(%err, "failed to clear emergency backup");
            }
        }
        Some(candidate)
    }

    /// Capture live state and write it as the emergency backup.
    ///
    /// Best-effort: failures are logged and swallowed.
    pub async fn capture_emergency_backup(&self) {
        match self.serializer.serialize().await {
            Ok(payload) => self.write_emergency_backup(&payload),
            Err(err) => debug!(%err, "emergency capture failed"),
        }
    }

    /// Write `payload` as the emergency backup, synchronously.
    ///
    /// Best-effort: failures are logged and swallowed.
    pub fn write_emergency_backup(&self, payload: &SnapshotPayload) {
        recovery::write_emergency_backup(self.kv.as_ref(), payload, now_ms());
    }

    /// Aggregate storage numbers.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the state lock is poisoned.
    pub fn storage_stats(&self) -> Result<StorageStats> {
        let state = self.lock_state()?;
        let auto_save_count = state.snapshots.iter().filter(|s| s.is_auto_save()).count();
        Ok(StorageStats {
            snapshot_count: state.snapshots.len(),
            auto_save_count,
            manual_count: state.snapshots.len() - auto_save_count,
            stored_bytes: state.snapshots.iter().map(Snapshot::stored_size).sum(),
            newest_timestamp: state.snapshots.iter().map(|s| s.timestamp).max(),
            last_auto_save_at: state.last_auto_save_at,
        })
    }

    /// Auto-save configuration and scheduler state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` or `AppError::Config` if a lock is poisoned.
    pub fn auto_save_status(&self) -> Result<AutoSaveStatus> {
        let running = self.lock_scheduler()?.is_running();
        let state = self.lock_state()?;
        Ok(AutoSaveStatus {
            enabled: state.auto_save_enabled,
            interval_minutes: state.auto_save_interval_minutes,
            last_auto_save_at: state.last_auto_save_at,
            running,
            pending_changes: self.changes.pending_changes(),
        })
    }

    /// Insert a fully-formed snapshot (from import), renaming it with
    /// `rename` under the state lock so name checks cannot race.
    pub(crate) fn insert_with<F>(&self, mut snapshot: Snapshot, rename: F) -> Result<String>
    where
        F: FnOnce(&str, &[Snapshot]) -> String,
    {
        let mut state = self.lock_state()?;
        snapshot.name = rename(&snapshot.name, &state.snapshots);
        let id = snapshot.id.clone();
        info!(snapshot_id = %id, name = %snapshot.name, "snapshot inserted");
        state.snapshots.push(snapshot);
        self.persist_snapshots(&state)?;
        Ok(id)
    }

    fn find_restorable(&self, id: &str) -> Result<Snapshot> {
        if let Some(snapshot) = self.get(id)? {
            return Ok(snapshot);
        }
        self.pending_restore()
            .map(|candidate| candidate.snapshot)
            .filter(|snapshot| snapshot.id == id)
            .ok_or_else(|| AppError::NotFound(format!("snapshot {id} not found")))
    }

    fn start_scheduler(self: &Arc<Self>, interval_minutes: u32) -> Result<()> {
        let interval = Duration::from_secs(u64::from(interval_minutes) * 60);
        self.lock_scheduler()?.start(Arc::downgrade(self), interval)
    }

    fn persist_snapshots(&self, state: &StoreState) -> Result<()> {
        set_json(self.kv.as_ref(), keys::SNAPSHOTS, &SnapshotMapRef(&state.snapshots)).inspect_err(
            |err| error!(%err, snapshots = state.snapshots.len(), "failed to persist snapshots"),
        )
    }

    fn read_setting<T: serde::de::DeserializeOwned>(&self, key: &str, default: T) -> T {
        match get_json::<T>(self.kv.as_ref(), key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err) => {
                warn!(key, %err, "persisted setting unreadable; using default");
                default
            }
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Storage("snapshot state mutex poisoned".into()))
    }

    fn lock_pending(&self) -> Result<MutexGuard<'_, Option<PendingRestore>>> {
        self.pending
            .lock()
            .map_err(|_| AppError::Storage("pending restore mutex poisoned".into()))
    }

    fn lock_scheduler(&self) -> Result<MutexGuard<'_, AutoSaveScheduler>> {
        self.scheduler
            .lock()
            .map_err(|_| AppError::Config("scheduler mutex poisoned".into()))
    }
}

impl AutoSaveTarget for SnapshotStore {
    fn auto_save(&self) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(self.auto_save_now())
    }
}
