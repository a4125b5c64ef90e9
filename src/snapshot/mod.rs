//! Snapshot engine: capture, encoding, storage, scheduling, recovery and
//! restore.

pub mod codec;
pub mod export;
pub mod preview;
pub mod recovery;
pub mod restore;
pub mod retention;
pub mod scheduler;
pub mod serializer;
pub mod store;

pub use export::{export_snapshot, import_snapshot, ExportFormat, ExportedFile};
pub use preview::{DivergenceEntry, DivergenceKind};
pub use recovery::StartupRecovery;
pub use restore::{CategoryOutcome, RestoreReport};
pub use scheduler::{AutoSaveScheduler, AutoSaveTarget, ChangeTracker};
pub use serializer::ContentSerializer;
pub use store::{AutoSaveStatus, CreateRequest, SnapshotStore, StorageStats};
