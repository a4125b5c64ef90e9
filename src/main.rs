#![forbid(unsafe_code)]

//! `restorepoint`: snapshot, auto-save and crash recovery for a project
//! directory.
//!
//! Every invocation opens the store in the workspace state directory,
//! performs one command and tears the store down. Only `recover` and `watch`
//! run recovery detection, and an emergency backup stays stored until
//! `recover accept` or `recover dismiss` resolves it. `watch` keeps the
//! store alive, runs auto-save, and writes an emergency backup on shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use restorepoint::config::GlobalConfig;
use restorepoint::persistence::FileKeyValueStore;
use restorepoint::providers::Providers;
use restorepoint::snapshot::{
    export_snapshot, import_snapshot, CreateRequest, DivergenceKind, ExportFormat, RestoreReport,
    SnapshotStore, StartupRecovery,
};
use restorepoint::workspace::{DirectoryFileTree, JsonFileChats, JsonFileSettings};
use restorepoint::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "restorepoint", about = "Project snapshots and crash recovery", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Workspace root; overrides the configured one. Defaults to the current directory.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture the workspace as a new snapshot.
    Create {
        /// Snapshot name (3-100 characters).
        name: String,
        /// Optional description.
        #[arg(long)]
        description: Option<String>,
    },

    /// List snapshots, newest first.
    List,

    /// Show one snapshot.
    Show {
        /// Snapshot ID.
        id: String,
    },

    /// Delete a snapshot.
    Delete {
        /// Snapshot ID.
        id: String,
    },

    /// Show how the workspace differs from a snapshot.
    Preview {
        /// Snapshot ID.
        id: String,
    },

    /// Restore a snapshot onto the workspace.
    Restore {
        /// Snapshot ID.
        id: String,
    },

    /// Export a snapshot to a file.
    Export {
        /// Snapshot ID.
        id: String,
        /// Write plain JSON instead of the compressed format.
        #[arg(long)]
        raw: bool,
        /// Output directory.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Import an exported snapshot file.
    Import {
        /// Path to a `.snapshot` or `.json` export.
        file: PathBuf,
    },

    /// Configure auto-save.
    AutoSave {
        #[command(subcommand)]
        action: AutoSaveAction,
    },

    /// Show storage statistics.
    Stats,

    /// Show, accept or dismiss the pending restore offer.
    Recover {
        /// What to do with the offer.
        #[arg(value_enum, default_value_t = RecoverAction::Show)]
        action: RecoverAction,
    },

    /// Run auto-save until interrupted; each stdin line counts as a file save.
    Watch,
}

#[derive(Debug, Subcommand)]
enum AutoSaveAction {
    /// Enable auto-save.
    On,
    /// Disable auto-save.
    Off,
    /// Set the auto-save interval.
    Interval {
        /// Minutes between auto-saves.
        minutes: u32,
    },
    /// Show auto-save state.
    Status,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum RecoverAction {
    Show,
    Accept,
    Dismiss,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = Arc::new(load_config(args.config.as_deref(), args.workspace.as_deref())?);
    info!(workspace = %config.workspace_root.display(), "configuration loaded");

    let store = open_store(Arc::clone(&config))?;
    store.init_with(startup_recovery(&args.command))?;

    let result = execute(&store, args.command).await;
    store.teardown();
    result
}

fn startup_recovery(command: &Command) -> StartupRecovery {
    match command {
        Command::Recover { .. } | Command::Watch => StartupRecovery::Retain,
        _ => StartupRecovery::Skip,
    }
}

fn load_config(path: Option<&Path>, workspace: Option<&Path>) -> Result<GlobalConfig> {
    let mut config = match path {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => {
            let root = match workspace {
                Some(root) => root.to_path_buf(),
                None => std::env::current_dir()?,
            };
            return GlobalConfig::for_workspace(root);
        }
    };

    if let Some(ws) = workspace {
        config.workspace_root = ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
    }
    Ok(config)
}

fn open_store(config: Arc<GlobalConfig>) -> Result<Arc<SnapshotStore>> {
    let state_dir = config.state_dir();
    let kv = Arc::new(FileKeyValueStore::open(&state_dir)?);
    let files = DirectoryFileTree::new(&config.workspace_root, config.workspace.ignore.clone())?
        .excluding(&state_dir);
    let providers = Providers::new(
        Arc::new(files),
        Some(Arc::new(JsonFileChats::new(config.chats_path()))),
        Arc::new(JsonFileSettings::new(config.settings_path())),
    );
    Ok(SnapshotStore::new(config, kv, providers))
}

async fn execute(store: &Arc<SnapshotStore>, command: Command) -> Result<()> {
    match command {
        Command::Create { name, description } => {
            let mut request = CreateRequest::named(name);
            request.description = description;
            let id = store.create(request).await?;
            println!("{id}");
        }
        Command::List => {
            for snapshot in store.list()? {
                println!(
                    "{}  {}  {}{}",
                    snapshot.id,
                    format_time(snapshot.timestamp),
                    snapshot.name,
                    if snapshot.compressed { "  [compressed]" } else { "" }
                );
            }
        }
        Command::Show { id } => {
            let snapshot = store
                .get(&id)?
                .ok_or_else(|| AppError::NotFound(format!("snapshot {id} not found")))?;
            let payload = store.load_payload(&id)?;
            println!("id:          {}", snapshot.id);
            println!("name:        {}", snapshot.name);
            if let Some(description) = &snapshot.description {
                println!("description: {description}");
            }
            println!("created:     {}", format_time(snapshot.timestamp));
            println!("version:     {}", snapshot.version);
            println!("compressed:  {}", snapshot.compressed);
            println!("files:       {}", payload.metadata.files_count);
            println!("total size:  {} bytes", payload.metadata.total_size);
            println!("chats:       {}", payload.metadata.chat_count);
        }
        Command::Delete { id } => {
            store.delete(&id)?;
            println!("deleted {id}");
        }
        Command::Preview { id } => {
            let entries = store.preview_restore(&id).await?;
            if entries.is_empty() {
                println!("workspace matches snapshot");
            }
            for entry in entries {
                let marker = match entry.kind {
                    DivergenceKind::Modified => "M",
                    DivergenceKind::Deleted => "D",
                    DivergenceKind::Added => "A",
                };
                println!("{marker} {}", entry.file_path);
            }
        }
        Command::Restore { id } => print_report(&store.restore(&id).await?),
        Command::Export { id, raw, out } => {
            let format = if raw {
                ExportFormat::Raw
            } else {
                ExportFormat::Compressed
            };
            let exported = export_snapshot(store, &id, format)?;
            let path = out.join(&exported.file_name);
            std::fs::write(&path, exported.contents.as_bytes())?;
            println!("{}", path.display());
        }
        Command::Import { file } => {
            let bytes = std::fs::read(&file)?;
            let file_name = file
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| AppError::Import(format!("bad file name: {}", file.display())))?;
            let id = import_snapshot(store, file_name, &bytes)?;
            println!("{id}");
        }
        Command::AutoSave { action } => match action {
            AutoSaveAction::On => store.set_auto_save_enabled(true)?,
            AutoSaveAction::Off => store.set_auto_save_enabled(false)?,
            AutoSaveAction::Interval { minutes } => store.set_auto_save_interval(minutes)?,
            AutoSaveAction::Status => {
                let status = store.auto_save_status()?;
                println!("enabled:   {}", status.enabled);
                println!("interval:  {} min", status.interval_minutes);
                println!(
                    "last save: {}",
                    status.last_auto_save_at.map_or_else(|| "never".to_owned(), format_time)
                );
            }
        },
        Command::Stats => {
            let stats = store.storage_stats()?;
            println!("snapshots:  {}", stats.snapshot_count);
            println!("auto-saves: {}", stats.auto_save_count);
            println!("manual:     {}", stats.manual_count);
            println!("stored:     {} bytes", stats.stored_bytes);
            println!(
                "last auto-save: {}",
                stats.last_auto_save_at.map_or_else(|| "never".to_owned(), format_time)
            );
        }
        Command::Recover { action } => recover(store, action).await?,
        Command::Watch => watch(store).await?,
    }
    Ok(())
}

async fn recover(store: &SnapshotStore, action: RecoverAction) -> Result<()> {
    let Some(candidate) = store.pending_restore() else {
        println!("no pending restore");
        return Ok(());
    };
    match action {
        RecoverAction::Show => println!(
            "{}  {}  {}  ({:?})",
            candidate.snapshot.id,
            format_time(candidate.snapshot.timestamp),
            candidate.snapshot.name,
            candidate.source
        ),
        RecoverAction::Accept => print_report(&store.accept_pending().await?),
        RecoverAction::Dismiss => {
            store.dismiss_pending();
            println!("dismissed");
        }
    }
    Ok(())
}

async fn watch(store: &Arc<SnapshotStore>) -> Result<()> {
    if let Some(candidate) = store.pending_restore() {
        warn!(
            snapshot_id = candidate.snapshot_id(),
            source = ?candidate.source,
            "a restore is pending; run `restorepoint recover` to review it"
        );
    }
    info!("watching; each line on stdin counts as a file save");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => {
                    if let Some(id) = store.notify_file_saved().await? {
                        info!(snapshot_id = %id, "change-triggered auto-save taken");
                    }
                }
                Ok(None) => stdin_open = false,
                Err(err) => {
                    error!(%err, "stdin read failed; change tracking stopped");
                    stdin_open = false;
                }
            },
        }
    }

    info!("shutdown signal received");
    store.capture_emergency_backup().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn print_report(report: &RestoreReport) {
    println!("restored: {}", report.summary());
}

fn format_time(epoch_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms).map_or_else(
        || epoch_ms.to_string(),
        |at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
