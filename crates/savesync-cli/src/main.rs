use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use savesync_core::{
    Operation, SyncConfig, SyncError, SyncOrchestrator, SyncReport, TransferProgress,
};
use savesync_manifest::{JsonFileStore, ManifestSnapshot, ManifestStats, ManifestStore};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("savesync")
        .version(savesync_core::VERSION)
        .about("Back up and restore Vintage Story world folders")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML config file"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print machine-readable output"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(Command::new("status").about("Show what the manifest tracks"))
        .subcommand(Command::new("worlds").about("List tracked worlds"))
        .subcommand(
            Command::new("upload")
                .about("Back up a world to the bucket")
                .arg(Arg::new("world").required(true).help("World folder name")),
        )
        .subcommand(
            Command::new("download")
                .about("Restore a world from the bucket")
                .arg(Arg::new("world").required(true).help("World folder name")),
        )
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    match run(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("savesync=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> Result<SyncConfig> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    Ok(config.apply_env())
}

async fn run(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let json = matches.get_flag("json");

    match matches.subcommand() {
        Some(("status", _)) => status(&config, json).await,
        Some(("worlds", _)) => worlds(&config, json).await,
        Some(("upload", args)) => {
            transfer(&config, world_arg(args)?, Operation::Upload, json).await
        }
        Some(("download", args)) => {
            transfer(&config, world_arg(args)?, Operation::Download, json).await
        }
        _ => Ok(()),
    }
}

fn world_arg(args: &ArgMatches) -> Result<&str> {
    args.get_one::<String>("world")
        .map(String::as_str)
        .context("missing world name")
}

/// Persisted manifest and whether the file exists at all
async fn load_manifest(config: &SyncConfig) -> Result<(ManifestSnapshot, bool)> {
    let path = config.resolved_manifest_path()?;
    let store = JsonFileStore::new(&path);
    let found = store
        .exists()
        .await
        .with_context(|| format!("checking manifest {}", path.display()))?;
    let snapshot = store
        .load()
        .await
        .with_context(|| format!("reading manifest {}", path.display()))?;
    Ok((snapshot, found))
}

#[derive(Debug, Serialize)]
struct StatusView {
    message: String,
    bucket: String,
    #[serde(flatten)]
    stats: ManifestStats,
}

async fn status(config: &SyncConfig, json: bool) -> Result<()> {
    let (snapshot, found) = load_manifest(config).await?;
    let stats = snapshot.stats();
    let view = StatusView {
        message: stats.status_message(found),
        bucket: snapshot.current_used_bucket.clone(),
        stats,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}", view.message);
        if found {
            println!("  Bucket:      {}", view.bucket);
            println!("  Worlds:      {}", stats.world_count);
            println!("  Files:       {}", stats.total_tracked_files);
            println!("  Size:        {} bytes (~{} GiB)", stats.total_bytes, stats.total_gib());
            println!("  Last synced: {}", stats.last_opened);
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct WorldView<'a> {
    name: &'a str,
    files: usize,
    bytes: u64,
}

fn world_views(snapshot: &ManifestSnapshot) -> Vec<WorldView<'_>> {
    snapshot
        .worlds()
        .map(|entry| WorldView {
            name: entry.name().as_str(),
            files: entry.len(),
            bytes: entry.total_bytes(),
        })
        .collect()
}

async fn worlds(config: &SyncConfig, json: bool) -> Result<()> {
    let (snapshot, _) = load_manifest(config).await?;
    let views = world_views(&snapshot);

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else if views.is_empty() {
        println!("No worlds tracked yet.");
    } else {
        for view in &views {
            println!("{:<32} {:>6} files {:>14} bytes", view.name, view.files, view.bytes);
        }
    }
    Ok(())
}

async fn transfer(
    config: &SyncConfig,
    world: &str,
    operation: Operation,
    json: bool,
) -> Result<()> {
    let local = config.local_collaborators()?;
    let orchestrator = SyncOrchestrator::builder(
        Arc::new(local.store),
        Arc::new(local.scanner),
        Arc::new(local.backend),
    )
    .with_progress_capacity(config.progress_capacity)
    .build()
    .await?;

    let printer = (!json).then(|| spawn_progress_printer(orchestrator.subscribe_progress()));

    let result = match operation {
        Operation::Upload => orchestrator.run_upload(world).await,
        Operation::Download => orchestrator.run_download(world).await,
    };
    // The pending snapshot lives only in this process, so save it before exiting.
    let outcome = match result {
        Ok(report) => Ok(Some(report)),
        Err(err) if err.requires_save_retry() => {
            save_pending(&orchestrator, err, SAVE_ATTEMPTS, SAVE_BACKOFF)
                .await
                .map(|_| None)
        }
        Err(err) => Err(err),
    };
    let status = orchestrator.status_message();
    drop(orchestrator);
    if let Some(printer) = printer {
        // Ends once the last progress sender is gone.
        let _ = printer.await;
    }

    match outcome {
        Ok(Some(report)) => print_report(&report, &status, json),
        Ok(None) => print_recovered(world, operation, &status, json),
        Err(err) => Err(explain(err)),
    }
}

const SAVE_ATTEMPTS: u32 = 3;
const SAVE_BACKOFF: Duration = Duration::from_millis(250);

/// Retry a failed manifest save, returning the attempt that succeeded
///
/// Files are never transferred again here. Gives back the last save error
/// when every attempt fails.
async fn save_pending(
    orchestrator: &SyncOrchestrator,
    mut err: SyncError,
    attempts: u32,
    backoff: Duration,
) -> Result<u32, SyncError> {
    for attempt in 1..=attempts {
        tokio::time::sleep(backoff * attempt).await;
        match orchestrator.retry_save().await {
            Ok(_) => {
                info!(attempt, "manifest saved on retry");
                return Ok(attempt);
            }
            Err(next) => {
                warn!(attempt, error = %next, "manifest save retry failed");
                err = next;
            }
        }
    }
    Err(err)
}

fn explain(err: SyncError) -> anyhow::Error {
    let hint = match &err {
        SyncError::Busy { .. } => Some("wait for the running operation to finish"),
        SyncError::PersistenceFailure { world: Some(_), .. } => Some(
            "files were transferred but the manifest could not be saved, even after retrying; \
             the next run will transfer them again",
        ),
        SyncError::TransferFailure { .. } => Some("the operation can be retried"),
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::Error::new(err).context(hint),
        None => anyhow::Error::new(err),
    }
}

#[derive(Debug, Serialize)]
struct RecoveredView<'a> {
    world: &'a str,
    operation: Operation,
    manifest_saved_on_retry: bool,
}

fn print_recovered(
    world: &str,
    operation: Operation,
    status: &str,
    json: bool,
) -> Result<()> {
    if json {
        let view = RecoveredView {
            world,
            operation,
            manifest_saved_on_retry: true,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{world} {operation} complete; the manifest was saved on retry");
        println!("{status}");
    }
    Ok(())
}

fn print_report(report: &SyncReport, status: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if report.was_noop() {
        println!("{}: no changes since the last upload", report.world);
    } else {
        println!(
            "{} {} complete: {} files, {} bytes in {} ms",
            report.world,
            report.operation,
            report.files_transferred,
            report.bytes_transferred,
            report.elapsed_ms
        );
    }
    if let Some(changes) = &report.changes {
        println!(
            "  added {}, modified {}, removed {}, unchanged {}",
            changes.added.len(),
            changes.modified.len(),
            changes.removed.len(),
            changes.unchanged.len()
        );
    }
    println!("{status}");
    Ok(())
}

fn spawn_progress_printer(
    mut events: broadcast::Receiver<TransferProgress>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => eprintln!("{}", progress_line(&event)),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn progress_line(event: &TransferProgress) -> String {
    let percent = (event.fraction() * 100.0).round() as u64;
    let mut line = format!(
        "[{}] {} {:>3}% ({}/{} bytes)",
        event.world, event.operation, percent, event.transferred_bytes, event.total_bytes
    );
    if !event.current_file.is_empty() {
        line.push(' ');
        line.push_str(&event.current_file);
    }
    line
}
