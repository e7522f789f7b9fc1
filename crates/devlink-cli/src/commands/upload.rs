//! Upload command implementation.
//!
//! Files are pushed one at a time into a device folder. Progress is drawn
//! from the session's snapshot channel; once the queue drains the folder
//! listing is fetched again and shown.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::{watch, Notify};
use walkdir::WalkDir;

use devlink_core::config::Config;
use devlink_core::storage::listing::file_kind;
use devlink_core::storage::{
    list_directory, Destination, HttpObjectStore, MemoryObjectStore, ObjectStore,
};
use devlink_core::upload::{
    FilePayload, SessionSnapshot, UnitId, UploadSession, UploadSettings, UploadStatus,
};

use super::UploadArgs;
use crate::ui::{format_eta, format_size, format_speed, kind_icon, progress_bar};

/// Simulated link speed for `--dry-run`.
const DRY_RUN_BYTES_PER_SEC: u64 = 4 * 1024 * 1024;

/// Run the upload command.
pub async fn run(args: UploadArgs) -> Result<()> {
    let config = super::load_config();
    let device = super::resolve_device(args.device.clone(), &config)?;
    let destination = Destination::new(device, &args.folder);

    let files = read_files(&collect_files(&args.paths)?).await?;
    if files.is_empty() {
        anyhow::bail!("No files to upload");
    }

    if args.dry_run {
        let store = MemoryObjectStore::new()
            .with_throughput(DRY_RUN_BYTES_PER_SEC, config.upload.chunk_size);
        run_with_store(Arc::new(store), files, destination, &config, &args).await
    } else {
        let store =
            HttpObjectStore::from_config(&config).context("Failed to set up storage client")?;
        run_with_store(Arc::new(store), files, destination, &config, &args).await
    }
}

/// A local file and the name it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LocalFile {
    path: PathBuf,
    name: String,
}

/// Expand directories recursively, keeping the directory name as the first
/// path segment of every file inside it.
fn collect_files(paths: &[PathBuf]) -> Result<Vec<LocalFile>> {
    let mut files = Vec::new();

    for path in paths {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Cannot access {}", path.display()))?;

        if metadata.is_file() {
            files.push(LocalFile {
                path: path.clone(),
                name: file_name(path),
            });
            continue;
        }

        let base = path
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));

        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to read {}", path.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
            let mut segments: Vec<String> = base.iter().cloned().collect();
            segments.extend(
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned()),
            );
            files.push(LocalFile {
                path: entry.path().to_path_buf(),
                name: segments.join("/"),
            });
        }
    }

    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.to_string_lossy().into_owned(),
        |n| n.to_string_lossy().into_owned(),
    )
}

async fn read_files(files: &[LocalFile]) -> Result<Vec<FilePayload>> {
    let mut payloads = Vec::with_capacity(files.len());
    for file in files {
        let data = tokio::fs::read(&file.path)
            .await
            .with_context(|| format!("Failed to read {}", file.path.display()))?;
        payloads.push(FilePayload::new(file.name.clone(), data));
    }
    Ok(payloads)
}

async fn run_with_store<S: ObjectStore>(
    store: Arc<S>,
    files: Vec<FilePayload>,
    destination: Destination,
    config: &Config,
    args: &UploadArgs,
) -> Result<()> {
    let interactive = !args.quiet && !args.json;

    if interactive {
        println!();
        println!("Devlink v{}", devlink_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        display_upload_info(&files, &destination, args.dry_run);
    }

    let refreshed = Arc::new(Notify::new());
    let on_refresh = {
        let refreshed = Arc::clone(&refreshed);
        move || refreshed.notify_one()
    };
    let session = UploadSession::start(
        Arc::clone(&store),
        UploadSettings::from(&config.upload),
        on_refresh,
    );

    let start_time = Instant::now();
    let ids = session.submit(files, destination.clone()).await;
    tracing::debug!("Queued {} uploads for {}", ids.len(), destination);

    let snapshot = loop {
        let progress_handle = if interactive {
            Some(tokio::spawn(display_progress(session.subscribe())))
        } else {
            None
        };

        let finished = tokio::select! {
            snapshot = session.wait_idle() => Some(snapshot),
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(finished) = finished else {
            session.shutdown();
            if let Some(handle) = progress_handle {
                let _ = handle.await;
            }
            if interactive {
                println!();
                println!("  Upload cancelled.");
                println!();
            }
            return Ok(());
        };

        if let Some(handle) = progress_handle {
            let _ = handle.await;
        }

        let failed = failed_units(&finished);
        if failed.is_empty() || !interactive {
            break finished;
        }
        if !super::confirm(&format!("Retry {} failed upload(s)?", failed.len()))? {
            break finished;
        }
        for id in failed {
            session.retry(id).await;
        }
    };

    let elapsed = start_time.elapsed();
    let failed = snapshot.stats.failed_files;

    if args.json {
        print_json(&snapshot, &destination, args.dry_run)?;
    } else if !args.quiet {
        display_summary(&snapshot, elapsed);
        refreshed.notified().await;
        display_listing(&*store, &destination, config.storage.list_limit).await;
    }

    session.shutdown();

    if failed > 0 {
        anyhow::bail!("{} of {} uploads failed", failed, snapshot.stats.total_files);
    }
    Ok(())
}

fn failed_units(snapshot: &SessionSnapshot) -> Vec<UnitId> {
    snapshot
        .units
        .iter()
        .filter(|u| u.status == UploadStatus::Failed)
        .map(|u| u.id)
        .collect()
}

/// Display what is about to be uploaded.
fn display_upload_info(files: &[FilePayload], destination: &Destination, dry_run: bool) {
    let total_size: u64 = files.iter().map(FilePayload::size).sum();

    println!(
        "  Uploading {} items ({}) to {}{}",
        files.len(),
        format_size(total_size),
        destination,
        if dry_run { " (dry run)" } else { "" }
    );
    println!();
    for file in files {
        let kind = file_kind("", &file.name);
        println!("  {} {}", kind_icon(&kind, false), file.name);
    }
    println!();
}

/// Draw the batch line until the session goes idle or stops.
async fn display_progress(mut rx: watch::Receiver<SessionSnapshot>) {
    let mut reported: HashMap<UnitId, UploadStatus> = rx
        .borrow()
        .units
        .iter()
        .map(|u| (u.id, u.status))
        .collect();

    loop {
        let timeout = tokio::time::timeout(Duration::from_secs(1), rx.changed()).await;
        let snapshot = rx.borrow_and_update().clone();

        for unit in &snapshot.units {
            let previous = reported.insert(unit.id, unit.status);
            if previous == Some(unit.status) {
                continue;
            }
            match unit.status {
                UploadStatus::Completed => {
                    println!("\r  [done]   {} ({}){}", unit.name, format_size(unit.size), CLEAR);
                }
                UploadStatus::Failed => {
                    println!(
                        "\r  [failed] {}: {}{}",
                        unit.name,
                        unit.error.as_deref().unwrap_or("unknown error"),
                        CLEAR
                    );
                }
                UploadStatus::Paused if previous.is_some() => {
                    println!("\r  [paused] {}{}", unit.name, CLEAR);
                }
                _ => {}
            }
        }

        if snapshot.is_idle() {
            break;
        }

        let stats = &snapshot.stats;
        let current = snapshot
            .units
            .iter()
            .find(|u| u.status == UploadStatus::Uploading)
            .map_or("", |u| u.name.as_str());

        print!(
            "\r  {} [{:>6.2}%] {}/{} - {} - ETA: {} - {}{}",
            progress_bar(stats.overall_progress),
            stats.overall_progress,
            stats.completed_files,
            stats.total_files,
            format_speed(stats.overall_speed),
            format_eta(stats.overall_time_remaining),
            current,
            CLEAR
        );
        let _ = io::stdout().flush();

        match timeout {
            Err(_) | Ok(Ok(())) => {}
            Ok(Err(_)) => break,
        }
    }

    println!();
}

/// Trailing padding that wipes the rest of a redrawn line.
const CLEAR: &str = "    ";

fn display_summary(snapshot: &SessionSnapshot, elapsed: Duration) {
    let stats = &snapshot.stats;

    println!();
    println!(
        "  Uploaded {} of {} files ({}) in {:.1}s",
        stats.completed_files,
        stats.total_files,
        format_size(stats.uploaded_size),
        elapsed.as_secs_f64()
    );

    if stats.failed_files > 0 {
        println!();
        println!("  Failed:");
        for unit in snapshot
            .units
            .iter()
            .filter(|u| u.status == UploadStatus::Failed)
        {
            println!(
                "    {} (attempts: {}): {}",
                unit.name,
                unit.attempts,
                unit.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!();
}

async fn display_listing<S: ObjectStore>(store: &S, destination: &Destination, limit: usize) {
    match list_directory(store, destination, limit).await {
        Ok(entries) => {
            println!("  Contents of {}:", destination);
            if entries.is_empty() {
                println!("    (empty)");
            }
            for entry in entries {
                let size = if entry.is_directory {
                    "-".to_string()
                } else {
                    format_size(entry.size)
                };
                println!(
                    "    {:6} {:>10}  {}",
                    kind_icon(&entry.kind, entry.is_directory),
                    size,
                    entry.name
                );
            }
            println!();
        }
        Err(e) => {
            tracing::warn!("Failed to refresh listing for {}: {}", destination, e);
        }
    }
}

fn print_json(snapshot: &SessionSnapshot, destination: &Destination, dry_run: bool) -> Result<()> {
    let output = serde_json::json!({
        "destination": destination.to_string(),
        "dry_run": dry_run,
        "stats": snapshot.stats,
        "units": snapshot.units,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
