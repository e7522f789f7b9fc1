//! Get command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use devlink_core::storage::{Destination, HttpObjectStore, ObjectStore};

use super::GetArgs;
use crate::ui::format_size;

/// Run the get command.
pub async fn run(args: GetArgs) -> Result<()> {
    let config = super::load_config();
    let device = super::resolve_device(args.device, &config)?;
    let folder = Destination::new(device, &args.folder);
    let name = args.name.trim().trim_matches('/');
    let key = folder.object_path(name);

    let store = HttpObjectStore::from_config(&config).context("Failed to set up storage client")?;

    if args.url {
        if let Some(url) = store.public_url(&key) {
            println!("{}", url);
        }
        return Ok(());
    }

    let data = store
        .get_object(&key)
        .await
        .map_err(|e| super::storage_failure(e, format!("Failed to download '{}'", name)))?;

    let output = output_path(args.output, name);
    tokio::fs::write(&output, &data)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Downloaded {}:{} to {} ({})",
        folder.device_id(),
        folder.child_path(name),
        output.display(),
        format_size(data.len() as u64)
    );
    Ok(())
}

/// Where a download lands: `output` as given, inside it when it is a
/// directory, or the file's own name in the current directory.
fn output_path(output: Option<PathBuf>, name: &str) -> PathBuf {
    let file_name = Path::new(name)
        .file_name()
        .map_or_else(|| PathBuf::from("download"), PathBuf::from);
    match output {
        Some(dir) if dir.is_dir() => dir.join(file_name),
        Some(path) => path,
        None => file_name,
    }
}
