//! Rm command implementation.

use anyhow::{Context, Result};

use devlink_core::storage::{delete_entry, Destination, HttpObjectStore};

use super::RmArgs;

/// Run the rm command.
pub async fn run(args: RmArgs) -> Result<()> {
    let config = super::load_config();
    let device = super::resolve_device(args.device, &config)?;
    let parent = Destination::new(device, &args.folder);
    let target = parent.child_path(args.name.trim());

    if !args.yes && !super::confirm(&format!("Delete {}:{}?", parent.device_id(), target))? {
        println!("  Nothing deleted.");
        return Ok(());
    }

    let store = HttpObjectStore::from_config(&config).context("Failed to set up storage client")?;
    let removed = delete_entry(&store, &parent, &args.name)
        .await
        .map_err(|e| super::storage_failure(e, format!("Failed to delete '{}'", args.name)))?;

    tracing::debug!("Removed objects: {:?}", removed);
    println!(
        "Deleted {}:{} ({} object(s))",
        parent.device_id(),
        target,
        removed.len()
    );
    Ok(())
}
