//! Mkdir command implementation.

use anyhow::{Context, Result};

use devlink_core::storage::{create_folder, Destination, HttpObjectStore};

use super::MkdirArgs;

/// Run the mkdir command.
pub async fn run(args: MkdirArgs) -> Result<()> {
    let config = super::load_config();
    let device = super::resolve_device(args.device, &config)?;
    let parent = Destination::new(device, &args.folder);

    let store = HttpObjectStore::from_config(&config).context("Failed to set up storage client")?;

    let path = create_folder(&store, &parent, &args.name)
        .await
        .map_err(|e| {
            super::storage_failure(e, format!("Failed to create folder '{}'", args.name))
        })?;

    println!("Created {}:{}", parent.device_id(), path);
    Ok(())
}
