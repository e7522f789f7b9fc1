//! Usage command implementation.

use anyhow::{Context, Result};

use devlink_core::storage::{storage_usage, HttpObjectStore};

use super::UsageArgs;
use crate::ui::format_size;

/// Run the usage command.
pub async fn run(args: UsageArgs) -> Result<()> {
    let config = super::load_config();
    let device = super::resolve_device(args.device, &config)?;

    let store = HttpObjectStore::from_config(&config).context("Failed to set up storage client")?;
    let bytes = storage_usage(&store, &device)
        .await
        .with_context(|| format!("Failed to compute storage usage for {}", device))?;

    if args.json {
        let output = serde_json::json!({
            "device": device,
            "bytes": bytes,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}: {} used", device, format_size(bytes));
    }
    Ok(())
}
