//! Ls command implementation.

use anyhow::{Context, Result};

use devlink_core::storage::{
    filter_by_name, list_directory, Destination, HttpObjectStore, ObjectEntry,
};

use super::LsArgs;
use crate::ui::{format_size, kind_icon};

/// Run the ls command.
pub async fn run(args: LsArgs) -> Result<()> {
    let config = super::load_config();
    let device = super::resolve_device(args.device, &config)?;
    let destination = Destination::new(device, &args.folder);

    let store = HttpObjectStore::from_config(&config).context("Failed to set up storage client")?;
    let entries = list_directory(&store, &destination, config.storage.list_limit)
        .await
        .with_context(|| format!("Failed to list {}", destination))?;
    let entries = match args.filter.as_deref() {
        Some(query) => filter_by_name(entries, query),
        None => entries,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        display_entries(&destination, &entries);
    }
    Ok(())
}

fn display_entries(destination: &Destination, entries: &[ObjectEntry]) {
    println!("Contents of {}:", destination);
    println!("{}", "─".repeat(60));

    if entries.is_empty() {
        println!("  (empty)");
        return;
    }

    println!("  {:6}  {:>10}  {:16}  {}", "Kind", "Size", "Modified", "Name");
    for entry in entries {
        let size = if entry.is_directory {
            "-".to_string()
        } else {
            format_size(entry.size)
        };
        let modified = entry.updated_at.map_or_else(
            || "-".to_string(),
            |t| t.format("%Y-%m-%d %H:%M").to_string(),
        );
        println!(
            "  {:6}  {:>10}  {:16}  {}",
            kind_icon(&entry.kind, entry.is_directory),
            size,
            modified,
            entry.name
        );
    }
}
