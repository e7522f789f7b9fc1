//! Config command implementation.

use anyhow::{Context, Result};

use devlink_core::config::Config;

use super::ConfigArgs;

/// Run the config command.
pub async fn run(args: ConfigArgs) -> Result<()> {
    if args.path {
        println!("{}", Config::config_path().display());
        return Ok(());
    }

    let mut config = super::load_config();
    if config.storage.api_key.is_some() {
        config.storage.api_key = Some(REDACTED.to_string());
    }

    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("# {}", Config::config_path().display());
    println!();
    print!("{}", rendered);
    Ok(())
}

const REDACTED: &str = "********";
