//! CLI command definitions and handlers.

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;

use devlink_core::config::Config;

/// Load configuration with graceful fallback to defaults.
///
/// This function should be used by all commands to load the user's configuration.
/// If the config file doesn't exist or can't be parsed, it falls back to defaults.
pub fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!("Using default configuration: {}", e);
        let mut config = Config::default();
        config.apply_env();
        config
    })
}

/// Resolve the target device from `--device` or the configured default.
pub fn resolve_device(arg: Option<String>, config: &Config) -> anyhow::Result<String> {
    arg.or_else(|| config.general.default_device.clone())
        .filter(|device| !device.trim().is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No device given. Pass --device or set general.default_device in {}",
                Config::config_path().display()
            )
        })
}

/// Ask a yes/no question on the terminal. End of input means no.
pub fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("  {} [y/N] ", question);
    let _ = io::stdout().flush();

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_lowercase();
    println!();

    Ok(input == "y" || input == "yes")
}

/// Print the hint for a storage error and wrap it with `context`.
pub fn storage_failure(err: devlink_core::Error, context: String) -> anyhow::Error {
    if let Some(suggestion) = err.suggestion() {
        eprintln!("  {}", suggestion);
    }
    let context = match err.code() {
        Some(code) => format!("{context} [{code}]"),
        None => context,
    };
    anyhow::Error::new(err).context(context)
}

pub mod config;
pub mod get;
pub mod ls;
pub mod mkdir;
pub mod rm;
pub mod upload;
pub mod usage;

/// Devlink - Upload files to paired devices
#[derive(Parser)]
#[command(name = "devlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Upload files and folders into a device folder
    Upload(UploadArgs),

    /// List a device folder
    Ls(LsArgs),

    /// Create a folder on a device
    Mkdir(MkdirArgs),

    /// Delete a file or folder from a device
    Rm(RmArgs),

    /// Download a file from a device
    Get(GetArgs),

    /// Show total storage used by a device
    Usage(UsageArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the upload command
#[derive(Parser)]
pub struct UploadArgs {
    /// Files and folders to upload
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Target device (defaults to general.default_device)
    #[arg(short, long, env = "DEVLINK_DEVICE")]
    pub device: Option<String>,

    /// Destination folder on the device
    #[arg(short, long, default_value = "/")]
    pub folder: String,

    /// Simulate the upload against an in-memory store
    #[arg(long)]
    pub dry_run: bool,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the ls command
#[derive(Parser)]
pub struct LsArgs {
    /// Target device (defaults to general.default_device)
    #[arg(short, long, env = "DEVLINK_DEVICE")]
    pub device: Option<String>,

    /// Folder to list
    #[arg(short, long, default_value = "/")]
    pub folder: String,

    /// Only show entries whose name contains this text (case-insensitive)
    #[arg(long)]
    pub filter: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the mkdir command
#[derive(Parser)]
pub struct MkdirArgs {
    /// Name of the new folder
    pub name: String,

    /// Target device (defaults to general.default_device)
    #[arg(short, long, env = "DEVLINK_DEVICE")]
    pub device: Option<String>,

    /// Parent folder
    #[arg(short, long, default_value = "/")]
    pub folder: String,
}

/// Arguments for the rm command
#[derive(Parser)]
pub struct RmArgs {
    /// Name of the file or folder to delete
    pub name: String,

    /// Target device (defaults to general.default_device)
    #[arg(short, long, env = "DEVLINK_DEVICE")]
    pub device: Option<String>,

    /// Folder holding the entry
    #[arg(short, long, default_value = "/")]
    pub folder: String,

    /// Delete without asking
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the get command
#[derive(Parser)]
pub struct GetArgs {
    /// Name of the file to download
    pub name: String,

    /// Target device (defaults to general.default_device)
    #[arg(short, long, env = "DEVLINK_DEVICE")]
    pub device: Option<String>,

    /// Folder holding the file
    #[arg(short, long, default_value = "/")]
    pub folder: String,

    /// Where to write the file (defaults to its name in the current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the public download URL instead of downloading
    #[arg(long)]
    pub url: bool,
}

/// Arguments for the usage command
#[derive(Parser)]
pub struct UsageArgs {
    /// Target device (defaults to general.default_device)
    #[arg(short, long, env = "DEVLINK_DEVICE")]
    pub device: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Print only the configuration file path
    #[arg(long)]
    pub path: bool,
}
