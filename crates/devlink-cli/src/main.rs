//! Devlink CLI - Upload files to paired devices
//!
//! Devlink pushes local files into a device's storage folder one at a time,
//! showing live progress, speed and time remaining.
//!
//! ## Quick Start
//!
//! ```bash
//! # Upload files into a device folder
//! devlink upload ./photos --device laptop-01 --folder /backup
//!
//! # List what is there now
//! devlink ls --device laptop-01 --folder /backup
//!
//! # Fetch or delete a file
//! devlink get report.pdf --device laptop-01 --folder /backup
//! devlink rm report.pdf --device laptop-01 --folder /backup
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::cast_precision_loss)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Upload(args) => commands::upload::run(args).await,
        Command::Ls(args) => commands::ls::run(args).await,
        Command::Mkdir(args) => commands::mkdir::run(args).await,
        Command::Rm(args) => commands::rm::run(args).await,
        Command::Get(args) => commands::get::run(args).await,
        Command::Usage(args) => commands::usage::run(args).await,
        Command::Config(args) => commands::config::run(args).await,
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,devlink=info,devlink_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
