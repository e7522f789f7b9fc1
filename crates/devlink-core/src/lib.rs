//! # Devlink Core Library
//!
//! `devlink-core` provides the upload pipeline behind Devlink: pushing files
//! from this machine into a paired device's storage folder while reporting
//! live progress.
//!
//! ## Features
//!
//! - **Sequential queue**: files upload one at a time in submission order
//! - **Live telemetry**: per-file and batch progress, smoothed speed and ETA
//! - **User control**: pause, resume, cancel, retry and clear
//! - **Pluggable storage**: BaaS storage REST endpoint or in-memory store
//! - **Folder browsing**: list, filter, create, download and delete entries
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`error`] - Error type shared by storage and configuration code
//! - [`storage`] - Object store abstraction, destinations and listings
//! - [`upload`] - Transfer units, speed estimation, queue and session
//!
//! ## Example
//!
//! ```rust,ignore
//! use devlink_core::storage::{Destination, MemoryObjectStore};
//! use devlink_core::upload::{FilePayload, UploadSession, UploadSettings};
//!
//! let store = std::sync::Arc::new(MemoryObjectStore::new());
//! let session = UploadSession::start(store, UploadSettings::default(), || {
//!     println!("upload queue drained");
//! });
//!
//! let destination = Destination::new("device-1", "/photos");
//! session.submit(vec![FilePayload::new("a.jpg", bytes)], destination).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod error;
pub mod storage;
pub mod upload;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default storage bucket holding device files
pub const DEFAULT_BUCKET: &str = "device-files";

/// Default size of the pieces an upload body is streamed in (64 KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Minimum spacing between two speed samples, in milliseconds
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 100;

/// Number of speed samples averaged into the smoothed speed
pub const DEFAULT_SPEED_WINDOW: usize = 10;

/// Default maximum number of entries returned by a listing request
pub const DEFAULT_LIST_LIMIT: usize = 100;
