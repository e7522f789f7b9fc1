//! Configuration management for Devlink.
//!
//! This module handles loading, saving, and managing Devlink configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/devlink/config.toml` |
//! | macOS | `~/Library/Application Support/com.devlink.Devlink/config.toml` |
//! | Windows | `%APPDATA%\devlink\Devlink\config\config.toml` |
//!
//! `DEVLINK_ENDPOINT` and `DEVLINK_API_KEY` override the storage section.
//!
//! ## Example
//!
//! ```rust,ignore
//! use devlink_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Bucket: {}", config.storage.bucket);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding `storage.endpoint`.
pub const ENDPOINT_ENV: &str = "DEVLINK_ENDPOINT";

/// Environment variable overriding `storage.api_key`.
pub const API_KEY_ENV: &str = "DEVLINK_API_KEY";

/// Main configuration struct for Devlink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Storage endpoint settings
    pub storage: StorageConfig,
    /// Upload pipeline settings
    pub upload: UploadConfig,
}

/// General configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Device used when a command gets no `--device`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_device: Option<String>,
}

/// Storage endpoint configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL of the storage service
    pub endpoint: String,
    /// Bucket holding device files
    pub bucket: String,
    /// API key sent as bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Connect timeout, limit for listing and removal requests, and how
    /// long a transfer may go without moving any bytes
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Maximum entries per listing request
    pub list_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:54321".to_string(),
            bucket: crate::DEFAULT_BUCKET.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(300),
            list_limit: crate::DEFAULT_LIST_LIMIT,
        }
    }
}

/// Upload pipeline configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Size of the pieces a request body is streamed in
    pub chunk_size: usize,
    /// Minimum spacing between speed samples
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,
    /// Number of samples in the speed moving average
    pub speed_window: usize,
    /// Replace existing objects at the same path
    pub overwrite: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            sample_interval: Duration::from_millis(crate::DEFAULT_SAMPLE_INTERVAL_MS),
            speed_window: crate::DEFAULT_SPEED_WINDOW,
            overwrite: true,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    /// Environment overrides are applied in both cases.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from an explicit file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or fails validation.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit file.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Check values that would make the pipeline misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.upload.chunk_size == 0 {
            return Err(Error::InvalidConfig {
                key: "upload.chunk_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.upload.speed_window == 0 {
            return Err(Error::InvalidConfig {
                key: "upload.speed_window".to_string(),
                reason: "must hold at least one sample".to_string(),
            });
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(Error::InvalidConfig {
                key: "storage.bucket".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Apply `DEVLINK_ENDPOINT` / `DEVLINK_API_KEY` when set.
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            if !endpoint.is_empty() {
                self.storage.endpoint = endpoint;
            }
        }
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.storage.api_key = Some(key);
            }
        }
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "devlink", "Devlink")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.strip_suffix("ms")
            .map(|millis| {
                millis
                    .parse()
                    .map(Duration::from_millis)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('s').map(|secs| {
                    secs.parse()
                        .map(Duration::from_secs)
                        .map_err(serde::de::Error::custom)
                })
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map(|m| Duration::from_secs(m * 60))
                        .map_err(serde::de::Error::custom)
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}
