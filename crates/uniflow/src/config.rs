//! Store configuration
//!
//! Configuration is optional; every field has a default so a partial TOML
//! file (or none at all) yields a working store.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Runtime settings for a `Store`
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Name of the thread backing the serial execution context
    #[serde(default = "default_executor_thread_name")]
    pub executor_thread_name: String,

    /// Worker threads driving async operations (timers, I/O)
    #[serde(default = "default_async_worker_threads")]
    pub async_worker_threads: usize,

    /// Name prefix of the async worker threads
    #[serde(default = "default_async_thread_name")]
    pub async_thread_name: String,
}

fn default_executor_thread_name() -> String {
    "uniflow-serial".to_string()
}

fn default_async_worker_threads() -> usize {
    2
}

fn default_async_thread_name() -> String {
    "uniflow-async".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            executor_thread_name: default_executor_thread_name(),
            async_worker_threads: default_async_worker_threads(),
            async_thread_name: default_async_thread_name(),
        }
    }
}

impl StoreConfig {
    /// Parse a config from TOML
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: StoreConfig = toml::from_str(content)?;
        // A runtime without workers would never drive anything
        config.async_worker_threads = config.async_worker_threads.max(1);
        Ok(config)
    }

    /// Read and parse a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load config from `path`, or use defaults if it is missing or invalid
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                log::info!("Loaded store config from {}", path.display());
                config
            }
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No store config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                log::warn!("Failed to load store config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}
