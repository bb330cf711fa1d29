//! Error types for the store, its async operations and its configuration

use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the container itself
#[derive(Debug, Error)]
pub enum StoreError {
    /// The dedicated serial thread could not be spawned.
    #[error("Failed to spawn serial context thread: {0}")]
    SpawnSerialContext(#[source] std::io::Error),

    /// The runtime driving async actions could not be built.
    #[error("Failed to build async runtime: {0}")]
    AsyncRuntime(#[source] std::io::Error),

    /// The serial context has stopped, the store is gone or a reducer panicked.
    #[error("Serial context has terminated")]
    Terminated,
}

/// Terminal error of an async operation
///
/// Cloneable so that every subscriber of a shared handle observes the same
/// single outcome.
#[derive(Debug, Clone, Error)]
pub enum OpError {
    /// The operation itself failed.
    #[error("Async action failed: {0}")]
    Failed(Arc<anyhow::Error>),

    /// The operation ended without reporting an outcome, or never started
    /// because its store had terminated.
    #[error("Async action was dropped before it completed")]
    Dropped,
}

impl OpError {
    /// The underlying failure, if the operation reported one
    pub fn failure(&self) -> Option<&anyhow::Error> {
        match self {
            OpError::Failed(err) => Some(err),
            OpError::Dropped => None,
        }
    }
}

impl From<anyhow::Error> for OpError {
    fn from(err: anyhow::Error) -> Self {
        OpError::Failed(Arc::new(err))
    }
}

/// Errors that can occur while loading a `StoreConfig`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
