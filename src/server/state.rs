//! Application state management.

use std::sync::Arc;

use crate::store::{MemoryClient, Repository, StoreError, TarantoolClient, TarantoolRepository};

use super::config::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    repository: Arc<dyn Repository>,
}

impl AppState {
    /// Wrap an already constructed repository.
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Connect to Tarantool and resolve the record space.
    pub async fn connect(config: &Config) -> Result<Self, StateError> {
        let tarantool = &config.tarantool;
        let client = TarantoolClient::connect(&tarantool.connect_options())
            .await
            .map_err(|source| StateError::Connect {
                address: tarantool.address.clone(),
                source,
            })?;

        let repository = TarantoolRepository::open(Arc::new(client), &tarantool.space, &tarantool.index)
            .await
            .map_err(|source| StateError::Resolve {
                space: tarantool.space.clone(),
                index: tarantool.index.clone(),
                source,
            })?;

        Ok(Self::new(Arc::new(repository)))
    }

    /// State backed by an in-process store.
    pub async fn in_memory(config: &Config) -> Result<Self, StateError> {
        let tarantool = &config.tarantool;
        let repository = TarantoolRepository::open(Arc::new(MemoryClient::new()), &tarantool.space, &tarantool.index)
            .await
            .map_err(|source| StateError::Resolve {
                space: tarantool.space.clone(),
                index: tarantool.index.clone(),
                source,
            })?;
        Ok(Self::new(Arc::new(repository)))
    }

    /// The repository handlers operate on.
    pub fn repository(&self) -> &dyn Repository {
        self.repository.as_ref()
    }
}

/// Errors that can occur when setting up application state.
#[derive(Debug)]
pub enum StateError {
    /// Failed to connect to the store.
    Connect { address: String, source: StoreError },
    /// Failed to find the record space or its index.
    Resolve {
        space: String,
        index: String,
        source: StoreError,
    },
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::Connect { address, source } => {
                write!(f, "Failed to connect to tarantool at '{}': {}", address, source)
            }
            StateError::Resolve { space, index, source } => {
                write!(f, "Failed to resolve space '{}' index '{}': {}", space, index, source)
            }
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StateError::Connect { source, .. } | StateError::Resolve { source, .. } => Some(source),
        }
    }
}
