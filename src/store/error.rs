//! Error types for store clients.

use std::time::Duration;

use thiserror::Error;

/// Tarantool error code for a duplicate key in a unique index.
pub const ER_TUPLE_FOUND: u32 = 3;

/// Errors raised while talking to the store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("Invalid greeting: {0}")]
    Greeting(String),

    #[error("Failed to encode request: {0}")]
    Encode(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error {code}: {message}")]
    Server { code: u32, message: String },

    #[error("Connection closed")]
    Disconnected,

    #[error("Space not found: {0}")]
    SpaceNotFound(String),

    #[error("Index '{index}' not found in space '{space}'")]
    IndexNotFound { space: String, index: String },
}

impl StoreError {
    /// Whether the server rejected a write because the key already exists.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Server { code, .. } if *code == ER_TUPLE_FOUND)
    }
}
