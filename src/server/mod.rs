//! HTTP API server for tarantool-kv.
//!
//! This module exposes the key-value API over HTTP using axum. Handlers talk
//! to a [`Repository`](crate::store::Repository) held in [`AppState`].

mod config;
mod error;
mod logging;
mod routes;
mod state;

pub use config::{Config, ConfigError, LogFormat, LoggingConfig, ServerConfig, TarantoolConfig};
pub use error::ApiError;
pub use logging::{LoggingError, init as init_logging};
pub use routes::router;
pub use state::{AppState, StateError};
