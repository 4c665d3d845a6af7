//! JSON key-value API backed by a Tarantool space.
//!
//! Records are `[key, value]` tuples in a single space with a unique primary
//! index on the key. Values go in as JSON, are stored as MessagePack, and are
//! canonicalized back into JSON on the way out.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tarantool_kv::prelude::*;
//!
//! let client = TarantoolClient::connect(&ConnectOptions::default()).await?;
//! let repo = TarantoolRepository::open(Arc::new(client), "json_data", "primary").await?;
//!
//! repo.add("k1", serde_json::json!({"x": 1})).await?;
//! let value = canonicalize(repo.get("k1").await?)?;
//! ```
//!
//! # Modules
//!
//! - [`value`] - Stored value model and JSON canonicalization
//! - [`store`] - Repository contract, Tarantool client and in-memory client
//! - [`server`] - HTTP API server (requires `server` feature)
//!
//! # Feature Flags
//!
//! - `server` - Enable the HTTP API server and its binary (enabled by default)

mod error;
pub mod prelude;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod value;

pub use error::{KvError, Result};
pub use store::{
    ConnectOptions, MemoryClient, Repository, StoreClient, StoreError, TarantoolClient, TarantoolRepository,
};
pub use value::{NonStringKey, RawValue, Value, canonicalize};
