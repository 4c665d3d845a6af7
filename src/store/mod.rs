//! Storage layer: the repository contract and the clients behind it.
//!
//! Records live in a single space with two fields, `[key, value]`, and a
//! unique primary index on the key. [`Repository`] is what the HTTP layer
//! talks to; [`StoreClient`] is the seam between the repository and the wire.
//!
//! - [`TarantoolRepository`] - the store-backed [`Repository`]
//! - [`TarantoolClient`] - IPROTO client for a Tarantool instance
//! - [`MemoryClient`] - in-process [`StoreClient`] with the same semantics

mod error;
mod memory;
mod repository;
pub mod tarantool;

use async_trait::async_trait;

use crate::error::Result;
use crate::value::{RawValue, Value};

pub use error::{ER_TUPLE_FOUND, StoreError};
pub use memory::MemoryClient;
pub use repository::TarantoolRepository;
pub use tarantool::{ConnectOptions, TarantoolClient};

/// Default space holding the records.
pub const DEFAULT_SPACE: &str = "json_data";

/// Default name of the primary index on the key field.
pub const DEFAULT_INDEX: &str = "primary";

/// Position of the value within a record tuple.
pub const VALUE_FIELD: u32 = 1;

/// Key-value operations over the record space.
///
/// `add` fails with `Duplicate` when the key exists; `get`, `update` and
/// `delete` fail with `NotFound` when it does not.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert a new record.
    async fn add(&self, key: &str, value: Value) -> Result<()>;

    /// Fetch the stored value, exactly as the store decoded it.
    async fn get(&self, key: &str) -> Result<RawValue>;

    /// Replace the whole value of an existing record.
    async fn update(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a record.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check that the store answers.
    async fn ping(&self) -> Result<()>;
}

/// Numeric ids of a space and one of its indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub space_id: u32,
    pub index_id: u32,
}

/// Field update applied by [`Request::Update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Set a zero-based field to a new value.
    Assign { field: u32, value: RawValue },
}

/// A single store round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Select { target: Target, key: Vec<RawValue> },
    Insert { space_id: u32, tuple: Vec<RawValue> },
    Update { target: Target, key: Vec<RawValue>, ops: Vec<UpdateOp> },
    Delete { target: Target, key: Vec<RawValue> },
}

/// Request/response access to a store.
///
/// Implementations must accept concurrent calls; callers take no locks.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Look up the ids of a space and one of its indexes by name.
    async fn resolve(&self, space: &str, index: &str) -> std::result::Result<Target, StoreError>;

    /// Execute one request and return the tuples in its result set.
    async fn call(&self, request: Request) -> std::result::Result<Vec<RawValue>, StoreError>;

    /// Round trip with no effect.
    async fn ping(&self) -> std::result::Result<(), StoreError>;
}
