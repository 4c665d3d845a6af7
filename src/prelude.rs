//! Convenient re-exports for common usage patterns.
//!
//! ```ignore
//! use tarantool_kv::prelude::*;
//! ```

pub use crate::error::{KvError, Result};
pub use crate::store::{
    ConnectOptions, MemoryClient, Repository, Request, StoreClient, StoreError, Target, TarantoolClient,
    TarantoolRepository, UpdateOp,
};
pub use crate::value::{NonStringKey, RawValue, Value, canonicalize};
