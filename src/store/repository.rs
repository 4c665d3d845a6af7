//! Store-backed repository.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{KvError, Result};
use crate::value::{RawValue, Value};

use super::{Repository, Request, StoreClient, StoreError, Target, UpdateOp, VALUE_FIELD};

/// [`Repository`] that keeps records as `[key, value]` tuples in one space.
///
/// Every operation is a single request; failures are returned as they occur.
pub struct TarantoolRepository<C> {
    client: Arc<C>,
    target: Target,
}

impl<C: StoreClient> TarantoolRepository<C> {
    /// Create a repository over an already resolved space and primary index.
    pub fn new(client: Arc<C>, target: Target) -> Self {
        Self { client, target }
    }

    /// Resolve `space` and `index` by name, then create the repository.
    pub async fn open(client: Arc<C>, space: &str, index: &str) -> std::result::Result<Self, StoreError> {
        let target = client.resolve(space, index).await?;
        debug!(space, index, space_id = target.space_id, index_id = target.index_id, "resolved record space");
        Ok(Self::new(client, target))
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Run a request; an empty result set means the key does not exist.
    async fn exec(&self, key: &str, request: Request) -> Result<Vec<RawValue>> {
        let tuples = self.client.call(request).await.map_err(|e| {
            warn!(key, error = %e, "store request failed");
            KvError::Internal(e)
        })?;

        debug!(key, tuples = tuples.len(), "store response");

        if tuples.is_empty() {
            return Err(KvError::NotFound(key.to_string()));
        }
        Ok(tuples)
    }

    fn key_of(key: &str) -> Vec<RawValue> {
        vec![RawValue::from(key)]
    }
}

/// Take the value field out of the first tuple of a result set.
fn value_of(tuples: Vec<RawValue>) -> Result<RawValue> {
    let first = tuples.into_iter().next();
    match first {
        Some(RawValue::Array(fields)) if fields.len() >= 2 => fields
            .into_iter()
            .nth(VALUE_FIELD as usize)
            .ok_or_else(|| KvError::Internal(StoreError::Protocol("record has no value field".into()))),
        Some(other) => Err(KvError::Internal(StoreError::Protocol(format!(
            "expected a [key, value] record, got {}",
            other.kind()
        )))),
        None => Err(KvError::Internal(StoreError::Protocol("empty result set".into()))),
    }
}

#[async_trait]
impl<C: StoreClient + 'static> Repository for TarantoolRepository<C> {
    async fn add(&self, key: &str, value: Value) -> Result<()> {
        debug!(key, "adding value");
        let request = Request::Insert {
            space_id: self.target.space_id,
            tuple: vec![RawValue::from(key), RawValue::from(value)],
        };
        match self.client.call(request).await {
            Ok(tuples) if tuples.is_empty() => {
                warn!(key, "insert returned no tuple");
                Err(KvError::Internal(StoreError::Protocol("insert returned no tuple".into())))
            }
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => {
                debug!(key, "key already exists");
                Err(KvError::Duplicate(key.to_string()))
            }
            Err(e) => {
                warn!(key, error = %e, "store request failed");
                Err(KvError::Internal(e))
            }
        }
    }

    async fn get(&self, key: &str) -> Result<RawValue> {
        debug!(key, "getting value");
        let request = Request::Select {
            target: self.target,
            key: Self::key_of(key),
        };
        let tuples = self.exec(key, request).await?;
        value_of(tuples)
    }

    async fn update(&self, key: &str, value: Value) -> Result<()> {
        debug!(key, "updating value");
        let request = Request::Update {
            target: self.target,
            key: Self::key_of(key),
            ops: vec![UpdateOp::Assign {
                field: VALUE_FIELD,
                value: RawValue::from(value),
            }],
        };
        self.exec(key, request).await.map(|_| ())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!(key, "deleting value");
        let request = Request::Delete {
            target: self.target,
            key: Self::key_of(key),
        };
        self.exec(key, request).await.map(|_| ())
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping().await.map_err(KvError::Internal)
    }
}
