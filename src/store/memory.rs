//! In-process store client.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::value::RawValue;

use super::{ER_TUPLE_FOUND, Request, StoreClient, StoreError, Target, UpdateOp};

const SPACE_ID: u32 = 512;
const INDEX_ID: u32 = 0;

/// A [`StoreClient`] holding one space in memory.
///
/// Tuples are keyed by their first field, which must be a string. Requests
/// behave as they do against a Tarantool space with a unique primary index:
/// inserting an existing key fails with `ER_TUPLE_FOUND`, and operations on
/// absent keys return an empty result set. Any space or index name resolves.
#[derive(Debug, Default)]
pub struct MemoryClient {
    tuples: Mutex<BTreeMap<String, Vec<RawValue>>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a tuple as-is, replacing any tuple with the same key.
    ///
    /// Lets tests plant values the HTTP API could never write, such as maps
    /// with integer keys.
    pub fn put_raw(&self, tuple: RawValue) {
        let fields = match tuple {
            RawValue::Array(fields) => fields,
            other => vec![other],
        };
        if let Some(RawValue::String(key)) = fields.first() {
            let key = key.clone();
            self.lock().insert(key, fields);
        }
    }

    /// Number of stored tuples.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<RawValue>>> {
        self.tuples.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_space(space_id: u32) -> Result<(), StoreError> {
        if space_id == SPACE_ID {
            Ok(())
        } else {
            Err(StoreError::Server {
                code: 36,
                message: format!("Space '{}' does not exist", space_id),
            })
        }
    }
}

fn string_key(key: &[RawValue]) -> Result<String, StoreError> {
    match key {
        [RawValue::String(s)] => Ok(s.clone()),
        _ => Err(StoreError::Server {
            code: 19,
            message: "Supplied key type of part 0 does not match index part type: expected string".into(),
        }),
    }
}

#[async_trait]
impl StoreClient for MemoryClient {
    async fn resolve(&self, _space: &str, _index: &str) -> Result<Target, StoreError> {
        Ok(Target {
            space_id: SPACE_ID,
            index_id: INDEX_ID,
        })
    }

    async fn call(&self, request: Request) -> Result<Vec<RawValue>, StoreError> {
        match request {
            Request::Select { target, key } => {
                Self::check_space(target.space_id)?;
                let key = string_key(&key)?;
                Ok(self
                    .lock()
                    .get(&key)
                    .map(|fields| vec![RawValue::Array(fields.clone())])
                    .unwrap_or_default())
            }
            Request::Insert { space_id, tuple } => {
                Self::check_space(space_id)?;
                let key = match tuple.first() {
                    Some(RawValue::String(s)) => s.clone(),
                    _ => return Err(StoreError::Server {
                        code: 19,
                        message: "Tuple field 1 type does not match one required by operation: expected string".into(),
                    }),
                };
                let mut tuples = self.lock();
                if tuples.contains_key(&key) {
                    return Err(StoreError::Server {
                        code: ER_TUPLE_FOUND,
                        message: format!("Duplicate key exists in unique index \"primary\" in space \"{}\"", SPACE_ID),
                    });
                }
                tuples.insert(key, tuple.clone());
                Ok(vec![RawValue::Array(tuple)])
            }
            Request::Update { target, key, ops } => {
                Self::check_space(target.space_id)?;
                let key = string_key(&key)?;
                let mut tuples = self.lock();
                let Some(fields) = tuples.get_mut(&key) else {
                    return Ok(Vec::new());
                };
                for op in ops {
                    let UpdateOp::Assign { field, value } = op;
                    if field == 0 {
                        return Err(StoreError::Server {
                            code: 105,
                            message: "Attempt to modify a tuple field which is part of primary index".into(),
                        });
                    }
                    let len = fields.len();
                    match fields.get_mut(field as usize) {
                        Some(slot) => *slot = value,
                        None if field as usize == len => fields.push(value),
                        None => {
                            return Err(StoreError::Server {
                                code: 116,
                                message: format!("Field {} was not found in the tuple", field),
                            });
                        }
                    }
                }
                Ok(vec![RawValue::Array(fields.clone())])
            }
            Request::Delete { target, key } => {
                Self::check_space(target.space_id)?;
                let key = string_key(&key)?;
                Ok(self
                    .lock()
                    .remove(&key)
                    .map(|fields| vec![RawValue::Array(fields)])
                    .unwrap_or_default())
            }
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
