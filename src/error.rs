//! Failure kinds shared by the repository and the HTTP layer.

use thiserror::Error;

use crate::store::StoreError;
use crate::value::NonStringKey;

/// Every way a key-value operation can fail.
///
/// The HTTP layer maps each variant to exactly one status code; callers match
/// on the variant, never on the rendered message.
#[derive(Error, Debug)]
pub enum KvError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Key already exists: {0}")]
    Duplicate(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    NonStringKey(#[from] NonStringKey),

    #[error("Store error: {0}")]
    Internal(#[source] StoreError),
}

/// Result type for key-value operations.
pub type Result<T> = std::result::Result<T, KvError>;

impl From<StoreError> for KvError {
    fn from(err: StoreError) -> Self {
        KvError::Internal(err)
    }
}
