//! Connection greeting and `chap-sha1` authentication.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};

use crate::store::StoreError;

/// Size of the greeting the server sends on connect.
pub const GREETING_SIZE: usize = 128;

const LINE_SIZE: usize = 64;
const SCRAMBLE_SIZE: usize = 20;

/// Parsed server greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// First line, e.g. `Tarantool 2.11.1 (Binary) <uuid>`.
    pub version: String,
    /// Decoded salt for authentication.
    pub salt: Vec<u8>,
}

impl Greeting {
    pub fn parse(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() < GREETING_SIZE {
            return Err(StoreError::Greeting(format!(
                "expected {} bytes, got {}",
                GREETING_SIZE,
                bytes.len()
            )));
        }
        let (first, rest) = bytes.split_at(LINE_SIZE);
        let second = rest.get(..LINE_SIZE).unwrap_or(rest);

        let version = String::from_utf8_lossy(first).trim().to_string();
        if !version.starts_with("Tarantool") {
            return Err(StoreError::Greeting(format!("unexpected server '{}'", version)));
        }

        let encoded = String::from_utf8_lossy(second);
        let salt = STANDARD
            .decode(encoded.trim())
            .map_err(|e| StoreError::Greeting(format!("invalid salt: {}", e)))?;
        if salt.len() < SCRAMBLE_SIZE {
            return Err(StoreError::Greeting("salt too short".into()));
        }

        Ok(Self { version, salt })
    }
}

/// Compute the `chap-sha1` scramble for a password:
/// `sha1(password) XOR sha1(salt[..20] ++ sha1(sha1(password)))`.
pub fn scramble(salt: &[u8], password: &str) -> Vec<u8> {
    let hash1 = Sha1::digest(password.as_bytes());
    let hash2 = Sha1::digest(hash1);

    let mut hasher = Sha1::new();
    hasher.update(salt.get(..SCRAMBLE_SIZE).unwrap_or(salt));
    hasher.update(hash2);
    let hash3 = hasher.finalize();

    hash1.iter().zip(hash3.iter()).map(|(a, b)| a ^ b).collect()
}
