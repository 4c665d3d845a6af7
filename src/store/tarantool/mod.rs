//! Tarantool IPROTO client.
//!
//! One TCP connection is shared by all callers. Each request carries a `sync`
//! id; a background task reads responses and hands each one to the caller
//! waiting on that id, so replies may arrive in any order.

mod auth;
mod codec;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::value::RawValue;

use super::{Request, StoreClient, StoreError, Target};

pub use auth::{GREETING_SIZE, Greeting, scramble};
use codec::{LengthMarker, Response};

/// User a session has before authenticating.
const GUEST: &str = "guest";

/// System view listing spaces.
const VSPACE_ID: u32 = 281;
/// System view listing indexes.
const VINDEX_ID: u32 = 289;
/// Secondary index on `name` in `_vspace`, and on `[id, name]` in `_vindex`.
const NAME_INDEX_ID: u32 = 2;

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// `host:port` of the instance.
    pub address: String,
    /// User to authenticate as.
    pub user: String,
    /// Password; without one the session stays `guest`.
    pub password: Option<String>,
    /// Bound on connecting, reading the greeting and authenticating.
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3301".to_string(),
            user: GUEST.to_string(),
            password: None,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

type Pending = HashMap<u64, oneshot::Sender<Result<Response, StoreError>>>;

/// State shared between callers and the reader task.
struct Shared {
    /// Waiting callers by sync id. `None` once the connection is gone.
    pending: Mutex<Option<Pending>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self, sync: u64) -> Result<oneshot::Receiver<Result<Response, StoreError>>, StoreError> {
        let (tx, rx) = oneshot::channel();
        match self.lock().as_mut() {
            Some(pending) => {
                pending.insert(sync, tx);
                Ok(rx)
            }
            None => Err(StoreError::Disconnected),
        }
    }

    fn forget(&self, sync: u64) {
        if let Some(pending) = self.lock().as_mut() {
            pending.remove(&sync);
        }
    }

    fn complete(&self, response: Response) {
        let waiter = self.lock().as_mut().and_then(|p| p.remove(&response.sync));
        match waiter {
            // The caller may have gone away; nothing to do then.
            Some(tx) => {
                let _ = tx.send(Ok(response));
            }
            None => debug!(sync = response.sync, "response for unknown request"),
        }
    }

    /// Fail every waiting caller and refuse new ones.
    fn close(&self) {
        let pending = self.lock().take();
        for (_, tx) in pending.into_iter().flatten() {
            let _ = tx.send(Err(StoreError::Disconnected));
        }
    }
}

/// Client for a single Tarantool instance.
pub struct TarantoolClient {
    address: String,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    shared: Arc<Shared>,
    next_sync: AtomicU64,
    reader: JoinHandle<()>,
}

impl TarantoolClient {
    /// Connect, read the greeting and authenticate if a password is set.
    ///
    /// The whole handshake is bounded by `options.connect_timeout`.
    pub async fn connect(options: &ConnectOptions) -> Result<Self, StoreError> {
        info!(address = %options.address, user = %options.user, "connecting to tarantool");

        let handshake = Self::handshake(options);
        let (stream, greeting) = timeout(options.connect_timeout, handshake)
            .await
            .map_err(|_| StoreError::ConnectTimeout {
                address: options.address.clone(),
                timeout: options.connect_timeout,
            })??;

        info!(address = %options.address, server = %greeting.version, "connected to tarantool");

        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(Shared {
            pending: Mutex::new(Some(HashMap::new())),
        });
        let reader = tokio::spawn(read_loop(read_half, shared.clone(), options.address.clone()));

        Ok(Self {
            address: options.address.clone(),
            writer: tokio::sync::Mutex::new(write_half),
            shared,
            // Sync 0 is used by the handshake.
            next_sync: AtomicU64::new(1),
            reader,
        })
    }

    async fn handshake(options: &ConnectOptions) -> Result<(TcpStream, Greeting), StoreError> {
        let mut stream = TcpStream::connect(options.address.as_str()).await?;
        stream.set_nodelay(true)?;

        let mut buf = [0u8; GREETING_SIZE];
        stream.read_exact(&mut buf).await?;
        let greeting = Greeting::parse(&buf)?;

        match &options.password {
            Some(password) => {
                debug!(user = %options.user, "authenticating");
                let packet = codec::encode_auth(0, &options.user, &scramble(&greeting.salt, password))?;
                stream.write_all(&packet).await?;
                let response = read_packet(&mut stream).await?;
                codec::decode_response(&response)?.into_data()?;
            }
            None if options.user != GUEST => {
                warn!(user = %options.user, "no password configured; session stays guest");
            }
            None => {}
        }

        Ok((stream, greeting))
    }

    /// Address this client is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn round_trip(&self, encode: impl FnOnce(u64) -> Result<Vec<u8>, StoreError>) -> Result<Vec<RawValue>, StoreError> {
        let sync = self.next_sync.fetch_add(1, Ordering::Relaxed);
        let packet = encode(sync)?;
        let rx = self.shared.register(sync)?;

        let written = {
            let mut writer = self.writer.lock().await;
            writer.write_all(&packet).await
        };
        if let Err(e) = written {
            self.shared.forget(sync);
            return Err(e.into());
        }

        let response = rx.await.map_err(|_| StoreError::Disconnected)??;
        response.into_data()
    }
}

impl Drop for TarantoolClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.shared.close();
    }
}

#[async_trait]
impl StoreClient for TarantoolClient {
    async fn resolve(&self, space: &str, index: &str) -> Result<Target, StoreError> {
        let by_name = Target {
            space_id: VSPACE_ID,
            index_id: NAME_INDEX_ID,
        };
        let spaces = self
            .call(Request::Select {
                target: by_name,
                key: vec![RawValue::from(space)],
            })
            .await?;
        let space_id = first_field_u32(spaces, 0).ok_or_else(|| StoreError::SpaceNotFound(space.to_string()))?;

        let by_name = Target {
            space_id: VINDEX_ID,
            index_id: NAME_INDEX_ID,
        };
        let indexes = self
            .call(Request::Select {
                target: by_name,
                key: vec![RawValue::UInt(u64::from(space_id)), RawValue::from(index)],
            })
            .await?;
        let index_id = first_field_u32(indexes, 1).ok_or_else(|| StoreError::IndexNotFound {
            space: space.to_string(),
            index: index.to_string(),
        })?;

        Ok(Target { space_id, index_id })
    }

    async fn call(&self, request: Request) -> Result<Vec<RawValue>, StoreError> {
        self.round_trip(|sync| codec::encode_request(sync, &request)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.round_trip(codec::encode_ping).await.map(|_| ())
    }
}

/// Read field `n` of the first tuple as an id.
fn first_field_u32(tuples: Vec<RawValue>, n: usize) -> Option<u32> {
    match tuples.into_iter().next()? {
        RawValue::Array(fields) => match fields.into_iter().nth(n)? {
            RawValue::UInt(id) => u32::try_from(id).ok(),
            _ => None,
        },
        _ => None,
    }
}

/// Read one length-prefixed packet, returning the bytes after the prefix.
async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, StoreError> {
    let len = match codec::length_marker(reader.read_u8().await?)? {
        LengthMarker::Immediate(len) => len,
        LengthMarker::Follows(n) => {
            let mut bytes = vec![0u8; n];
            reader.read_exact(&mut bytes).await?;
            codec::length_from(&bytes)
        }
    };
    let mut packet = vec![0u8; len as usize];
    reader.read_exact(&mut packet).await?;
    Ok(packet)
}

async fn read_loop(mut reader: OwnedReadHalf, shared: Arc<Shared>, address: String) {
    let err = loop {
        let response = match read_packet(&mut reader).await {
            Ok(packet) => codec::decode_response(&packet),
            Err(e) => Err(e),
        };
        match response {
            Ok(response) if response.is_push() => debug!(sync = response.sync, "ignoring push message"),
            Ok(response) => shared.complete(response),
            Err(e) => break e,
        }
    };
    warn!(address = %address, error = %err, "tarantool connection lost");
    shared.close();
}
