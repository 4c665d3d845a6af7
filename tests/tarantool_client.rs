//! Tests for the IPROTO client against a scripted server on a local socket.
//!
//! Each test accepts the client's connection itself and plays the server side
//! of the conversation request by request.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rmpv::Value as Wire;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tarantool_kv::store::tarantool::scramble;
use tarantool_kv::store::{Request, Target};
use tarantool_kv::{
    ConnectOptions, KvError, RawValue, Repository, StoreClient, StoreError, TarantoolClient,
    TarantoolRepository,
};

const SALT: [u8; 32] = [9; 32];
const RECORDS: Target = Target {
    space_id: 512,
    index_id: 0,
};

const SELECT: u64 = 1;
const INSERT: u64 = 2;
const AUTH: u64 = 7;
const PING: u64 = 64;

// =============================================================================
// Fake server
// =============================================================================

/// A request as seen by the server.
struct Captured {
    code: u64,
    sync: u64,
    body: Vec<(Wire, Wire)>,
}

impl Captured {
    fn field(&self, key: u64) -> Option<&Wire> {
        self.body
            .iter()
            .find(|(k, _)| k.as_u64() == Some(key))
            .map(|(_, v)| v)
    }
}

fn greeting(server: &str) -> Vec<u8> {
    let mut bytes = format!("{:<63}\n", server).into_bytes();
    bytes.extend(format!("{:<63}\n", STANDARD.encode(SALT)).into_bytes());
    bytes
}

async fn listen() -> anyhow::Result<(TcpListener, ConnectOptions)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let options = ConnectOptions {
        address: listener.local_addr()?.to_string(),
        connect_timeout: Duration::from_secs(2),
        ..ConnectOptions::default()
    };
    Ok((listener, options))
}

async fn accept(listener: &TcpListener) -> anyhow::Result<TcpStream> {
    let (mut stream, _) = listener.accept().await?;
    stream
        .write_all(&greeting("Tarantool 2.11.1 (Binary) 7d4a3c1e-0000-0000-0000-000000000000"))
        .await?;
    Ok(stream)
}

async fn read_request(stream: &mut TcpStream) -> anyhow::Result<Captured> {
    let mut prefix = [0u8; 5];
    stream.read_exact(&mut prefix).await?;
    anyhow::ensure!(prefix[0] == 0xce, "unexpected length marker {:#x}", prefix[0]);
    let len = u32::from_be_bytes([prefix[1], prefix[2], prefix[3], prefix[4]]) as usize;

    let mut packet = vec![0u8; len];
    stream.read_exact(&mut packet).await?;
    let mut cursor = Cursor::new(&packet[..]);
    let header = rmpv::decode::read_value(&mut cursor)?;
    let body = rmpv::decode::read_value(&mut cursor)?;

    let header = header.as_map().cloned().unwrap_or_default();
    let lookup = |key: u64| {
        header
            .iter()
            .find(|(k, _)| k.as_u64() == Some(key))
            .and_then(|(_, v)| v.as_u64())
            .unwrap_or(u64::MAX)
    };
    Ok(Captured {
        code: lookup(0),
        sync: lookup(1),
        body: body.as_map().cloned().unwrap_or_default(),
    })
}

async fn respond(stream: &mut TcpStream, sync: u64, code: u64, body: Vec<(Wire, Wire)>) -> anyhow::Result<()> {
    let mut payload = Vec::new();
    let header = Wire::Map(vec![
        (Wire::from(0u64), Wire::from(code)),
        (Wire::from(1u64), Wire::from(sync)),
        (Wire::from(5u64), Wire::from(80u64)),
    ]);
    rmpv::encode::write_value(&mut payload, &header)?;
    rmpv::encode::write_value(&mut payload, &Wire::Map(body))?;

    let mut packet = vec![0xce];
    packet.extend((payload.len() as u32).to_be_bytes());
    packet.extend(payload);
    stream.write_all(&packet).await?;
    Ok(())
}

fn data(tuples: Vec<Wire>) -> Vec<(Wire, Wire)> {
    vec![(Wire::from(0x30u64), Wire::Array(tuples))]
}

fn record(key: &str, value: Wire) -> Wire {
    Wire::Array(vec![Wire::from(key), value])
}

fn select(key: &str) -> Request {
    Request::Select {
        target: RECORDS,
        key: vec![RawValue::from(key)],
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_resolve_and_select() -> anyhow::Result<()> {
    let (listener, options) = listen().await?;

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;

        let req = read_request(&mut stream).await?;
        anyhow::ensure!(req.code == SELECT && req.field(0x10) == Some(&Wire::from(281u64)));
        anyhow::ensure!(req.field(0x20) == Some(&Wire::Array(vec![Wire::from("json_data")])));
        let space = Wire::Array(vec![Wire::from(512u64), Wire::from(1u64), Wire::from("json_data")]);
        respond(&mut stream, req.sync, 0, data(vec![space])).await?;

        let req = read_request(&mut stream).await?;
        anyhow::ensure!(req.field(0x10) == Some(&Wire::from(289u64)));
        anyhow::ensure!(
            req.field(0x20) == Some(&Wire::Array(vec![Wire::from(512u64), Wire::from("primary")]))
        );
        let index = Wire::Array(vec![Wire::from(512u64), Wire::from(0u64), Wire::from("primary")]);
        respond(&mut stream, req.sync, 0, data(vec![index])).await?;

        let req = read_request(&mut stream).await?;
        anyhow::ensure!(req.field(0x10) == Some(&Wire::from(512u64)));
        let value = Wire::Map(vec![(Wire::from(1u64), Wire::from("one"))]);
        respond(&mut stream, req.sync, 0, data(vec![record("k", value)])).await?;
        Ok::<_, anyhow::Error>(())
    });

    let client = TarantoolClient::connect(&options).await?;
    let target = client.resolve("json_data", "primary").await?;
    assert_eq!(target, RECORDS);

    let tuples = client.call(select("k")).await?;
    assert_eq!(
        tuples,
        vec![RawValue::Array(vec![
            "k".into(),
            RawValue::Map(vec![(RawValue::UInt(1), "one".into())]),
        ])]
    );

    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_missing_space_is_reported() -> anyhow::Result<()> {
    let (listener, options) = listen().await?;

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;
        let req = read_request(&mut stream).await?;
        respond(&mut stream, req.sync, 0, data(vec![])).await?;
        Ok::<_, anyhow::Error>(())
    });

    let client = TarantoolClient::connect(&options).await?;
    let err = client.resolve("nope", "primary").await.unwrap_err();
    assert!(matches!(err, StoreError::SpaceNotFound(ref s) if s == "nope"));

    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_responses_matched_by_sync_out_of_order() -> anyhow::Result<()> {
    let (listener, options) = listen().await?;

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;
        let first = read_request(&mut stream).await?;
        let second = read_request(&mut stream).await?;

        // Answer in reverse order, echoing each request's key as the value.
        for req in [second, first] {
            let key = req
                .field(0x20)
                .and_then(|k| k.as_array())
                .and_then(|k| k.first())
                .and_then(|k| k.as_str())
                .unwrap_or_default()
                .to_string();
            respond(&mut stream, req.sync, 0, data(vec![record(&key, Wire::from(key.as_str()))])).await?;
        }
        Ok::<_, anyhow::Error>(())
    });

    let client = Arc::new(TarantoolClient::connect(&options).await?);
    let (a, b) = tokio::join!(client.call(select("a")), client.call(select("b")));

    assert_eq!(a?, vec![RawValue::Array(vec!["a".into(), "a".into()])]);
    assert_eq!(b?, vec![RawValue::Array(vec!["b".into(), "b".into()])]);

    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_duplicate_insert_through_repository() -> anyhow::Result<()> {
    let (listener, options) = listen().await?;

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;
        let req = read_request(&mut stream).await?;
        anyhow::ensure!(req.code == INSERT);
        let tuple = req.field(0x21).cloned().unwrap_or(Wire::Nil);
        anyhow::ensure!(
            tuple == record("k", Wire::Map(vec![(Wire::from("a"), Wire::from(1u64))])),
            "unexpected tuple {}",
            tuple
        );
        let error = vec![(
            Wire::from(0x31u64),
            Wire::from("Duplicate key exists in unique index \"primary\" in space \"json_data\""),
        )];
        respond(&mut stream, req.sync, 0x8003, error).await?;
        Ok::<_, anyhow::Error>(())
    });

    let client = TarantoolClient::connect(&options).await?;
    let repo = TarantoolRepository::new(Arc::new(client), RECORDS);
    let err = repo.add("k", json!({"a": 1})).await.unwrap_err();
    assert!(matches!(err, KvError::Duplicate(ref key) if key == "k"));

    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_server_error_is_internal() -> anyhow::Result<()> {
    let (listener, options) = listen().await?;

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;
        let req = read_request(&mut stream).await?;
        let error = vec![(Wire::from(0x31u64), Wire::from("Space '512' does not exist"))];
        respond(&mut stream, req.sync, 0x8000 | 36, error).await?;
        Ok::<_, anyhow::Error>(())
    });

    let client = TarantoolClient::connect(&options).await?;
    let repo = TarantoolRepository::new(Arc::new(client), RECORDS);
    let err = repo.get("k").await.unwrap_err();
    assert!(matches!(err, KvError::Internal(StoreError::Server { code: 36, .. })));

    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_disconnect_fails_pending_and_later_calls() -> anyhow::Result<()> {
    let (listener, options) = listen().await?;

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;
        read_request(&mut stream).await?;
        drop(stream);
        Ok::<_, anyhow::Error>(())
    });

    let client = TarantoolClient::connect(&options).await?;
    let err = client.call(select("k")).await.unwrap_err();
    assert!(matches!(err, StoreError::Disconnected));

    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, StoreError::Disconnected));

    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_authenticates_with_password() -> anyhow::Result<()> {
    let (listener, mut options) = listen().await?;
    options.user = "kv".to_string();
    options.password = Some("secret".to_string());

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;

        let req = read_request(&mut stream).await?;
        anyhow::ensure!(req.code == AUTH && req.sync == 0);
        anyhow::ensure!(req.field(0x23).and_then(|u| u.as_str()) == Some("kv"));
        let parts = req.field(0x21).and_then(|t| t.as_array()).cloned().unwrap_or_default();
        anyhow::ensure!(parts.first().and_then(|m| m.as_str()) == Some("chap-sha1"));
        let sent = match parts.get(1) {
            Some(Wire::String(s)) => s.as_bytes().to_vec(),
            _ => Vec::new(),
        };
        anyhow::ensure!(sent == scramble(&SALT, "secret"), "wrong scramble");
        respond(&mut stream, req.sync, 0, vec![]).await?;

        let req = read_request(&mut stream).await?;
        anyhow::ensure!(req.code == PING);
        respond(&mut stream, req.sync, 0, vec![]).await?;
        Ok::<_, anyhow::Error>(())
    });

    let client = TarantoolClient::connect(&options).await?;
    client.ping().await?;

    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_user_without_password_skips_auth() -> anyhow::Result<()> {
    let (listener, mut options) = listen().await?;
    options.user = "admin".to_string();
    options.password = None;

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;
        let req = read_request(&mut stream).await?;
        anyhow::ensure!(req.code == PING, "expected ping first, got request type {}", req.code);
        respond(&mut stream, req.sync, 0, vec![]).await?;
        Ok::<_, anyhow::Error>(())
    });

    let client = TarantoolClient::connect(&options).await?;
    client.ping().await?;

    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_rejected_credentials_fail_connect() -> anyhow::Result<()> {
    let (listener, mut options) = listen().await?;
    options.password = Some("wrong".to_string());

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;
        let req = read_request(&mut stream).await?;
        let error = vec![(Wire::from(0x31u64), Wire::from("Incorrect password supplied for user 'guest'"))];
        respond(&mut stream, req.sync, 0x8000 | 47, error).await?;
        Ok::<_, anyhow::Error>(())
    });

    let result = TarantoolClient::connect(&options).await;
    assert!(matches!(result, Err(StoreError::Server { code: 47, .. })));

    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_silent_server_times_out() -> anyhow::Result<()> {
    let (listener, mut options) = listen().await?;
    options.connect_timeout = Duration::from_millis(100);

    let server = tokio::spawn(async move {
        // Accept but never send a greeting.
        let (stream, _) = listener.accept().await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(stream);
        Ok::<_, anyhow::Error>(())
    });

    let result = TarantoolClient::connect(&options).await;
    assert!(matches!(result, Err(StoreError::ConnectTimeout { .. })));

    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_foreign_greeting_is_rejected() -> anyhow::Result<()> {
    let (listener, options) = listen().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;
        stream.write_all(&greeting("SSH-2.0-OpenSSH_9.6")).await?;
        Ok::<_, anyhow::Error>(())
    });

    let result = TarantoolClient::connect(&options).await;
    assert!(matches!(result, Err(StoreError::Greeting(_))));

    server.await??;
    Ok(())
}
