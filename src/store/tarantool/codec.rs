//! IPROTO packet encoding and decoding.
//!
//! A packet is a MessagePack unsigned length followed by a header map and a
//! body map. Requests are always written with a 5-byte `0xce` length prefix.

use std::io::Cursor;

use rmpv::Value as Wire;

use crate::store::{Request, StoreError, UpdateOp};
use crate::value::RawValue;

// Request types.
pub const SELECT: u32 = 0x01;
pub const INSERT: u32 = 0x02;
pub const UPDATE: u32 = 0x04;
pub const DELETE: u32 = 0x05;
pub const AUTH: u32 = 0x07;
pub const PING: u32 = 0x40;

// Header keys.
const REQUEST_TYPE: u64 = 0x00;
const SYNC: u64 = 0x01;

// Body keys.
const SPACE_ID: u64 = 0x10;
const INDEX_ID: u64 = 0x11;
const LIMIT: u64 = 0x12;
const OFFSET: u64 = 0x13;
const ITERATOR: u64 = 0x14;
const KEY: u64 = 0x20;
const TUPLE: u64 = 0x21;
const USER_NAME: u64 = 0x23;
const DATA: u64 = 0x30;
const ERROR_MESSAGE: u64 = 0x31;

/// Response type flag marking an error; the low bits carry the error code.
const ERROR_FLAG: u32 = 0x8000;
/// Out-of-band push message, not a reply to any request.
const CHUNK: u32 = 0x80;

const ITERATOR_EQ: u64 = 0;

/// Size of the length prefix written in front of every request.
pub const LENGTH_PREFIX: usize = 5;

/// A decoded response packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub code: u32,
    pub sync: u64,
    body: Vec<(Wire, Wire)>,
}

impl Response {
    /// Whether this packet is a push message rather than a reply.
    pub fn is_push(&self) -> bool {
        self.code == CHUNK
    }

    /// The result tuples, or the server error this response carries.
    pub fn into_data(self) -> Result<Vec<RawValue>, StoreError> {
        if self.code & ERROR_FLAG != 0 {
            let message = self
                .field(ERROR_MESSAGE)
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_string();
            return Err(StoreError::Server {
                code: self.code & !ERROR_FLAG,
                message,
            });
        }

        let data = self
            .body
            .into_iter()
            .find(|(k, _)| k.as_u64() == Some(DATA))
            .map(|(_, v)| v);

        match data {
            Some(Wire::Array(tuples)) => Ok(tuples.into_iter().map(RawValue::from).collect()),
            Some(other) => Err(StoreError::Protocol(format!("response data is not an array: {}", other))),
            None => Ok(Vec::new()),
        }
    }

    fn field(&self, key: u64) -> Option<&Wire> {
        self.body
            .iter()
            .find(|(k, _)| k.as_u64() == Some(key))
            .map(|(_, v)| v)
    }
}

/// Encode a request packet. The body is written by `write_body`.
pub fn encode_packet<F>(code: u32, sync: u64, write_body: F) -> Result<Vec<u8>, StoreError>
where
    F: FnOnce(&mut Vec<u8>) -> Result<(), StoreError>,
{
    let mut buf = vec![0u8; LENGTH_PREFIX];
    rmp::encode::write_map_len(&mut buf, 2).map_err(encode_err)?;
    rmp::encode::write_uint(&mut buf, REQUEST_TYPE).map_err(encode_err)?;
    rmp::encode::write_uint(&mut buf, u64::from(code)).map_err(encode_err)?;
    rmp::encode::write_uint(&mut buf, SYNC).map_err(encode_err)?;
    rmp::encode::write_uint(&mut buf, sync).map_err(encode_err)?;
    write_body(&mut buf)?;

    let len = u32::try_from(buf.len() - LENGTH_PREFIX)
        .map_err(|_| StoreError::Encode("request exceeds 4 GiB".into()))?;
    let mut prefix = Vec::with_capacity(LENGTH_PREFIX);
    prefix.push(0xce);
    prefix.extend_from_slice(&len.to_be_bytes());
    if let Some(head) = buf.get_mut(..LENGTH_PREFIX) {
        head.copy_from_slice(&prefix);
    }
    Ok(buf)
}

/// Encode a data request.
pub fn encode_request(sync: u64, request: &Request) -> Result<Vec<u8>, StoreError> {
    match request {
        Request::Select { target, key } => encode_packet(SELECT, sync, |buf| {
            write_body(
                buf,
                vec![
                    (SPACE_ID, Wire::from(target.space_id)),
                    (INDEX_ID, Wire::from(target.index_id)),
                    (LIMIT, Wire::from(u32::MAX)),
                    (OFFSET, Wire::from(0u32)),
                    (ITERATOR, Wire::from(ITERATOR_EQ)),
                    (KEY, to_wire_tuple(key)),
                ],
            )
        }),
        Request::Insert { space_id, tuple } => encode_packet(INSERT, sync, |buf| {
            write_body(
                buf,
                vec![(SPACE_ID, Wire::from(*space_id)), (TUPLE, to_wire_tuple(tuple))],
            )
        }),
        Request::Update { target, key, ops } => encode_packet(UPDATE, sync, |buf| {
            let ops = ops
                .iter()
                .map(|op| match op {
                    UpdateOp::Assign { field, value } => {
                        Wire::Array(vec![Wire::from("="), Wire::from(*field), to_wire(value)])
                    }
                })
                .collect();
            write_body(
                buf,
                vec![
                    (SPACE_ID, Wire::from(target.space_id)),
                    (INDEX_ID, Wire::from(target.index_id)),
                    (KEY, to_wire_tuple(key)),
                    (TUPLE, Wire::Array(ops)),
                ],
            )
        }),
        Request::Delete { target, key } => encode_packet(DELETE, sync, |buf| {
            write_body(
                buf,
                vec![
                    (SPACE_ID, Wire::from(target.space_id)),
                    (INDEX_ID, Wire::from(target.index_id)),
                    (KEY, to_wire_tuple(key)),
                ],
            )
        }),
    }
}

/// Encode a `chap-sha1` authentication request.
///
/// The scramble is sent as a MessagePack string of raw bytes.
pub fn encode_auth(sync: u64, user: &str, scramble: &[u8]) -> Result<Vec<u8>, StoreError> {
    encode_packet(AUTH, sync, |buf| {
        rmp::encode::write_map_len(buf, 2).map_err(encode_err)?;
        rmp::encode::write_uint(buf, USER_NAME).map_err(encode_err)?;
        rmp::encode::write_str(buf, user).map_err(encode_err)?;
        rmp::encode::write_uint(buf, TUPLE).map_err(encode_err)?;
        rmp::encode::write_array_len(buf, 2).map_err(encode_err)?;
        rmp::encode::write_str(buf, "chap-sha1").map_err(encode_err)?;
        let len = u32::try_from(scramble.len()).map_err(|_| StoreError::Encode("scramble too long".into()))?;
        rmp::encode::write_str_len(buf, len).map_err(encode_err)?;
        buf.extend_from_slice(scramble);
        Ok(())
    })
}

/// Encode a ping.
pub fn encode_ping(sync: u64) -> Result<Vec<u8>, StoreError> {
    encode_packet(PING, sync, |buf| write_body(buf, Vec::new()))
}

/// Decode the header and body of a packet whose length prefix was stripped.
pub fn decode_response(packet: &[u8]) -> Result<Response, StoreError> {
    let mut cursor = Cursor::new(packet);
    let header = rmpv::decode::read_value(&mut cursor).map_err(|e| StoreError::Decode(e.to_string()))?;
    let body = if (cursor.position() as usize) < packet.len() {
        rmpv::decode::read_value(&mut cursor).map_err(|e| StoreError::Decode(e.to_string()))?
    } else {
        Wire::Map(Vec::new())
    };

    let Wire::Map(header) = header else {
        return Err(StoreError::Protocol("response header is not a map".into()));
    };
    let lookup = |key: u64| {
        header
            .iter()
            .find(|(k, _)| k.as_u64() == Some(key))
            .and_then(|(_, v)| v.as_u64())
    };
    let code = lookup(REQUEST_TYPE)
        .and_then(|c| u32::try_from(c).ok())
        .ok_or_else(|| StoreError::Protocol("response header has no type".into()))?;
    let sync = lookup(SYNC).ok_or_else(|| StoreError::Protocol("response header has no sync".into()))?;

    let body = match body {
        Wire::Map(entries) => entries,
        _ => return Err(StoreError::Protocol("response body is not a map".into())),
    };

    Ok(Response { code, sync, body })
}

/// Number of bytes following a length marker, or the length itself when the
/// marker is a positive fixint.
pub enum LengthMarker {
    Immediate(u32),
    Follows(usize),
}

/// Interpret the first byte of a packet length.
pub fn length_marker(byte: u8) -> Result<LengthMarker, StoreError> {
    match byte {
        0x00..=0x7f => Ok(LengthMarker::Immediate(u32::from(byte))),
        0xcc => Ok(LengthMarker::Follows(1)),
        0xcd => Ok(LengthMarker::Follows(2)),
        0xce => Ok(LengthMarker::Follows(4)),
        other => Err(StoreError::Protocol(format!("invalid packet length marker 0x{:02x}", other))),
    }
}

/// Big-endian length from the bytes following a marker.
pub fn length_from(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

fn write_body(buf: &mut Vec<u8>, fields: Vec<(u64, Wire)>) -> Result<(), StoreError> {
    let len = u32::try_from(fields.len()).map_err(|_| StoreError::Encode("too many body fields".into()))?;
    rmp::encode::write_map_len(buf, len).map_err(encode_err)?;
    for (key, value) in fields {
        rmp::encode::write_uint(buf, key).map_err(encode_err)?;
        rmpv::encode::write_value(buf, &value).map_err(encode_err)?;
    }
    Ok(())
}

fn encode_err(err: impl std::fmt::Display) -> StoreError {
    StoreError::Encode(err.to_string())
}

fn to_wire_tuple(fields: &[RawValue]) -> Wire {
    Wire::Array(fields.iter().map(to_wire).collect())
}

/// Lower a value to its MessagePack form.
pub fn to_wire(value: &RawValue) -> Wire {
    match value {
        RawValue::Nil => Wire::Nil,
        RawValue::Bool(b) => Wire::Boolean(*b),
        RawValue::Int(i) => Wire::from(*i),
        RawValue::UInt(u) => Wire::from(*u),
        RawValue::Float(f) => Wire::F64(*f),
        RawValue::String(s) => Wire::from(s.as_str()),
        RawValue::Binary(bytes) => Wire::Binary(bytes.clone()),
        RawValue::Array(items) => Wire::Array(items.iter().map(to_wire).collect()),
        RawValue::Map(entries) => Wire::Map(
            entries
                .iter()
                .map(|(k, v)| (to_wire(k), to_wire(v)))
                .collect(),
        ),
        RawValue::Ext(tag, bytes) => Wire::Ext(*tag, bytes.clone()),
    }
}

impl From<Wire> for RawValue {
    fn from(value: Wire) -> Self {
        match value {
            Wire::Nil => RawValue::Nil,
            Wire::Boolean(b) => RawValue::Bool(b),
            Wire::Integer(i) => match (i.as_u64(), i.as_i64()) {
                (Some(u), _) => RawValue::UInt(u),
                (None, Some(i)) => RawValue::Int(i),
                (None, None) => RawValue::Nil,
            },
            Wire::F32(f) => RawValue::Float(f64::from(f)),
            Wire::F64(f) => RawValue::Float(f),
            // Invalid UTF-8 is kept as a string with replacement characters.
            Wire::String(s) => RawValue::String(
                String::from_utf8(s.into_bytes())
                    .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()),
            ),
            Wire::Binary(bytes) => RawValue::Binary(bytes),
            Wire::Array(items) => RawValue::Array(items.into_iter().map(RawValue::from).collect()),
            Wire::Map(entries) => RawValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (RawValue::from(k), RawValue::from(v)))
                    .collect(),
            ),
            Wire::Ext(tag, bytes) => RawValue::Ext(tag, bytes),
        }
    }
}
