//! Tarantool IProto framing.
//!
//! A packet is a MessagePack uint length prefix, a header map and an
//! optional body map. Only the requests the benchmark binding issues are
//! covered here.

use std::io::{Cursor, Read};

use base64::Engine;
use rmp::decode::NumValueReadError;
use rmpv::Value;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// Size of the server greeting sent right after TCP connect.
pub const GREETING_SIZE: usize = 128;
/// Number of salt bytes used by chap-sha1.
pub const SCRAMBLE_SIZE: usize = 20;
/// Upper bound for a single response, guards against garbage length prefixes.
pub const MAX_PACKET_SIZE: usize = 256 * 1024 * 1024;

// Header keys
pub const KEY_CODE: u8 = 0x00;
pub const KEY_SYNC: u8 = 0x01;
pub const KEY_SCHEMA_VERSION: u8 = 0x05;

// Body keys
pub const KEY_SPACE_ID: u8 = 0x10;
pub const KEY_INDEX_ID: u8 = 0x11;
pub const KEY_LIMIT: u8 = 0x12;
pub const KEY_OFFSET: u8 = 0x13;
pub const KEY_ITERATOR: u8 = 0x14;
pub const KEY_KEY: u8 = 0x20;
pub const KEY_TUPLE: u8 = 0x21;
pub const KEY_USER_NAME: u8 = 0x23;
pub const KEY_DATA: u8 = 0x30;
pub const KEY_ERROR: u8 = 0x31;

/// Request type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestCode {
    Select = 1,
    Replace = 3,
    Delete = 5,
    Auth = 7,
    Ping = 64,
}

/// Response codes with this bit set carry an error.
pub const ERROR_FLAG: u32 = 0x8000;

/// Index iterator types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IteratorType {
    Eq = 0,
    Req = 1,
    All = 2,
    Lt = 3,
    Le = 4,
    Ge = 5,
    Gt = 6,
}

/// Parsed server greeting.
#[derive(Debug, Clone)]
pub struct Greeting {
    pub version: String,
    pub salt: Vec<u8>,
}

/// Parses the 128-byte greeting: a version line and a base64 salt line.
pub fn parse_greeting(buf: &[u8]) -> Result<Greeting> {
    if buf.len() != GREETING_SIZE {
        return Err(Error::Protocol(format!(
            "greeting must be {} bytes, got {}",
            GREETING_SIZE,
            buf.len()
        )));
    }
    let (line1, line2) = buf.split_at(GREETING_SIZE / 2);

    let version = String::from_utf8_lossy(line1).trim().to_string();
    if !version.starts_with("Tarantool") {
        return Err(Error::Protocol(format!("unexpected greeting: {:?}", version)));
    }

    let salt_b64 = String::from_utf8_lossy(line2);
    let salt = base64::engine::general_purpose::STANDARD
        .decode(salt_b64.trim())
        .map_err(|e| Error::Protocol(format!("bad greeting salt: {}", e)))?;
    if salt.len() < SCRAMBLE_SIZE {
        return Err(Error::Protocol(format!(
            "greeting salt too short: {} bytes",
            salt.len()
        )));
    }

    Ok(Greeting { version, salt })
}

/// chap-sha1 scramble: `sha1(pw) xor sha1(salt[..20] ++ sha1(sha1(pw)))`.
pub fn scramble(salt: &[u8], password: &str) -> Vec<u8> {
    let step1 = Sha1::digest(password.as_bytes());
    let step2 = Sha1::digest(step1);

    let mut hasher = Sha1::new();
    hasher.update(&salt[..SCRAMBLE_SIZE]);
    hasher.update(step2);
    let step3 = hasher.finalize();

    step1.iter().zip(step3.iter()).map(|(a, b)| a ^ b).collect()
}

fn int_key(key: u8) -> Value {
    Value::from(key)
}

/// Builds a body map from `(key, value)` pairs.
pub fn body(entries: Vec<(u8, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (int_key(k), v)).collect())
}

pub fn select_body(
    space: u32,
    index: u32,
    limit: u32,
    offset: u32,
    iterator: IteratorType,
    key: Vec<Value>,
) -> Value {
    body(vec![
        (KEY_SPACE_ID, Value::from(space)),
        (KEY_INDEX_ID, Value::from(index)),
        (KEY_LIMIT, Value::from(limit)),
        (KEY_OFFSET, Value::from(offset)),
        (KEY_ITERATOR, Value::from(iterator as u8)),
        (KEY_KEY, Value::Array(key)),
    ])
}

pub fn replace_body(space: u32, tuple: Vec<Value>) -> Value {
    body(vec![
        (KEY_SPACE_ID, Value::from(space)),
        (KEY_TUPLE, Value::Array(tuple)),
    ])
}

pub fn delete_body(space: u32, index: u32, key: Vec<Value>) -> Value {
    body(vec![
        (KEY_SPACE_ID, Value::from(space)),
        (KEY_INDEX_ID, Value::from(index)),
        (KEY_KEY, Value::Array(key)),
    ])
}

pub fn auth_body(user: &str, scramble: Vec<u8>) -> Value {
    body(vec![
        (KEY_USER_NAME, Value::from(user)),
        (
            KEY_TUPLE,
            Value::Array(vec![Value::from("chap-sha1"), Value::Binary(scramble)]),
        ),
    ])
}

/// Encodes a complete packet: uint32 length prefix, header, body.
pub fn encode_packet(header: &Value, body: &Value) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    rmpv::encode::write_value(&mut payload, header).map_err(|e| Error::Protocol(e.to_string()))?;
    rmpv::encode::write_value(&mut payload, body).map_err(|e| Error::Protocol(e.to_string()))?;

    let mut packet = Vec::with_capacity(5 + payload.len());
    rmp::encode::write_u32(&mut packet, payload.len() as u32)?;
    packet.extend_from_slice(&payload);
    Ok(packet)
}

pub fn request_header(code: RequestCode, sync: u64) -> Value {
    body(vec![
        (KEY_CODE, Value::from(code as u8)),
        (KEY_SYNC, Value::from(sync)),
    ])
}

/// Reads the MessagePack uint length prefix of the next packet.
pub fn read_length<R: Read>(r: &mut R) -> Result<usize> {
    let len = match rmp::decode::read_int::<u64, _>(r) {
        Ok(len) => len as usize,
        Err(NumValueReadError::InvalidMarkerRead(e)) | Err(NumValueReadError::InvalidDataRead(e)) => {
            return Err(e.into())
        }
        Err(e) => return Err(Error::Protocol(format!("bad length prefix: {}", e))),
    };
    if len > MAX_PACKET_SIZE {
        return Err(Error::Protocol(format!(
            "packet exceeds maximum size of {} bytes",
            MAX_PACKET_SIZE
        )));
    }
    Ok(len)
}

/// Reads one length-prefixed packet and returns its payload.
pub fn read_packet<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = read_length(r)?;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Splits a payload into header and body maps. A missing body decodes as
/// an empty map.
pub fn decode_payload(payload: &[u8]) -> Result<(Value, Value)> {
    let mut cursor = Cursor::new(payload);
    let header = rmpv::decode::read_value(&mut cursor)?;
    let body = if (cursor.position() as usize) < payload.len() {
        rmpv::decode::read_value(&mut cursor)?
    } else {
        Value::Map(Vec::new())
    };
    Ok((header, body))
}

/// Looks up an integer key in a MessagePack map.
pub fn map_get(map: &Value, key: u8) -> Option<&Value> {
    map.as_map()?
        .iter()
        .find(|(k, _)| k.as_u64() == Some(key as u64))
        .map(|(_, v)| v)
}

/// A decoded server response. `result` holds the server's verdict for the
/// request identified by `sync`.
#[derive(Debug)]
pub struct Response {
    pub sync: u64,
    pub result: Result<Vec<Value>>,
}

/// Interprets a response payload. Only a packet without a usable header is
/// an outer error; error codes land in `Response::result` as `Error::Server`.
pub fn parse_response(payload: &[u8]) -> Result<Response> {
    let (header, body) = decode_payload(payload)?;

    let code = map_get(&header, KEY_CODE)
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::Protocol("response header without code".into()))? as u32;
    let sync = map_get(&header, KEY_SYNC)
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::Protocol("response header without sync".into()))?;

    Ok(Response {
        sync,
        result: response_result(code, &body),
    })
}

fn response_result(code: u32, body: &Value) -> Result<Vec<Value>> {
    if code & ERROR_FLAG != 0 {
        let message = map_get(body, KEY_ERROR)
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(Error::Server {
            code: code & !ERROR_FLAG,
            message,
        });
    }
    if code != 0 {
        return Err(Error::Protocol(format!("unexpected response code {:#x}", code)));
    }

    match map_get(body, KEY_DATA) {
        Some(Value::Array(rows)) => Ok(rows.clone()),
        Some(other) => Err(Error::Protocol(format!("response data is not an array: {}", other))),
        None => Ok(Vec::new()),
    }
}
