//! In-process stand-in for a Tarantool instance.
//!
//! Serves the IProto subset the binding uses against a single memtx-like
//! space kept in a `BTreeMap`, so key order matches a TREE primary index.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use base64::Engine;
use dexter_tarantool_bench::iproto::{self, IteratorType, RequestCode};
use dexter_tarantool_bench::{Error, Properties};
use rmpv::Value;

pub const SPACE: u32 = 1024;
const SALT: [u8; 32] = *b"0123456789abcdefghijklmnopqrstuv";

#[derive(Clone, Default)]
pub struct MockOptions {
    /// When set, requests other than auth/ping fail until the session authenticates.
    pub credentials: Option<(String, String)>,
    /// Return every matched tuple twice, as a broken non-unique index would.
    pub duplicate_rows: bool,
    /// Sleep this long before answering the first request of each session.
    pub first_reply_delay: Option<Duration>,
    /// Hang up on the request that follows this many answered ones.
    pub drop_after_requests: Option<usize>,
}

pub struct MockTarantool {
    pub addr: SocketAddr,
    rows: Arc<Mutex<BTreeMap<String, Vec<Value>>>>,
}

impl MockTarantool {
    pub fn start() -> Self {
        Self::with_options(MockOptions::default())
    }

    pub fn with_options(opts: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let rows = Arc::new(Mutex::new(BTreeMap::new()));

        let shared = rows.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let rows = shared.clone();
                let opts = opts.clone();
                thread::spawn(move || {
                    let _ = serve(stream, rows, opts);
                });
            }
        });

        MockTarantool { addr, rows }
    }

    /// Harness properties pointing at this server.
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("tarantool.host".into(), self.addr.ip().to_string());
        props.insert("tarantool.port".into(), self.addr.port().to_string());
        props.insert("tarantool.space".into(), SPACE.to_string());
        props.insert("tarantool.timeout.ms".into(), "5000".into());
        props
    }

    /// Stores a raw tuple, bypassing the binding.
    pub fn put_raw(&self, tuple: Vec<Value>) {
        let key = tuple_key(&tuple).unwrap().to_string();
        self.rows.lock().unwrap().insert(key, tuple);
    }

    pub fn get_raw(&self, key: &str) -> Option<Vec<Value>> {
        self.rows.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

/// An address nothing listens on.
pub fn closed_port_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn greeting() -> Vec<u8> {
    let mut buf = vec![b' '; iproto::GREETING_SIZE];
    let line1 = b"Tarantool 2.11.1 (Binary) 00000000-0000-0000-0000-000000000000";
    buf[..line1.len()].copy_from_slice(line1);
    buf[63] = b'\n';
    let salt = base64::engine::general_purpose::STANDARD.encode(SALT);
    buf[64..64 + salt.len()].copy_from_slice(salt.as_bytes());
    buf[127] = b'\n';
    buf
}

fn tuple_key(tuple: &[Value]) -> Option<&str> {
    tuple.first().and_then(Value::as_str)
}

fn request_code(code: u64) -> Option<RequestCode> {
    match code {
        1 => Some(RequestCode::Select),
        3 => Some(RequestCode::Replace),
        5 => Some(RequestCode::Delete),
        7 => Some(RequestCode::Auth),
        64 => Some(RequestCode::Ping),
        _ => None,
    }
}

fn iterator_type(it: u64) -> Option<IteratorType> {
    match it {
        0 => Some(IteratorType::Eq),
        1 => Some(IteratorType::Req),
        2 => Some(IteratorType::All),
        3 => Some(IteratorType::Lt),
        4 => Some(IteratorType::Le),
        5 => Some(IteratorType::Ge),
        6 => Some(IteratorType::Gt),
        _ => None,
    }
}

fn serve(
    stream: TcpStream,
    rows: Arc<Mutex<BTreeMap<String, Vec<Value>>>>,
    opts: MockOptions,
) -> Result<(), Error> {
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    writer.write_all(&greeting())?;

    let mut authenticated = opts.credentials.is_none();
    let mut answered = 0usize;
    loop {
        let payload = iproto::read_packet(&mut reader)?;
        if opts.drop_after_requests == Some(answered) {
            return Ok(());
        }
        let (header, body) = iproto::decode_payload(&payload)?;
        let sync = iproto::map_get(&header, iproto::KEY_SYNC)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let code = iproto::map_get(&header, iproto::KEY_CODE)
            .and_then(Value::as_u64)
            .and_then(request_code);

        let result = match code {
            Some(RequestCode::Ping) => Ok(Vec::new()),
            Some(RequestCode::Auth) => match check_auth(&body, &opts) {
                Ok(()) => {
                    authenticated = true;
                    Ok(Vec::new())
                }
                Err(e) => Err(e),
            },
            Some(_) if !authenticated => Err((42, "Read access to space denied for user 'guest'".to_string())),
            Some(RequestCode::Select) => select(&body, &rows, opts.duplicate_rows),
            Some(RequestCode::Replace) => replace(&body, &rows),
            Some(RequestCode::Delete) => delete(&body, &rows),
            None => Err((48, "Unknown request type".to_string())),
        };

        if answered == 0 {
            if let Some(delay) = opts.first_reply_delay {
                thread::sleep(delay);
            }
        }
        writer.write_all(&respond(sync, result)?)?;
        answered += 1;
    }
}

type Reply = Result<Vec<Value>, (u32, String)>;

fn respond(sync: u64, result: Reply) -> Result<Vec<u8>, Error> {
    let (code, body) = match result {
        Ok(data) => (0, iproto::body(vec![(iproto::KEY_DATA, Value::Array(data))])),
        Err((errcode, msg)) => (
            iproto::ERROR_FLAG | errcode,
            iproto::body(vec![(iproto::KEY_ERROR, Value::from(msg))]),
        ),
    };
    let header = iproto::body(vec![
        (iproto::KEY_CODE, Value::from(code)),
        (iproto::KEY_SYNC, Value::from(sync)),
        (iproto::KEY_SCHEMA_VERSION, Value::from(80u32)),
    ]);
    iproto::encode_packet(&header, &body)
}

fn check_auth(body: &Value, opts: &MockOptions) -> Result<(), (u32, String)> {
    let user = iproto::map_get(body, iproto::KEY_USER_NAME)
        .and_then(Value::as_str)
        .unwrap_or_default();
    let scramble = iproto::map_get(body, iproto::KEY_TUPLE)
        .and_then(Value::as_array)
        .and_then(|t| t.get(1))
        .and_then(Value::as_slice)
        .unwrap_or_default();

    match &opts.credentials {
        Some((u, p)) if u == user && iproto::scramble(&SALT, p) == scramble => Ok(()),
        _ => Err((47, format!("Incorrect password supplied for user '{}'", user))),
    }
}

fn check_space(body: &Value) -> Result<(), (u32, String)> {
    let space = iproto::map_get(body, iproto::KEY_SPACE_ID).and_then(Value::as_u64);
    if space != Some(SPACE as u64) {
        return Err((36, format!("Space '{}' does not exist", space.unwrap_or(0))));
    }
    Ok(())
}

fn key_of(body: &Value) -> Option<String> {
    iproto::map_get(body, iproto::KEY_KEY)
        .and_then(Value::as_array)
        .and_then(|k| k.first())
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn select(body: &Value, rows: &Mutex<BTreeMap<String, Vec<Value>>>, duplicate: bool) -> Reply {
    check_space(body)?;
    let limit = iproto::map_get(body, iproto::KEY_LIMIT)
        .and_then(Value::as_u64)
        .unwrap_or(u64::MAX) as usize;
    let offset = iproto::map_get(body, iproto::KEY_OFFSET)
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;
    let iterator = iproto::map_get(body, iproto::KEY_ITERATOR)
        .and_then(Value::as_u64)
        .and_then(iterator_type)
        .unwrap_or(IteratorType::Eq);
    let key = key_of(body);

    let rows = rows.lock().unwrap();
    let matched: Vec<Vec<Value>> = match (iterator, key) {
        (IteratorType::Eq, Some(k)) => rows.get(&k).cloned().into_iter().collect(),
        (IteratorType::Ge, Some(k)) => rows.range(k..).map(|(_, t)| t.clone()).collect(),
        (IteratorType::All, _) | (IteratorType::Ge, None) | (IteratorType::Eq, None) => {
            rows.values().cloned().collect()
        }
        (other, _) => return Err((0, format!("iterator {:?} not supported", other))),
    };

    let mut out = Vec::new();
    for tuple in matched.into_iter().skip(offset) {
        if duplicate {
            out.push(Value::Array(tuple.clone()));
        }
        out.push(Value::Array(tuple));
    }
    out.truncate(limit);
    Ok(out)
}

fn replace(body: &Value, rows: &Mutex<BTreeMap<String, Vec<Value>>>) -> Reply {
    check_space(body)?;
    let tuple = iproto::map_get(body, iproto::KEY_TUPLE)
        .and_then(Value::as_array)
        .cloned()
        .ok_or((1, "Tuple is missing".to_string()))?;
    let key = tuple_key(&tuple)
        .ok_or((23, "Tuple field 1 type does not match one required by operation: expected string".to_string()))?
        .to_string();
    rows.lock().unwrap().insert(key, tuple.clone());
    Ok(vec![Value::Array(tuple)])
}

fn delete(body: &Value, rows: &Mutex<BTreeMap<String, Vec<Value>>>) -> Reply {
    check_space(body)?;
    let key = key_of(body).ok_or((19, "Invalid key part count".to_string()))?;
    Ok(rows
        .lock()
        .unwrap()
        .remove(&key)
        .map(Value::Array)
        .into_iter()
        .collect())
}
