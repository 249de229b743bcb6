//! Benchmark properties and the adapter settings read from them.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::de::value::MapDeserializer;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use crate::error::{Error, Result};

pub const HOST_PROPERTY: &str = "tarantool.host";
pub const PORT_PROPERTY: &str = "tarantool.port";
pub const SPACE_PROPERTY: &str = "tarantool.space";
pub const USER_PROPERTY: &str = "tarantool.user";
pub const PASSWORD_PROPERTY: &str = "tarantool.password";
pub const TIMEOUT_PROPERTY: &str = "tarantool.timeout.ms";

/// Flat string properties handed over by the benchmark harness.
pub type Properties = HashMap<String, String>;

/// Connection settings for the Tarantool binding.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdapterConfig {
    #[serde(rename = "tarantool.host", default = "default_host")]
    pub host: String,

    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "tarantool.port", default = "default_port")]
    pub port: u16,

    /// Numeric id of the space holding benchmark rows.
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "tarantool.space", default = "default_space")]
    pub space: u32,

    /// Enables chap-sha1 auth when non-empty. Otherwise the session stays `guest`.
    #[serde(rename = "tarantool.user", default)]
    pub user: String,

    #[serde(rename = "tarantool.password", default)]
    pub password: String,

    /// Socket timeout in milliseconds; 0 blocks indefinitely.
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "tarantool.timeout.ms", default)]
    pub timeout_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            space: default_space(),
            user: String::new(),
            password: String::new(),
            timeout_ms: 0,
        }
    }
}

// --- Defaults ---

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    3303
}
fn default_space() -> u32 {
    1024
}

impl AdapterConfig {
    /// Reads the `tarantool.*` keys; everything else is ignored.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let de = MapDeserializer::<_, serde::de::value::Error>::new(
            props.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        let config = AdapterConfig::deserialize(de).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config(format!("{} must not be empty", HOST_PROPERTY)));
        }
        if self.port == 0 {
            return Err(Error::Config(format!("{} must be > 0", PORT_PROPERTY)));
        }
        if !self.password.is_empty() && self.user.is_empty() {
            return Err(Error::Config(format!(
                "{} requires {}",
                PASSWORD_PROPERTY, USER_PROPERTY
            )));
        }
        Ok(())
    }

    /// `host:port` suitable for `TcpStream::connect`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Login user, if auth is configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        (!self.user.is_empty()).then(|| (self.user.as_str(), self.password.as_str()))
    }
}

/// Parses Java-style `.properties` text. Later keys override earlier ones.
///
/// Follows `java.util.Properties::load`: `#`/`!` comment lines, `=`, `:` or
/// whitespace separators, a line ending in an odd number of backslashes
/// continues on the next one, and `\t`, `\n`, `\r`, `\f`, `\uXXXX` and
/// `\<char>` escapes in keys and values.
pub fn parse_properties(text: &str) -> Properties {
    let mut props = Properties::new();
    let mut logical = String::new();
    let mut continuing = false;

    for raw in text.lines() {
        let line = raw.trim_start_matches(is_blank);
        if !continuing && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
        if trailing % 2 == 1 {
            logical.push_str(&line[..line.len() - 1]);
            continuing = true;
            continue;
        }
        logical.push_str(line);
        continuing = false;

        let (key, value) = split_property(&std::mem::take(&mut logical));
        props.insert(key, value);
    }
    if continuing {
        let (key, value) = split_property(&logical);
        props.insert(key, value);
    }
    props
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\u{c}'
}

fn split_property(line: &str) -> (String, String) {
    let mut key_end = line.len();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || is_blank(c) {
            key_end = i;
            break;
        }
    }

    let rest = line[key_end..].trim_start_matches(is_blank);
    let rest = match rest.strip_prefix(|c: char| c == '=' || c == ':') {
        Some(r) => r.trim_start_matches(is_blank),
        None => rest,
    };
    (unescape(&line[..key_end]), unescape(rest))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    // `\uXXXX` units are buffered so surrogate pairs combine.
    let mut units: Vec<u16> = Vec::new();
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('u') => {
                    let hex: String = chars.clone().take(4).collect();
                    let is_unit = hex.len() == 4 && hex.chars().all(|h| h.is_ascii_hexdigit());
                    if let Some(unit) = is_unit.then(|| u16::from_str_radix(&hex, 16).ok()).flatten() {
                        units.push(unit);
                        chars.nth(3);
                        continue;
                    }
                    flush_units(&mut units, &mut out);
                    out.push('u');
                }
                Some(escaped) => {
                    flush_units(&mut units, &mut out);
                    out.push(match escaped {
                        't' => '\t',
                        'n' => '\n',
                        'r' => '\r',
                        'f' => '\u{c}',
                        other => other,
                    });
                }
                None => flush_units(&mut units, &mut out),
            }
        } else {
            flush_units(&mut units, &mut out);
            out.push(c);
        }
    }
    flush_units(&mut units, &mut out);
    out
}

fn flush_units(units: &mut Vec<u16>, out: &mut String) {
    if !units.is_empty() {
        out.push_str(&String::from_utf16_lossy(units));
        units.clear();
    }
}

/// Loads a `.properties` file from disk.
pub fn load_properties<P: AsRef<Path>>(path: P) -> Result<Properties> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_properties(&text))
}
