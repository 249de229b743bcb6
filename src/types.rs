use std::collections::{HashMap, HashSet};
use std::fmt;

/// A unique key for a row.
pub type RowKey = String;

/// A single field value is an opaque binary payload.
pub type FieldValue = Vec<u8>;

/// Field name to value mapping for one row.
pub type Fields = HashMap<String, FieldValue>;

/// Names of the fields a read or scan should return. `None` means all fields.
pub type FieldSet = HashSet<String>;

/// Outcome of a single benchmark operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Error => write!(f, "ERROR"),
        }
    }
}
