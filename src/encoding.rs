use rmpv::Value;

use crate::error::{Error, Result};
use crate::{FieldSet, Fields};

/// Encodes a key and its fields into a tuple `[key, name1, value1, name2, value2, ...]`.
pub fn encode_row(key: &str, fields: &Fields) -> Vec<Value> {
    let mut tuple = Vec::with_capacity(1 + fields.len() * 2);
    tuple.push(Value::from(key));
    for (name, value) in fields {
        tuple.push(Value::from(name.as_str()));
        tuple.push(Value::Binary(value.clone()));
    }
    tuple
}

/// Decodes a tuple into `out`, keeping only `requested` fields when given.
/// Field 0 (the key) is skipped.
pub fn decode_row(tuple: &Value, requested: Option<&FieldSet>, out: &mut Fields) -> Result<()> {
    let items = tuple
        .as_array()
        .ok_or_else(|| Error::Decode(format!("tuple is not an array: {}", tuple)))?;

    let mut i = 1;
    while i < items.len() {
        let name = items[i]
            .as_str()
            .ok_or_else(|| Error::Decode(format!("field {} name is not a string", i)))?;
        let value = items
            .get(i + 1)
            .ok_or_else(|| Error::Decode(format!("field {:?} has no value", name)))?;

        if requested.map_or(true, |set| set.contains(name)) {
            out.insert(name.to_string(), value_bytes(value, name)?);
        }
        i += 2;
    }
    Ok(())
}

fn value_bytes(value: &Value, name: &str) -> Result<Vec<u8>> {
    match value {
        Value::Binary(bytes) => Ok(bytes.clone()),
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        other => Err(Error::Decode(format!(
            "field {:?} holds {} instead of bytes",
            name, other
        ))),
    }
}
