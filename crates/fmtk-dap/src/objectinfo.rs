//! Debug metadata pushed to the target at its first prompt.
//!
//! The description is a JSON document (class name → member properties). It is
//! converted to a tagged tree, serialised, and written in fixed-size pieces,
//! each one base64 encoded inside a long-bracket literal so the stdin line
//! stays free of raw newlines.

use std::path::Path;

use base64::Engine as _;
use fmtk_wire::{block_quote_str, Value};
use indexmap::IndexMap;

use crate::error::{Result, SessionError};

pub fn load(path: Option<&Path>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(Value::dict());
    };
    let bytes = std::fs::read(path).map_err(|source| SessionError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let json: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|source| SessionError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    from_json(&json, "$")
}

pub fn from_json(json: &serde_json::Value, at: &str) -> Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Signed(i)
            } else if let Some(u) = n.as_u64() {
                Value::Unsigned(u)
            } else {
                Value::Number(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::string(s.as_str()),
        serde_json::Value::Array(items) => Value::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| from_json(item, &format!("{at}[{i}]")))
                .collect::<Result<_>>()?,
        ),
        serde_json::Value::Object(map) => {
            let mut dict = IndexMap::with_capacity(map.len());
            for (key, item) in map {
                if key.is_empty() {
                    return Err(SessionError::EmptyObjectInfoKey(at.to_string()));
                }
                dict.insert(key.clone(), from_json(item, &format!("{at}.{key}"))?);
            }
            Value::Dict(dict)
        }
    })
}

/// Stdin lines that transfer `info`, ending with the zero-argument call.
pub fn commands(info: &Value, chunk_bytes: usize) -> Vec<Vec<u8>> {
    let blob = info.to_bytes();
    let engine = base64::engine::general_purpose::STANDARD;
    let mut out: Vec<Vec<u8>> = blob
        .chunks(chunk_bytes.max(1))
        .map(|chunk| {
            let encoded = engine.encode(chunk);
            format!("__DebugAdapter.loadObjectInfo({})\n", block_quote_str(&encoded)).into_bytes()
        })
        .collect();
    out.push(b"__DebugAdapter.loadObjectInfo()\n".to_vec());
    out
}
