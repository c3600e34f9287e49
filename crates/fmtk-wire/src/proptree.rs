//! The game's self-describing binary tree format.
//!
//! Every value starts with a type tag byte and an "any type" byte (ignored on
//! load, written as 0). Strings carry a leading is-empty flag; non-empty
//! strings follow with a space-optimised length (one byte, or `0xFF` and a
//! `u32`). Lists and dictionaries are a `u32` count of `(key, value)` pairs;
//! list keys are empty strings.

use indexmap::IndexMap;

use crate::codec::{WireReader, WireWriter};
use crate::error::{Result, WireError};

const TAG_NONE: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_LIST: u8 = 4;
const TAG_DICT: u8 = 5;
const TAG_SIGNED: u8 = 6;
const TAG_UNSIGNED: u8 = 7;

/// Deepest list/dictionary nesting accepted on load.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Number(f64),
    String(Vec<u8>),
    List(Vec<Value>),
    /// Keys are non-empty and unique; insertion order is preserved on save.
    Dict(IndexMap<String, Value>),
    Signed(i64),
    Unsigned(u64),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into().into_bytes())
    }

    pub fn dict() -> Self {
        Self::Dict(IndexMap::new())
    }

    pub fn as_dict(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Dict(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        match self {
            Self::Dict(map) => Some(map),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict()?.get(key)
    }

    /// Decode exactly one value spanning all of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(bytes);
        let value = Self::load(&mut r)?;
        r.finish()?;
        Ok(value)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        self.save(&mut w);
        w.into_vec()
    }

    pub fn load(r: &mut WireReader<'_>) -> Result<Self> {
        Self::load_nested(r, 0)
    }

    fn load_nested(r: &mut WireReader<'_>, depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(WireError::TooDeep(MAX_DEPTH));
        }
        let tag = r.read_u8()?;
        let _any_type = r.read_u8()?;
        Ok(match tag {
            TAG_NONE => Self::None,
            TAG_BOOL => Self::Bool(r.read_bool()?),
            TAG_NUMBER => Self::Number(r.read_f64()?),
            TAG_STRING => Self::String(read_string(r)?),
            TAG_LIST => {
                let count = r.read_u32()?;
                let mut items = Vec::new();
                for _ in 0..count {
                    let _key = read_string(r)?;
                    items.push(Self::load_nested(r, depth + 1)?);
                }
                Self::List(items)
            }
            TAG_DICT => {
                let count = r.read_u32()?;
                let mut map = IndexMap::new();
                for _ in 0..count {
                    let key = read_string(r)?;
                    if key.is_empty() {
                        return Err(WireError::EmptyKey);
                    }
                    let key = String::from_utf8(key).map_err(|_| WireError::InvalidKey)?;
                    let value = Self::load_nested(r, depth + 1)?;
                    if map.contains_key(&key) {
                        return Err(WireError::DuplicateKey(key));
                    }
                    map.insert(key, value);
                }
                Self::Dict(map)
            }
            TAG_SIGNED => Self::Signed(r.read_i64()?),
            TAG_UNSIGNED => Self::Unsigned(r.read_u64()?),
            other => return Err(WireError::UnknownTypeTag(other)),
        })
    }

    pub fn save(&self, w: &mut WireWriter) {
        w.write_u8(self.tag());
        w.write_u8(0);
        match self {
            Self::None => {}
            Self::Bool(v) => w.write_bool(*v),
            Self::Number(v) => w.write_f64(*v),
            Self::String(bytes) => write_string(w, bytes),
            Self::List(items) => {
                w.write_u32(items.len() as u32);
                for item in items {
                    write_string(w, b"");
                    item.save(w);
                }
            }
            Self::Dict(map) => {
                w.write_u32(map.len() as u32);
                for (key, value) in map {
                    write_string(w, key.as_bytes());
                    value.save(w);
                }
            }
            Self::Signed(v) => w.write_i64(*v),
            Self::Unsigned(v) => w.write_u64(*v),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Self::None => TAG_NONE,
            Self::Bool(_) => TAG_BOOL,
            Self::Number(_) => TAG_NUMBER,
            Self::String(_) => TAG_STRING,
            Self::List(_) => TAG_LIST,
            Self::Dict(_) => TAG_DICT,
            Self::Signed(_) => TAG_SIGNED,
            Self::Unsigned(_) => TAG_UNSIGNED,
        }
    }
}

fn read_string(r: &mut WireReader<'_>) -> Result<Vec<u8>> {
    if r.read_bool()? {
        return Ok(Vec::new());
    }
    let len = match r.read_u8()? {
        0xFF => r.read_u32()? as usize,
        short => usize::from(short),
    };
    Ok(r.read_bytes(len)?.to_vec())
}

fn write_string(w: &mut WireWriter, bytes: &[u8]) {
    if bytes.is_empty() {
        w.write_bool(true);
        return;
    }
    w.write_bool(false);
    if bytes.len() < 0xFF {
        w.write_u8(bytes.len() as u8);
    } else {
        w.write_u8(0xFF);
        w.write_u32(bytes.len() as u32);
    }
    w.write_bytes(bytes);
}
