//! Per-source breakpoint lists as sent to the target's `updateBreakpoints`.
//!
//! Layout: `string(filename) | plain list | complex list`, where each list is a
//! count byte followed by its entries. Strings are `varint(len) | bytes`.

use crate::codec::{WireReader, WireWriter};
use crate::error::{Result, WireError};
use crate::varint::{read_varint, write_varint};

const FLAG_CONDITION: u8 = 1;
const FLAG_HIT_CONDITION: u8 = 2;
const FLAG_LOG_MESSAGE: u8 = 4;

/// Count byte shortcuts. They mirror the varint escapes so that a count byte
/// can never be a raw `\n`, `\x1a` or `\r`.
const COUNT_SHORTCUTS: [(usize, u8); 4] = [(0, 0xFF), (10, 0xFE), (26, 0xFD), (13, 0xFC)];

/// Largest count that fits in a literal count byte without colliding with a
/// shortcut.
pub const MAX_LIST_LEN: usize = 0xFB;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireBreakpoint {
    pub line: u32,
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
    pub log_message: Option<String>,
}

impl WireBreakpoint {
    pub fn at(line: u32) -> Self {
        Self {
            line,
            ..Self::default()
        }
    }

    pub fn is_plain(&self) -> bool {
        self.condition.is_none() && self.hit_condition.is_none() && self.log_message.is_none()
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.condition.is_some() {
            flags |= FLAG_CONDITION;
        }
        if self.hit_condition.is_some() {
            flags |= FLAG_HIT_CONDITION;
        }
        if self.log_message.is_some() {
            flags |= FLAG_LOG_MESSAGE;
        }
        flags
    }
}

/// All breakpoints for one target-side file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBreakpoints {
    pub filename: String,
    pub breakpoints: Vec<WireBreakpoint>,
}

impl SourceBreakpoints {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let (plain, complex): (Vec<_>, Vec<_>) =
            self.breakpoints.iter().partition(|bp| bp.is_plain());

        let mut w = WireWriter::new();
        write_string(&mut w, self.filename.as_bytes());

        w.write_u8(count_byte(plain.len())?);
        for bp in plain {
            write_varint(&mut w, bp.line);
        }

        w.write_u8(count_byte(complex.len())?);
        for bp in complex {
            write_varint(&mut w, bp.line);
            w.write_u8(bp.flags());
            for field in [&bp.condition, &bp.hit_condition, &bp.log_message]
                .into_iter()
                .flatten()
            {
                write_string(&mut w, collapse_newlines(field).as_bytes());
            }
        }

        Ok(w.into_vec())
    }

    /// Plain breakpoints come back first, followed by the complex ones.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(bytes);
        let filename = String::from_utf8_lossy(read_string(&mut r)?).into_owned();

        let mut breakpoints = Vec::new();
        let plain = read_count(&mut r)?;
        for _ in 0..plain {
            breakpoints.push(WireBreakpoint::at(read_varint(&mut r)?));
        }

        let complex = read_count(&mut r)?;
        for _ in 0..complex {
            let line = read_varint(&mut r)?;
            let flags = r.read_u8()?;
            if flags & !(FLAG_CONDITION | FLAG_HIT_CONDITION | FLAG_LOG_MESSAGE) != 0 {
                return Err(WireError::UnknownBreakpointFlags(flags));
            }
            let mut field = |bit: u8| -> Result<Option<String>> {
                if flags & bit == 0 {
                    return Ok(None);
                }
                Ok(Some(String::from_utf8_lossy(read_string(&mut r)?).into_owned()))
            };
            let condition = field(FLAG_CONDITION)?;
            let hit_condition = field(FLAG_HIT_CONDITION)?;
            let log_message = field(FLAG_LOG_MESSAGE)?;
            breakpoints.push(WireBreakpoint {
                line,
                condition,
                hit_condition,
                log_message,
            });
        }
        r.finish()?;

        Ok(Self {
            filename,
            breakpoints,
        })
    }
}

fn count_byte(len: usize) -> Result<u8> {
    if let Some((_, byte)) = COUNT_SHORTCUTS.iter().find(|(n, _)| *n == len) {
        return Ok(*byte);
    }
    if len > MAX_LIST_LEN {
        return Err(WireError::ListTooLong(len));
    }
    Ok(len as u8)
}

fn read_count(r: &mut WireReader<'_>) -> Result<usize> {
    let byte = r.read_u8()?;
    Ok(COUNT_SHORTCUTS
        .iter()
        .find(|(_, b)| *b == byte)
        .map_or(usize::from(byte), |(n, _)| *n))
}

fn write_string(w: &mut WireWriter, bytes: &[u8]) {
    write_varint(w, bytes.len() as u32);
    w.write_bytes(bytes);
}

fn read_string<'a>(r: &mut WireReader<'a>) -> Result<&'a [u8]> {
    let len = read_varint(r)? as usize;
    r.read_bytes(len)
}

/// Replace each run of line breaks with one space.
pub fn collapse_newlines(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_break = false;
    for ch in s.chars() {
        if ch == '\n' || ch == '\r' {
            if !in_break {
                out.push(' ');
            }
            in_break = true;
        } else {
            out.push(ch);
            in_break = false;
        }
    }
    out
}
