//! Variable-length integers for the breakpoint wire format.
//!
//! The encoding is UTF-8 shaped (one to six bytes) and stretched to the full
//! 32-bit range. The line-oriented transport cannot carry the raw bytes `\n`,
//! `\r` and `\x1a`, so those three values are swapped for sentinels at the top
//! of the range before encoding; a multi-byte form never contains them.

use crate::codec::{WireReader, WireWriter};
use crate::error::{Result, WireError};

const ESCAPES: [(u32, u32); 3] = [(10, 0xFFFF_FFFF), (26, 0xFFFF_FFFE), (13, 0xFFFF_FFFD)];

fn escape(v: u32) -> u32 {
    ESCAPES
        .iter()
        .find(|(raw, _)| *raw == v)
        .map_or(v, |(_, sentinel)| *sentinel)
}

fn unescape(v: u32) -> u32 {
    ESCAPES
        .iter()
        .find(|(_, sentinel)| *sentinel == v)
        .map_or(v, |(raw, _)| *raw)
}

pub fn write_varint(w: &mut WireWriter, value: u32) {
    let v = escape(value);
    let (lead, extra): (u8, u32) = match v {
        0..=0x7F => {
            w.write_u8(v as u8);
            return;
        }
        0x80..=0x7FF => (0xC0 | (v >> 6) as u8, 1),
        0x800..=0xFFFF => (0xE0 | (v >> 12) as u8, 2),
        0x1_0000..=0x1F_FFFF => (0xF0 | (v >> 18) as u8, 3),
        0x20_0000..=0x3FF_FFFF => (0xF8 | (v >> 24) as u8, 4),
        _ => (0xFC | (v >> 30) as u8, 5),
    };
    w.write_u8(lead);
    for i in (0..extra).rev() {
        w.write_u8(0x80 | ((v >> (6 * i)) & 0x3F) as u8);
    }
}

pub fn read_varint(r: &mut WireReader<'_>) -> Result<u32> {
    let at = r.position();
    let lead = r.read_u8()?;
    let (mut v, extra) = match lead {
        0x00..=0x7F => return Ok(unescape(u32::from(lead))),
        0xC0..=0xDF => (u32::from(lead & 0x1F), 1),
        0xE0..=0xEF => (u32::from(lead & 0x0F), 2),
        0xF0..=0xF7 => (u32::from(lead & 0x07), 3),
        0xF8..=0xFB => (u32::from(lead & 0x03), 4),
        0xFC..=0xFF => (u32::from(lead & 0x03), 5),
        0x80..=0xBF => return Err(WireError::InvalidVarintLead { byte: lead, at }),
    };
    for _ in 0..extra {
        let at = r.position();
        let byte = r.read_u8()?;
        if byte & 0xC0 != 0x80 {
            return Err(WireError::InvalidVarintContinuation { byte, at });
        }
        v = (v << 6) | u32::from(byte & 0x3F);
    }
    Ok(unescape(v))
}

pub fn encode_varint(value: u32) -> Vec<u8> {
    let mut w = WireWriter::new();
    write_varint(&mut w, value);
    w.into_vec()
}
