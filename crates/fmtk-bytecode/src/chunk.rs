//! Precompiled chunk container: header plus a tree of function prototypes.

use crate::error::{BytecodeError, Result};
use crate::instruction::Instruction;
use crate::reader::Reader;

pub const SIGNATURE: &[u8; 4] = b"\x1bLua";
pub const TAIL: &[u8; 6] = b"\x19\x93\r\n\x1a\n";
pub const HEADER_LEN: usize = 18;

/// `(field, expected)` for each configuration byte after the signature.
const HEADER_FIELDS: [(&str, u8); 8] = [
    ("version", 0x52),
    ("format", 0),
    ("endianness", 1),
    ("int size", 4),
    ("size_t size", 8),
    ("instruction size", 4),
    ("number size", 8),
    ("integral flag", 0),
];

const TNIL: u8 = 0;
const TBOOLEAN: u8 = 1;
const TNUMBER: u8 = 3;
const TSTRING: u8 = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Nil,
    Boolean(bool),
    Number(f64),
    String(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDesc {
    pub in_stack: bool,
    pub index: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
    pub name: String,
    /// First instruction where the variable is live.
    pub start_pc: u32,
    /// First instruction where it is dead again.
    pub end_pc: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub source: Option<String>,
    pub line_defined: u32,
    pub last_line_defined: u32,
    pub num_params: u8,
    pub is_vararg: u8,
    pub max_stack_size: u8,
    pub code: Vec<Instruction>,
    pub constants: Vec<Constant>,
    pub protos: Vec<Prototype>,
    pub upvalues: Vec<UpvalueDesc>,
    /// One line per instruction, or empty when debug info was stripped.
    pub line_info: Vec<u32>,
    pub locals: Vec<LocalVar>,
    pub upvalue_names: Vec<String>,
    /// First address in the flat instruction space, once rebased.
    pub base: Option<u32>,
}

impl Prototype {
    /// Name of the `reg`-th register at `pc`, when a local occupies it.
    ///
    /// Active locals are allocated to registers in declaration order, so the
    /// n-th local live at `pc` is register n.
    pub fn local_name(&self, reg: u32, pc: u32) -> Option<&str> {
        self.locals
            .iter()
            .filter(|local| local.start_pc <= pc && pc < local.end_pc)
            .nth(reg as usize)
            .map(|local| local.name.as_str())
    }

    pub fn line_at(&self, pc: u32) -> Option<u32> {
        self.line_info.get(pc as usize).copied()
    }

    /// Number of instructions in this prototype and all nested ones.
    pub fn total_instructions(&self) -> u32 {
        let nested: u32 = self.protos.iter().map(Prototype::total_instructions).sum();
        self.code.len() as u32 + nested
    }

    /// Assign base addresses depth-first in declaration order, starting at
    /// `base`. Returns the next free address.
    pub(crate) fn rebase(&mut self, base: u32) -> u32 {
        self.base = Some(base);
        let mut next = base.saturating_add(u32::try_from(self.code.len()).unwrap_or(u32::MAX));
        for proto in &mut self.protos {
            next = proto.rebase(next);
        }
        next
    }

    /// Visit this prototype and every nested one in rebase order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Prototype)) {
        f(self);
        for proto in &self.protos {
            proto.walk(f);
        }
    }

    fn parse(r: &mut Reader<'_>) -> Result<Self> {
        let line_defined = r.int()?.max(0) as u32;
        let last_line_defined = r.int()?.max(0) as u32;
        let num_params = r.u8()?;
        let is_vararg = r.u8()?;
        let max_stack_size = r.u8()?;

        let n = r.count()?;
        let mut code = Vec::with_capacity(n);
        for _ in 0..n {
            code.push(Instruction(r.u32()?));
        }

        let n = r.count()?;
        let mut constants = Vec::with_capacity(n);
        for _ in 0..n {
            constants.push(match r.u8()? {
                TNIL => Constant::Nil,
                TBOOLEAN => Constant::Boolean(r.u8()? != 0),
                TNUMBER => Constant::Number(r.f64()?),
                TSTRING => Constant::String(r.string()?.unwrap_or_default()),
                other => return Err(BytecodeError::UnknownConstant(other)),
            });
        }

        let n = r.count()?;
        let mut protos = Vec::with_capacity(n);
        for _ in 0..n {
            protos.push(Prototype::parse(r)?);
        }

        let n = r.count()?;
        let mut upvalues = Vec::with_capacity(n);
        for _ in 0..n {
            upvalues.push(UpvalueDesc {
                in_stack: r.u8()? != 0,
                index: r.u8()?,
            });
        }

        let source = r.string()?.map(lossy);

        let n = r.count()?;
        if n != 0 && n != code.len() {
            return Err(BytecodeError::LineCountMismatch {
                instructions: code.len(),
                lines: n,
            });
        }
        let mut line_info = Vec::with_capacity(n);
        for _ in 0..n {
            line_info.push(r.int()?.max(0) as u32);
        }

        let n = r.count()?;
        let mut locals = Vec::with_capacity(n);
        for _ in 0..n {
            let name = r.string()?.map(lossy).unwrap_or_default();
            let start_pc = r.int()?.max(0) as u32;
            let end_pc = r.int()?.max(0) as u32;
            locals.push(LocalVar {
                name,
                start_pc,
                end_pc,
            });
        }

        let n = r.count()?;
        let mut upvalue_names = Vec::with_capacity(n);
        for _ in 0..n {
            upvalue_names.push(r.string()?.map(lossy).unwrap_or_default());
        }

        Ok(Self {
            source,
            line_defined,
            last_line_defined,
            num_params,
            is_vararg,
            max_stack_size,
            code,
            constants,
            protos,
            upvalues,
            line_info,
            locals,
            upvalue_names,
            base: None,
        })
    }

    fn dump(&self, out: &mut Vec<u8>) {
        let int = |out: &mut Vec<u8>, v: u32| out.extend_from_slice(&v.to_le_bytes());

        int(out, self.line_defined);
        int(out, self.last_line_defined);
        out.extend_from_slice(&[self.num_params, self.is_vararg, self.max_stack_size]);

        int(out, self.code.len() as u32);
        for ins in &self.code {
            int(out, ins.0);
        }

        int(out, self.constants.len() as u32);
        for constant in &self.constants {
            match constant {
                Constant::Nil => out.push(TNIL),
                Constant::Boolean(b) => out.extend_from_slice(&[TBOOLEAN, u8::from(*b)]),
                Constant::Number(n) => {
                    out.push(TNUMBER);
                    out.extend_from_slice(&n.to_le_bytes());
                }
                Constant::String(s) => {
                    out.push(TSTRING);
                    dump_string(out, Some(s));
                }
            }
        }

        int(out, self.protos.len() as u32);
        for proto in &self.protos {
            proto.dump(out);
        }

        int(out, self.upvalues.len() as u32);
        for upvalue in &self.upvalues {
            out.extend_from_slice(&[u8::from(upvalue.in_stack), upvalue.index]);
        }

        dump_string(out, self.source.as_ref().map(|s| s.as_bytes()));
        int(out, self.line_info.len() as u32);
        for line in &self.line_info {
            int(out, *line);
        }
        int(out, self.locals.len() as u32);
        for local in &self.locals {
            dump_string(out, Some(local.name.as_bytes()));
            int(out, local.start_pc);
            int(out, local.end_pc);
        }
        int(out, self.upvalue_names.len() as u32);
        for name in &self.upvalue_names {
            dump_string(out, Some(name.as_bytes()));
        }
    }
}

impl Default for Prototype {
    fn default() -> Self {
        Self {
            source: None,
            line_defined: 0,
            last_line_defined: 0,
            num_params: 0,
            is_vararg: 0,
            max_stack_size: 2,
            code: Vec::new(),
            constants: Vec::new(),
            protos: Vec::new(),
            upvalues: Vec::new(),
            line_info: Vec::new(),
            locals: Vec::new(),
            upvalue_names: Vec::new(),
            base: None,
        }
    }
}

/// A parsed chunk: the main function and everything nested inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub main: Prototype,
}

impl Chunk {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        check_header(r.bytes(HEADER_LEN).map_err(|_| BytecodeError::BadSignature)?)?;
        let main = Prototype::parse(&mut r)?;
        if r.remaining() != 0 {
            return Err(BytecodeError::TrailingBytes(r.remaining()));
        }
        Ok(Self { main })
    }

    /// Serialise back into the precompiled format.
    pub fn dump(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(SIGNATURE);
        out.extend(HEADER_FIELDS.iter().map(|(_, expected)| *expected));
        out.extend_from_slice(TAIL);
        self.main.dump(&mut out);
        out
    }

    pub fn source(&self) -> Option<&str> {
        self.main.source.as_deref()
    }

    /// See [`Prototype::rebase`].
    pub fn rebase(&mut self, base: u32) -> u32 {
        self.main.rebase(base)
    }
}

fn check_header(header: &[u8]) -> Result<()> {
    if &header[..4] != SIGNATURE {
        return Err(BytecodeError::BadSignature);
    }
    for (i, (field, expected)) in HEADER_FIELDS.iter().enumerate() {
        let found = header[4 + i];
        if found != *expected {
            return Err(BytecodeError::UnsupportedHeader {
                field: *field,
                expected: *expected,
                found,
            });
        }
    }
    if &header[12..] != TAIL {
        return Err(BytecodeError::BadTail);
    }
    Ok(())
}

fn dump_string(out: &mut Vec<u8>, s: Option<&[u8]>) {
    match s {
        None => out.extend_from_slice(&0u64.to_le_bytes()),
        Some(s) => {
            out.extend_from_slice(&(s.len() as u64 + 1).to_le_bytes());
            out.extend_from_slice(s);
            out.push(0);
        }
    }
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::OpCode;

    fn sample() -> Chunk {
        let inner = Prototype {
            source: Some("@inner".to_string()),
            line_defined: 3,
            last_line_defined: 5,
            code: vec![Instruction::abc(OpCode::Return, 0, 1, 0)],
            line_info: vec![5],
            ..Prototype::default()
        };
        Chunk {
            main: Prototype {
                source: Some("@__foo__/control.lua".to_string()),
                is_vararg: 1,
                code: vec![
                    Instruction::abx(OpCode::LoadK, 0, 0),
                    Instruction::abx(OpCode::Closure, 1, 0),
                    Instruction::abc(OpCode::Return, 0, 1, 0),
                ],
                constants: vec![
                    Constant::Nil,
                    Constant::Boolean(true),
                    Constant::Number(4.5),
                    Constant::String(b"hello".to_vec()),
                ],
                protos: vec![inner],
                upvalues: vec![UpvalueDesc {
                    in_stack: true,
                    index: 0,
                }],
                line_info: vec![1, 5, 6],
                locals: vec![LocalVar {
                    name: "x".to_string(),
                    start_pc: 1,
                    end_pc: 3,
                }],
                upvalue_names: vec!["_ENV".to_string()],
                ..Prototype::default()
            },
        }
    }

    #[test]
    fn parses_what_it_dumps() {
        let chunk = sample();
        let bytes = chunk.dump();
        assert_eq!(
            &bytes[..HEADER_LEN],
            b"\x1bLua\x52\x00\x01\x04\x08\x04\x08\x00\x19\x93\r\n\x1a\n"
        );
        assert_eq!(Chunk::parse(&bytes).unwrap(), chunk);
    }

    #[test]
    fn header_mismatch_is_fatal() {
        let mut bytes = sample().dump();
        bytes[4] = 0x51;
        assert_eq!(
            Chunk::parse(&bytes).unwrap_err(),
            BytecodeError::UnsupportedHeader {
                field: "version",
                expected: 0x52,
                found: 0x51
            }
        );

        let mut bytes = sample().dump();
        bytes[17] = b'x';
        assert_eq!(Chunk::parse(&bytes).unwrap_err(), BytecodeError::BadTail);

        assert_eq!(Chunk::parse(b"print(1)").unwrap_err(), BytecodeError::BadSignature);
    }

    #[test]
    fn line_count_mismatch_is_fatal() {
        let mut chunk = sample();
        chunk.main.line_info.pop();
        assert_eq!(
            Chunk::parse(&chunk.dump()).unwrap_err(),
            BytecodeError::LineCountMismatch {
                instructions: 3,
                lines: 2
            }
        );
    }

    #[test]
    fn stripped_line_info_is_accepted() {
        let mut chunk = sample();
        chunk.main.line_info.clear();
        assert!(Chunk::parse(&chunk.dump()).unwrap().main.line_info.is_empty());
    }

    #[test]
    fn truncated_chunk_reports_eof() {
        let bytes = sample().dump();
        assert!(matches!(
            Chunk::parse(&bytes[..bytes.len() - 3]),
            Err(BytecodeError::UnexpectedEof { .. }) | Err(BytecodeError::BadCount(_))
        ));
    }

    #[test]
    fn rebase_is_depth_first() {
        let mut chunk = sample();
        assert_eq!(chunk.main.total_instructions(), 4);
        assert_eq!(chunk.rebase(10), 14);
        assert_eq!(chunk.main.base, Some(10));
        assert_eq!(chunk.main.protos[0].base, Some(13));
    }

    #[test]
    fn local_names_follow_live_ranges() {
        let chunk = sample();
        assert_eq!(chunk.main.local_name(0, 0), None);
        assert_eq!(chunk.main.local_name(0, 1), Some("x"));
        assert_eq!(chunk.main.local_name(0, 3), None);
        assert_eq!(chunk.main.local_name(1, 1), None);
    }
}
