//! Flat instruction address space shared by every loaded chunk.
//!
//! Chunks are rebased as they are registered: the first one starts at
//! [`FIRST_ADDRESS`], every later one right after the previous. Addresses are
//! never reused.

use tracing::debug;

use crate::chunk::{Chunk, Prototype};
use crate::error::Result;
use crate::render::{instruction_bytes, render};

pub const FIRST_ADDRESS: u32 = 1;

/// Identifies one registered chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(usize);

/// One entry of a disassembly listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassembledInstruction {
    pub address: i64,
    pub instruction: String,
    pub instruction_bytes: Option<String>,
    /// Source name of the owning prototype, e.g. `@__foo__/control.lua`.
    pub source: Option<String>,
    pub line: Option<u32>,
    /// `true` for synthetic entries outside every loaded chunk.
    pub invalid: bool,
}

impl DisassembledInstruction {
    fn placeholder(address: i64) -> Self {
        Self {
            address,
            instruction: "<no instruction>".to_string(),
            instruction_bytes: None,
            source: None,
            line: None,
            invalid: true,
        }
    }
}

#[derive(Debug)]
struct Span {
    base: u32,
    len: u32,
    chunk: usize,
    /// Child indices from the chunk's main prototype down to this one.
    path: Vec<usize>,
}

#[derive(Debug)]
pub struct Disassembler {
    chunks: Vec<(String, Chunk)>,
    /// Non-empty prototypes ordered by base address.
    spans: Vec<Span>,
    next_address: u32,
}

impl Default for Disassembler {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            spans: Vec::new(),
            next_address: FIRST_ADDRESS,
        }
    }
}

impl Disassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register a precompiled chunk under `name`.
    pub fn load(&mut self, name: impl Into<String>, bytes: &[u8]) -> Result<ChunkId> {
        Ok(self.register(name, Chunk::parse(bytes)?))
    }

    /// Rebase `chunk` after everything registered so far.
    pub fn register(&mut self, name: impl Into<String>, mut chunk: Chunk) -> ChunkId {
        let name = name.into();
        let base = self.next_address;
        self.next_address = chunk.rebase(base);
        let idx = self.chunks.len();
        index_spans(&chunk.main, idx, &mut Vec::new(), &mut self.spans);
        debug!(%name, base, next = self.next_address, "registered bytecode chunk");
        self.chunks.push((name, chunk));
        ChunkId(idx)
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id.0).map(|(_, chunk)| chunk)
    }

    pub fn find_chunk(&self, name: &str) -> Option<ChunkId> {
        self.chunks
            .iter()
            .rposition(|(n, _)| n == name)
            .map(ChunkId)
    }

    /// First address not yet handed out.
    pub fn next_address(&self) -> u32 {
        self.next_address
    }

    /// The prototype and local pc for a flat address.
    pub fn locate(&self, address: i64) -> Option<(&Prototype, u32)> {
        let address = u32::try_from(address).ok()?;
        let idx = self.spans.partition_point(|span| span.base <= address);
        let span = self.spans.get(idx.checked_sub(1)?)?;
        if address >= span.base + span.len {
            return None;
        }
        let mut proto = &self.chunks.get(span.chunk)?.1.main;
        for &child in &span.path {
            proto = proto.protos.get(child)?;
        }
        Some((proto, address - span.base))
    }

    /// Flat address of `pc` inside the function defined at `line_defined` in
    /// the chunk registered as `name`.
    pub fn address_of(&self, name: &str, line_defined: u32, pc: u32) -> Option<i64> {
        let chunk = self.chunk(self.find_chunk(name)?)?;
        let mut found = None;
        chunk.main.walk(&mut |proto| {
            if found.is_none() && proto.line_defined == line_defined && pc < proto.code.len() as u32
            {
                found = proto.base.map(|base| i64::from(base + pc));
            }
        });
        found
    }

    /// `count` consecutive entries starting at `start`, with placeholders
    /// wherever no chunk is loaded. The listing stops early only where the
    /// next address would not fit in an `i64`.
    pub fn disassemble(&self, start: i64, count: usize) -> Vec<DisassembledInstruction> {
        (0..count)
            .map_while(|i| start.checked_add(i64::try_from(i).ok()?))
            .map(|address| {
                match self.locate(address) {
                    Some((proto, pc)) => DisassembledInstruction {
                        address,
                        instruction: render(proto, pc),
                        instruction_bytes: proto.code.get(pc as usize).map(|i| instruction_bytes(*i)),
                        source: proto.source.clone(),
                        line: proto.line_at(pc),
                        invalid: false,
                    },
                    None => DisassembledInstruction::placeholder(address),
                }
            })
            .collect()
    }
}

fn index_spans(proto: &Prototype, chunk: usize, path: &mut Vec<usize>, out: &mut Vec<Span>) {
    if let (Some(base), false) = (proto.base, proto.code.is_empty()) {
        out.push(Span {
            base,
            len: proto.code.len() as u32,
            chunk,
            path: path.clone(),
        });
    }
    for (i, child) in proto.protos.iter().enumerate() {
        path.push(i);
        index_spans(child, chunk, path, out);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Instruction, OpCode};

    fn chunk_with(source: &str, n: usize) -> Chunk {
        Chunk {
            main: Prototype {
                source: Some(source.to_string()),
                code: (0..n)
                    .map(|i| Instruction::abx(OpCode::LoadK, i as u32, 0))
                    .collect(),
                line_info: (1..=n as u32).collect(),
                ..Prototype::default()
            },
        }
    }

    #[test]
    fn request_across_chunk_boundary() {
        let mut d = Disassembler::new();
        d.register("a", chunk_with("@a.lua", 5));
        d.register("b", chunk_with("@b.lua", 3));
        assert_eq!(d.next_address(), 9);

        let listing = d.disassemble(4, 4);
        let addresses: Vec<_> = listing.iter().map(|i| i.address).collect();
        assert_eq!(addresses, [4, 5, 6, 7]);
        let sources: Vec<_> = listing.iter().map(|i| i.source.as_deref()).collect();
        assert_eq!(
            sources,
            [Some("@a.lua"), Some("@a.lua"), Some("@b.lua"), Some("@b.lua")]
        );
        assert_eq!(listing[0].line, Some(4));
        assert_eq!(listing[2].line, Some(1));
        assert!(listing.iter().all(|i| !i.invalid));
    }

    #[test]
    fn placeholders_outside_loaded_chunks() {
        let mut d = Disassembler::new();
        d.register("a", chunk_with("@a.lua", 2));

        let listing = d.disassemble(-1, 5);
        let invalid: Vec<_> = listing.iter().map(|i| i.invalid).collect();
        assert_eq!(invalid, [true, true, false, false, true]);
        assert_eq!(listing[4].instruction, "<no instruction>");
        assert_eq!(listing[4].address, 3);
    }

    #[test]
    fn listing_stops_at_the_end_of_the_address_space() {
        let mut d = Disassembler::new();
        d.register("a", chunk_with("@a.lua", 2));

        let listing = d.disassemble(i64::MAX - 1, 4);
        let addresses: Vec<_> = listing.iter().map(|i| i.address).collect();
        assert_eq!(addresses, [i64::MAX - 1, i64::MAX]);
        assert!(listing.iter().all(|i| i.invalid));
    }

    #[test]
    fn nested_prototypes_follow_their_parent() {
        let mut outer = chunk_with("@m.lua", 2);
        let mut inner = chunk_with("@m.lua", 3).main;
        inner.line_defined = 7;
        outer.main.protos.push(inner);

        let mut d = Disassembler::new();
        d.register("first", chunk_with("@x.lua", 1));
        d.register("m", outer);

        assert_eq!(d.address_of("m", 0, 1), Some(3));
        assert_eq!(d.address_of("m", 7, 0), Some(4));
        assert_eq!(d.address_of("m", 7, 3), None);
        let (proto, pc) = d.locate(6).unwrap();
        assert_eq!((proto.line_defined, pc), (7, 2));
        assert!(d.locate(7).is_none());
    }
}
