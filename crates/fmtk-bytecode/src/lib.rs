#![forbid(unsafe_code)]

//! Lua 5.2 precompiled chunks: parsing, instruction decoding and a
//! disassembler over a flat address space shared by all loaded chunks.

mod chunk;
mod disasm;
mod error;
mod instruction;
mod reader;
mod render;

pub use crate::chunk::{Chunk, Constant, LocalVar, Prototype, UpvalueDesc, HEADER_LEN};
pub use crate::disasm::{ChunkId, DisassembledInstruction, Disassembler, FIRST_ADDRESS};
pub use crate::error::{BytecodeError, Result};
pub use crate::instruction::{fb2int, is_constant, Instruction, OpCode, BITRK};
pub use crate::render::{render, render_constant};
