use thiserror::Error;

pub type Result<T> = std::result::Result<T, BytecodeError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("unexpected end of chunk: need {need} bytes at {at}")]
    UnexpectedEof { need: usize, at: usize },

    #[error("not a precompiled chunk")]
    BadSignature,

    #[error("unsupported chunk header: {field} is {found:#04x}, expected {expected:#04x}")]
    UnsupportedHeader {
        field: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("corrupted chunk header tail")]
    BadTail,

    #[error("unknown constant type {0}")]
    UnknownConstant(u8),

    #[error("function has {instructions} instructions but {lines} line entries")]
    LineCountMismatch { instructions: usize, lines: usize },

    #[error("invalid opcode {0}")]
    InvalidOpcode(u8),

    #[error("negative or oversized count {0}")]
    BadCount(i64),

    #[error("{0} trailing bytes after chunk")]
    TrailingBytes(usize),
}
