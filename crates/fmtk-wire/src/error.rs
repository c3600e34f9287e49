use thiserror::Error;

pub type Result<T> = std::result::Result<T, WireError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("buffer underflow: need {need} bytes at {at}, have {have}")]
    UnexpectedEof { need: usize, at: usize, have: usize },

    #[error("invalid varint lead byte 0x{byte:02x} at {at}")]
    InvalidVarintLead { byte: u8, at: usize },

    #[error("invalid varint continuation byte 0x{byte:02x} at {at}")]
    InvalidVarintContinuation { byte: u8, at: usize },

    #[error("list of {0} entries cannot be encoded (at most 251)")]
    ListTooLong(usize),

    #[error("unknown breakpoint flags 0x{0:02x}")]
    UnknownBreakpointFlags(u8),

    #[error("unknown tagged tree type tag {0}")]
    UnknownTypeTag(u8),

    #[error("empty dictionary key")]
    EmptyKey,

    #[error("duplicate dictionary key {0:?}")]
    DuplicateKey(String),

    #[error("dictionary key is not valid UTF-8")]
    InvalidKey,

    #[error("values nested more than {0} deep")]
    TooDeep(usize),

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("mod settings root must be a dictionary")]
    SettingsRootNotDictionary,

    #[error("unknown settings scope {0:?}")]
    UnknownScope(String),
}
