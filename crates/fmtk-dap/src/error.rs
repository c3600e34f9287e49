use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("object info key at {0} is empty")]
    EmptyObjectInfoKey(String),

    #[error("unknown settings scope {0:?}")]
    UnknownScope(String),

    #[error("cannot encode value for setting {0:?}")]
    UnsupportedSettingValue(String),

    #[error(transparent)]
    Wire(#[from] fmtk_wire::WireError),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SessionError>;
