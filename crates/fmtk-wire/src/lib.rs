#![forbid(unsafe_code)]

//! Binary encodings exchanged with the game.
//!
//! Everything here is pure byte manipulation: the breakpoint list format
//! (built on [`varint`]), long-bracket quoting used to embed payloads in a
//! stdin command, the game's tagged tree format and the `mod-settings.dat`
//! file that wraps it.

pub mod blockquote;
pub mod breakpoints;
pub mod codec;
mod error;
pub mod proptree;
pub mod settings;
pub mod varint;

pub use crate::blockquote::{block_quote, block_quote_str};
pub use crate::breakpoints::{SourceBreakpoints, WireBreakpoint};
pub use crate::error::{Result, WireError};
pub use crate::proptree::Value;
pub use crate::settings::{ModSettings, SettingScope};
