//! Debug Adapter Protocol server for scripts running inside the game.
//!
//! The game exposes no debugging API of its own; a helper mod turns its
//! console into a cooperative prompt. This crate translates between that
//! prompt and DAP:
//! - [`dap_tokio`] frames DAP messages on stdio and [`protocol`] types the
//!   requests read and the messages written.
//! - [`target`] decodes the tagged lines the game prints.
//! - [`session`] is the state machine in between, with [`breakpoints`],
//!   [`modules`] and [`sources`] holding what it learns along the way.

pub mod breakpoints;
pub mod dap_tokio;
pub mod error;
pub mod launch;
pub mod mod_list;
pub mod modules;
pub mod objectinfo;
pub mod pending;
pub mod protocol;
pub mod refs;
pub mod server;
pub mod session;
pub mod sources;
pub mod target;

pub use crate::error::{Result, SessionError};
pub use crate::session::{Launcher, ProcessLauncher, Session, SessionInput, State, Target};
