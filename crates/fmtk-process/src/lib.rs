//! Process plumbing for the fmtk debug adapter.
//!
//! The target game speaks a line-oriented console protocol on its stdio. This
//! crate provides the two pieces underneath the session:
//!
//! - [`segment`]: turns arbitrarily chunked reads into whole lines or
//!   bracket-delimited blocks.
//! - [`bridge`]: spawns the target (optionally under a native debugger),
//!   forwards its segmented output as [`BridgeEvent`]s and tears it down.

pub mod bridge;
pub mod segment;

pub use bridge::{BridgeEvent, ChildBridge, SpawnSpec, Wrapper};
pub use segment::{Matcher, Segmenter};
pub use tokio_util::sync::CancellationToken;
