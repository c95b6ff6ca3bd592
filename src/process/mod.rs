//! Process management for the mu server.
//!
//! One long-running `mu server` child is spawned per connection and spoken to
//! over its stdio pipes.
//!
//! # Architecture
//!
//! ```text
//! libmu                              mu server
//! ┌──────────────┐                  ┌─────────────┐
//! │ ServerProcess│───stdin (cmd:…)─▶│             │
//! │              │◀──stdout (frames)│             │
//! └──────────────┘                  └─────────────┘
//! ```
//!
//! # Input Protocol
//!
//! One newline-terminated `cmd:<verb> key:value …` line per request.
//!
//! # Output Protocol
//!
//! Length-prefixed s-expression frames, see [`crate::protocol::frame`]. The
//! reader hands out raw chunks; it never interprets them.

mod io;
mod spawn;

pub use io::{ProcessReader, ProcessWriter, ReadOutcome};
pub use spawn::ServerProcess;
