//! # libmu
//!
//! Async Rust client for the `mu server` protocol.
//!
//! This library drives a long-running `mu server` subprocess over its stdio
//! pipes, supporting:
//! - Length-prefixed s-expression framing
//! - Normalized results as [`serde_json::Value`]
//! - Timeout-bounded reads with per-call overrides
//! - Transparent restart of a server that dies mid-conversation
//!
//! ## Quick Start
//!
//! ```ignore
//! use libmu::{Connection, Result, NO_ARGS};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut conn = Connection::builder().muhome_from_env().connect().await?;
//!     let pong = conn.ping(NO_ARGS).await?;
//!     println!("{:?}", pong);
//!     conn.shutdown().await
//! }
//! ```
//!
//! ## Queries
//!
//! ```ignore
//! let hits = conn
//!     .find([("query", "from:ann flag:unread"), ("maxnum", "50"), ("timeout", "5")])
//!     .await?;
//! for hit in hits {
//!     if let Some(subject) = hit.get("subject") {
//!         println!("{}", subject);
//!     }
//! }
//! ```
//!
//! ## Configuration
//!
//! ```ignore
//! use std::time::Duration;
//! use libmu::Connection;
//!
//! let conn = Connection::builder()
//!     .binary("/usr/local/bin/mu")
//!     .muhome("/home/me/.cache/mu")
//!     .timeout(Duration::from_millis(300))
//!     .verbose(true)
//!     .connect()
//!     .await?;
//! ```

pub mod config;
mod connection;
mod error;
pub mod observer;
pub mod process;
pub mod protocol;

pub use error::{Error, Result};

// Re-export the main connection types at crate root
pub use connection::{Connection, ConnectionBuilder, ConnectionState, NO_ARGS};

// Re-export commonly used config types at crate root
pub use config::{ServerConfig, ServerConfigBuilder, Verb};

// Re-export commonly used protocol types at crate root
pub use protocol::{Command, Normalize, Sexp};

// Re-export observer types at crate root
pub use observer::{ConnectionObserver, LogLevel, LoggingObserver};

// Re-export commonly used process types at crate root
pub use process::ServerProcess;
