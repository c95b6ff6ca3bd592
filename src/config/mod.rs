//! Configuration for the mu server client.
//!
//! This module provides:
//!
//! - [`ServerConfig`] and [`ServerConfigBuilder`] for launching the server
//! - [`Verb`], the names of the server's commands
//!
//! # Example
//!
//! ```ignore
//! use libmu::config::ServerConfig;
//!
//! let config = ServerConfig::builder()
//!     .binary_from_env()
//!     .muhome_from_env()
//!     .verbose(true)
//!     .build()?;
//! ```

pub mod builder;
pub mod options;

pub use builder::{
    ServerConfig, ServerConfigBuilder, DEFAULT_BINARY, DEFAULT_CHUNK_SIZE, DEFAULT_SUBCOMMAND,
    DEFAULT_TIMEOUT, ENV_BINARY, ENV_MUHOME,
};
pub use options::Verb;
