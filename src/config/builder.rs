//! Server configuration and builder.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use libmu::config::ServerConfig;
//!
//! let config = ServerConfig::builder()
//!     .binary("/usr/local/bin/mu")
//!     .muhome("/home/me/.cache/mu")
//!     .timeout(Duration::from_millis(300))
//!     .verbose(true)
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Environment variable naming the mu binary.
pub const ENV_BINARY: &str = "MU_BINARY";
/// Environment variable naming the mu home directory.
pub const ENV_MUHOME: &str = "MUHOME";

/// Default server binary.
pub const DEFAULT_BINARY: &str = "mu";
/// Default server subcommand.
pub const DEFAULT_SUBCOMMAND: &str = "server";
/// Default read timeout: how long a read cycle waits for more output.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
/// Default size of a single read from the server's stdout.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Configuration for launching and talking to a mu server.
///
/// Use [`ServerConfig::builder()`] to create a new configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Process options
    pub(crate) binary: PathBuf,
    pub(crate) subcommand: String,
    pub(crate) muhome: Option<PathBuf>,
    pub(crate) extra_args: Vec<String>,
    pub(crate) working_directory: Option<PathBuf>,
    pub(crate) env_vars: HashMap<String, String>,
    pub(crate) inherit_env: bool,

    // Read cycle
    pub(crate) timeout: Duration,
    pub(crate) chunk_size: usize,

    // Diagnostics
    pub(crate) verbose: bool,
}

impl ServerConfig {
    /// Create a new builder for ServerConfig.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Get the server binary.
    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }

    /// Get the server subcommand.
    pub fn subcommand(&self) -> &str {
        &self.subcommand
    }

    /// Get the default read timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get the read chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Whether diagnostic logging is enabled.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Get the working directory if set.
    pub fn working_directory(&self) -> Option<&PathBuf> {
        self.working_directory.as_ref()
    }

    /// Arguments passed to the binary: subcommand, `--muhome`, then extras.
    pub(crate) fn build_args(&self) -> Vec<String> {
        let mut args = vec![self.subcommand.clone()];
        if let Some(ref home) = self.muhome {
            args.push(format!("--muhome={}", home.display()));
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Builder for [`ServerConfig`].
///
/// The configuration is validated when [`build()`](ServerConfigBuilder::build)
/// is called. The binary itself is only looked up at spawn time.
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    binary: PathBuf,
    subcommand: String,
    muhome: Option<PathBuf>,
    extra_args: Vec<String>,
    working_directory: Option<PathBuf>,
    env_vars: HashMap<String, String>,
    inherit_env: bool,
    timeout: Duration,
    chunk_size: usize,
    verbose: bool,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            subcommand: DEFAULT_SUBCOMMAND.to_string(),
            muhome: None,
            extra_args: Vec::new(),
            working_directory: None,
            env_vars: HashMap::new(),
            inherit_env: true,
            timeout: DEFAULT_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            verbose: false,
        }
    }
}

impl ServerConfigBuilder {
    // -------------------------------------------------------------------------
    // Process options
    // -------------------------------------------------------------------------

    /// Path to the mu binary (default: search PATH for "mu").
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = path.into();
        self
    }

    /// Use the binary named by `MU_BINARY`, if set.
    pub fn binary_from_env(mut self) -> Self {
        if let Some(path) = std::env::var_os(ENV_BINARY).filter(|v| !v.is_empty()) {
            self.binary = PathBuf::from(path);
        }
        self
    }

    /// Server subcommand (default: "server").
    pub fn subcommand(mut self, name: impl Into<String>) -> Self {
        self.subcommand = name.into();
        self
    }

    /// Alternative mu home directory, passed as `--muhome=<path>`.
    pub fn muhome(mut self, path: impl Into<PathBuf>) -> Self {
        self.muhome = Some(path.into());
        self
    }

    /// Use the mu home named by `MUHOME`, if set.
    pub fn muhome_from_env(mut self) -> Self {
        if let Some(path) = std::env::var_os(ENV_MUHOME).filter(|v| !v.is_empty()) {
            self.muhome = Some(PathBuf::from(path));
        }
        self
    }

    /// Append an extra argument after the subcommand.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Append extra arguments after the subcommand.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Working directory for the server process.
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Add/override environment variable for subprocess.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Don't inherit parent environment (default: inherit).
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    // -------------------------------------------------------------------------
    // Read cycle
    // -------------------------------------------------------------------------

    /// Default read timeout. A read cycle ends once this long passes with no
    /// new output from the server.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }

    /// Maximum number of bytes taken from the server per read.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------

    /// Log commands, frame sizes and malformed output at debug level.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    // -------------------------------------------------------------------------
    // Build
    // -------------------------------------------------------------------------

    /// Build the configuration.
    ///
    /// This validates:
    /// - Binary and subcommand are non-empty
    /// - Timeout and chunk size are non-zero
    /// - Working directory exists if specified
    pub fn build(self) -> Result<ServerConfig> {
        if self.binary.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("binary must not be empty".into()));
        }

        if self.subcommand.trim().is_empty() {
            return Err(Error::InvalidConfig("subcommand must not be empty".into()));
        }

        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be positive".into()));
        }

        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be positive".into()));
        }

        if let Some(ref dir) = self.working_directory {
            if !dir.exists() {
                return Err(Error::InvalidConfig(format!(
                    "working directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        Ok(ServerConfig {
            binary: self.binary,
            subcommand: self.subcommand,
            muhome: self.muhome,
            extra_args: self.extra_args,
            working_directory: self.working_directory,
            env_vars: self.env_vars,
            inherit_env: self.inherit_env,
            timeout: self.timeout,
            chunk_size: self.chunk_size,
            verbose: self.verbose,
        })
    }
}
