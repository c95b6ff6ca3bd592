//! Connection to a long-running mu server.
//!
//! This module provides [`Connection`], which owns one `mu server` child and
//! turns its framed stdout into normalized results.
//!
//! # Read cycle
//!
//! ```text
//!            write cmd line
//!  Idle ───────────────────▶ Reading ──(data within timeout)──┐
//!   ▲                          │  ▲                           │
//!   │                          │  └───────────────────────────┘
//!   │          timeout expires │            EOF on stdout
//!   │                          ▼                 │
//!   └──────────────────── Drained          ChildDead ──(dying)──▶ Closing
//!   ▲                                            │
//!   └─────────────── reap + respawn ─────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use libmu::Connection;
//!
//! let mut conn = Connection::builder().muhome("/tmp/mu").connect().await?;
//! let pong = conn.ping(libmu::NO_ARGS).await?;
//! let hits = conn.find([("query", "flag:unread"), ("maxnum", "20")]).await?;
//! conn.shutdown().await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::{ServerConfig, ServerConfigBuilder, Verb};
use crate::observer::ConnectionObserver;
use crate::process::{ReadOutcome, ServerProcess};
use crate::protocol::frame::{take_frame, FrameStatus, MARK_LO};
use crate::protocol::{decode_payload, Command};
use crate::{Error, Result};

/// Empty argument list for verbs that need none.
pub const NO_ARGS: [(&str, &str); 0] = [];

/// How long a dead or quitting server gets to exit before it is killed.
const REAP_GRACE: Duration = Duration::from_secs(2);

macro_rules! diag {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::debug!($($arg)+)
        } else {
            tracing::trace!($($arg)+)
        }
    };
}

/// Where the connection is in its read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No request in flight.
    Idle,
    /// Waiting, with a timeout, for the server to produce output.
    Reading,
    /// The timeout expired with no further output; the cycle is over.
    Drained,
    /// The server closed its stdout.
    ChildDead,
    /// Shutdown requested; the connection must not be used again.
    Closing,
}

/// How a read cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleEnd {
    Drained,
    ChildDead,
}

/// A connection to a mu server subprocess.
///
/// The connection exclusively owns the child process and its pipes. Requests
/// are strictly one at a time; every request method takes `&mut self`.
/// Share a connection between tasks by wrapping it in a `tokio::sync::Mutex`.
///
/// # Restarts
///
/// If the server dies mid-conversation the connection reaps it, discards any
/// half-received output and launches a fresh one. The call that observed the
/// death returns whatever complete frames had already arrived, usually none.
/// Callers should treat an empty result as a signal to retry. Restarts are
/// reported through [`ConnectionObserver::on_restart`] and counted by
/// [`restarts`](Self::restarts).
pub struct Connection {
    config: ServerConfig,
    process: Option<ServerProcess>,
    buffer: Vec<u8>,
    timeout: Duration,
    original_timeout: Duration,
    state: ConnectionState,
    dying: bool,
    dead: bool,
    restarts: u64,
    observer: Option<Arc<dyn ConnectionObserver>>,
}

impl Connection {
    /// Launch a server with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns a launch error if the binary cannot be executed. Launch
    /// failures are never retried.
    pub async fn connect(config: ServerConfig) -> Result<Self> {
        Self::connect_with_observer(config, None).await
    }

    /// Launch a server and report lifecycle events to `observer`.
    pub async fn connect_with_observer(
        config: ServerConfig,
        observer: Option<Arc<dyn ConnectionObserver>>,
    ) -> Result<Self> {
        let timeout = config.timeout();
        let mut conn = Self {
            config,
            process: None,
            buffer: Vec::new(),
            timeout,
            original_timeout: timeout,
            state: ConnectionState::Idle,
            dying: false,
            dead: false,
            restarts: 0,
            observer,
        };
        conn.spawn()?;
        Ok(conn)
    }

    /// Create a builder for configuring a new connection.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Process id of the running server, or 0 when none is running.
    pub fn pid(&self) -> u32 {
        self.process.as_ref().map_or(0, ServerProcess::pid)
    }

    /// Current read-cycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of times a dead server has been replaced.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Read timeout in effect right now.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read timeout every call reverts to.
    pub fn original_timeout(&self) -> Duration {
        self.original_timeout
    }

    /// Whether the connection has been shut down.
    pub fn is_closed(&self) -> bool {
        self.dead
    }

    /// Get a reference to the connection's configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Send `verb` with keyword `args` and collect every complete frame of the
    /// response as a normalized value.
    ///
    /// A `timeout` argument (seconds) widens the read timeout for this call
    /// only and is not sent to the server.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidCommand`] if the command cannot be encoded
    /// - [`Error::ConnectionClosed`] after [`shutdown`](Self::shutdown) began
    /// - a launch error if the server died and could not be relaunched
    pub async fn execute<I, K, V>(&mut self, verb: impl fmt::Display, args: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let command = Command::new(verb).args(args);
        self.execute_command(&command).await
    }

    /// Send a prepared [`Command`].
    pub async fn execute_command(&mut self, command: &Command) -> Result<Vec<Value>> {
        if self.dying || self.dead {
            return Err(Error::ConnectionClosed);
        }
        let encoded = command.encode()?;

        if !self.buffer.is_empty() {
            self.discard("stale output from a previous request");
        }

        if let Some(timeout) = encoded.timeout {
            self.timeout = timeout;
        }
        let result = self.round_trip(command.verb(), &encoded.line).await;
        self.timeout = self.original_timeout;
        if !self.dead {
            self.set_state(ConnectionState::Idle);
        }
        result
    }

    /// Add a message file to the store.
    pub async fn add<I, K, V>(&mut self, args: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.execute(Verb::Add, args).await
    }

    /// List contacts.
    pub async fn contacts<I, K, V>(&mut self, args: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.execute(Verb::Contacts, args).await
    }

    /// Extract or open a message part.
    pub async fn extract<I, K, V>(&mut self, args: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.execute(Verb::Extract, args).await
    }

    /// Run a query. Each matching message usually arrives as its own frame.
    pub async fn find<I, K, V>(&mut self, args: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.execute(Verb::Find, args).await
    }

    /// (Re)index the store. Indexing is slow; pass a generous `timeout`.
    pub async fn index<I, K, V>(&mut self, args: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.execute(Verb::Index, args).await
    }

    /// Move a message or change its flags (the `move` verb).
    pub async fn move_message<I, K, V>(&mut self, args: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.execute(Verb::Move, args).await
    }

    /// Check that the server is alive.
    pub async fn ping<I, K, V>(&mut self, args: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.execute(Verb::Ping, args).await
    }

    /// Create a maildir.
    pub async fn mkdir<I, K, V>(&mut self, args: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.execute(Verb::Mkdir, args).await
    }

    /// Remove a message.
    pub async fn remove<I, K, V>(&mut self, args: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.execute(Verb::Remove, args).await
    }

    /// View a single message.
    pub async fn view<I, K, V>(&mut self, args: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.execute(Verb::View, args).await
    }

    /// Ask the server to quit, drain its last output and reap it.
    ///
    /// Consumes the connection. A server that does not exit on its own is
    /// killed after a short grace period.
    pub async fn shutdown(mut self) -> Result<()> {
        if self.dead {
            return Ok(());
        }
        self.dying = true;
        self.buffer.clear();

        if let Some(process) = self.process.as_mut() {
            if let Err(e) = process.writer().write_line("cmd:quit").await {
                tracing::debug!(error = %e, "quit request not delivered");
            }
        }

        let end = self.read_cycle().await;
        let trailing = self.drain_frames();
        if !trailing.is_empty() {
            diag!(self.config.verbose, frames = trailing.len(), "ignoring output sent while quitting");
        }
        match end {
            // `dying` is set, so this reaps without relaunching.
            CycleEnd::ChildDead => self.handle_death().await?,
            // Still running after the read timeout.
            CycleEnd::Drained => self.teardown().await,
        }
        self.dead = true;
        self.set_state(ConnectionState::Closing);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn round_trip(&mut self, verb: &str, line: &str) -> Result<Vec<Value>> {
        if self.process.is_none() {
            // A previous relaunch failed; try again before giving up.
            self.spawn()?;
        }
        diag!(self.config.verbose, pid = self.pid(), verb, command = line, "sending command");

        let written = match self.process.as_mut() {
            Some(process) => process.writer().write_line(line).await,
            None => return Err(Error::ConnectionClosed),
        };
        if let Err(e) = written {
            tracing::warn!(pid = self.pid(), verb, error = %e, "failed to send command, server presumed dead");
            self.set_state(ConnectionState::ChildDead);
            self.handle_death().await?;
            return Ok(Vec::new());
        }

        let end = self.read_cycle().await;
        let values = self.drain_frames();
        diag!(self.config.verbose, verb, frames = values.len(), "response complete");

        if end == CycleEnd::ChildDead {
            self.handle_death().await?;
        }
        Ok(values)
    }

    /// Keep reading while output arrives within the timeout.
    async fn read_cycle(&mut self) -> CycleEnd {
        self.set_state(ConnectionState::Reading);
        let timeout = self.timeout;
        let verbose = self.config.verbose;
        loop {
            let Some(process) = self.process.as_mut() else {
                self.set_state(ConnectionState::ChildDead);
                return CycleEnd::ChildDead;
            };
            match process.reader().read_chunk(&mut self.buffer, timeout).await {
                Ok(ReadOutcome::Data(n)) => {
                    diag!(verbose, bytes = n, buffered = self.buffer.len(), "read chunk");
                }
                Ok(ReadOutcome::TimedOut) => {
                    self.set_state(ConnectionState::Drained);
                    return CycleEnd::Drained;
                }
                Ok(ReadOutcome::Eof) => {
                    self.set_state(ConnectionState::ChildDead);
                    return CycleEnd::ChildDead;
                }
                Err(e) => {
                    tracing::warn!(pid = process.pid(), error = %e, "read from mu server failed");
                    self.set_state(ConnectionState::ChildDead);
                    return CycleEnd::ChildDead;
                }
            }
        }
    }

    /// Decode every complete frame at the front of the buffer.
    ///
    /// Unframed bytes are skipped up to the next frame marker. A frame that
    /// fails to decode yields `null`. A trailing partial frame stays buffered.
    fn drain_frames(&mut self) -> Vec<Value> {
        let mut values = Vec::new();
        loop {
            match take_frame(&mut self.buffer) {
                FrameStatus::Complete(payload) => match decode_payload(&payload) {
                    Ok(value) => values.push(value),
                    Err(e) => {
                        diag!(self.config.verbose, error = %e, bytes = payload.len(), "malformed frame");
                        if let Some(observer) = &self.observer {
                            observer.on_malformed_frame(&payload, &e);
                        }
                        values.push(Value::Null);
                    }
                },
                FrameStatus::Incomplete => break,
                FrameStatus::NoFrame if self.buffer.is_empty() => break,
                FrameStatus::NoFrame => {
                    if !self.skip_to_next_frame(0, "unframed output") {
                        break;
                    }
                }
                FrameStatus::Malformed => {
                    values.push(Value::Null);
                    if !self.skip_to_next_frame(1, "bad frame length") {
                        break;
                    }
                }
            }
        }
        values
    }

    /// Drop bytes up to the next frame marker at or after `from`. Returns
    /// false when no marker is left (the buffer is then empty).
    fn skip_to_next_frame(&mut self, from: usize, reason: &str) -> bool {
        let next = self
            .buffer
            .iter()
            .skip(from)
            .position(|&b| b == MARK_LO)
            .map(|i| i + from);
        let skipped = next.unwrap_or(self.buffer.len());
        diag!(self.config.verbose, bytes = skipped, reason, "skipping output");
        if let Some(observer) = &self.observer {
            observer.on_discard(skipped, reason);
        }
        self.buffer.drain(..skipped);
        next.is_some()
    }

    /// Reap the dead server and, unless shutting down, launch a new one.
    async fn handle_death(&mut self) -> Result<()> {
        let old_pid = self.pid();
        self.teardown().await;
        if !self.buffer.is_empty() {
            self.discard("partial response from a dead server");
        }

        if self.dying {
            self.set_state(ConnectionState::Closing);
            return Ok(());
        }

        tracing::warn!(old_pid, "mu server died, restarting");
        let new_pid = self.spawn()?;
        self.restarts += 1;
        if let Some(observer) = &self.observer {
            observer.on_restart(old_pid, new_pid);
        }
        self.set_state(ConnectionState::Idle);
        Ok(())
    }

    /// Reap the current process, if any.
    async fn teardown(&mut self) {
        if let Some(mut process) = self.process.take() {
            let pid = process.pid();
            let reaped = if process.has_exited() {
                process.reap().await
            } else {
                process.terminate(REAP_GRACE).await
            };
            if let Err(e) = reaped {
                tracing::warn!(pid, error = %e, "failed to reap mu server");
            }
        }
    }

    fn spawn(&mut self) -> Result<u32> {
        let process = ServerProcess::spawn(&self.config)?;
        let pid = process.pid();
        self.process = Some(process);
        if let Some(observer) = &self.observer {
            observer.on_spawn(pid);
        }
        Ok(pid)
    }

    fn discard(&mut self, reason: &str) {
        let bytes = self.buffer.len();
        diag!(self.config.verbose, bytes, reason, "discarding buffered output");
        if let Some(observer) = &self.observer {
            observer.on_discard(bytes, reason);
        }
        self.buffer.clear();
    }

    fn set_state(&mut self, to: ConnectionState) {
        let from = std::mem::replace(&mut self.state, to);
        if from != to {
            tracing::trace!(?from, ?to, "connection state");
            if let Some(observer) = &self.observer {
                observer.on_state_change(from, to);
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("pid", &self.pid())
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("timeout", &self.timeout)
            .field("restarts", &self.restarts)
            .field("dying", &self.dying)
            .field("dead", &self.dead)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Connection`].
///
/// This wraps [`ServerConfigBuilder`] and connects directly.
///
/// # Example
///
/// ```ignore
/// let conn = Connection::builder()
///     .binary("/usr/local/bin/mu")
///     .timeout(Duration::from_millis(300))
///     .connect()
///     .await?;
/// ```
#[derive(Default)]
pub struct ConnectionBuilder {
    inner: ServerConfigBuilder,
    observer: Option<Arc<dyn ConnectionObserver>>,
}

impl ConnectionBuilder {
    /// Create a new connection builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the configuration and launch the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the server cannot
    /// be launched.
    pub async fn connect(self) -> Result<Connection> {
        let config = self.inner.build()?;
        Connection::connect_with_observer(config, self.observer).await
    }

    // -------------------------------------------------------------------------
    // Process options (delegated to ServerConfigBuilder)
    // -------------------------------------------------------------------------

    /// Path to the mu binary.
    pub fn binary(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.inner = self.inner.binary(path);
        self
    }

    /// Use the binary named by `MU_BINARY`, if set.
    pub fn binary_from_env(mut self) -> Self {
        self.inner = self.inner.binary_from_env();
        self
    }

    /// Server subcommand.
    pub fn subcommand(mut self, name: impl Into<String>) -> Self {
        self.inner = self.inner.subcommand(name);
        self
    }

    /// Alternative mu home directory.
    pub fn muhome(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.inner = self.inner.muhome(path);
        self
    }

    /// Use the mu home named by `MUHOME`, if set.
    pub fn muhome_from_env(mut self) -> Self {
        self.inner = self.inner.muhome_from_env();
        self
    }

    /// Append an extra server argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.inner = self.inner.arg(arg);
        self
    }

    /// Append extra server arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inner = self.inner.args(args);
        self
    }

    /// Working directory for the server process.
    pub fn working_directory(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.inner = self.inner.working_directory(path);
        self
    }

    /// Add/override environment variable for subprocess.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner = self.inner.env(key, value);
        self
    }

    /// Don't inherit parent environment.
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inner = self.inner.inherit_env(inherit);
        self
    }

    // -------------------------------------------------------------------------
    // Read cycle
    // -------------------------------------------------------------------------

    /// Default read timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.inner = self.inner.timeout(duration);
        self
    }

    /// Read chunk size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.inner = self.inner.chunk_size(size);
        self
    }

    /// Diagnostic logging toggle.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.inner = self.inner.verbose(verbose);
        self
    }

    // -------------------------------------------------------------------------
    // Observer
    // -------------------------------------------------------------------------

    /// Set an observer for restarts and state changes.
    pub fn observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("inner", &self.inner)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
