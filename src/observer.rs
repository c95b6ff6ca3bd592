//! Connection observer trait and implementations.

use crate::connection::ConnectionState;

/// Observer for connection lifecycle events.
///
/// Restarting a dead server happens inside an ordinary `execute` call. An
/// observer makes those restarts, and the read cycle's state changes, visible
/// to callers and tests.
///
/// # Implementation Notes
///
/// - Implementations must be lightweight; they run inline in the read cycle.
/// - Methods have default empty implementations for selective observation.
///
/// # Example
///
/// ```ignore
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use libmu::ConnectionObserver;
///
/// struct RestartCounter(AtomicUsize);
///
/// impl ConnectionObserver for RestartCounter {
///     fn on_restart(&self, _old_pid: u32, _new_pid: u32) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait ConnectionObserver: Send + Sync {
    /// Called when a server process has been launched (initially or after a restart).
    fn on_spawn(&self, pid: u32) {
        let _ = pid;
    }

    /// Called on every read-cycle state transition.
    fn on_state_change(&self, from: ConnectionState, to: ConnectionState) {
        let _ = (from, to);
    }

    /// Called after a dead server was reaped and a fresh one launched.
    ///
    /// `old_pid` is 0 when there was no previous process.
    fn on_restart(&self, old_pid: u32, new_pid: u32) {
        let _ = (old_pid, new_pid);
    }

    /// Called when buffered output had to be thrown away.
    fn on_discard(&self, bytes: usize, reason: &str) {
        let _ = (bytes, reason);
    }

    /// Called when a frame arrived but could not be decoded.
    fn on_malformed_frame(&self, payload: &[u8], error: &crate::Error) {
        let _ = (payload, error);
    }
}

/// Simple logging observer that logs connection events using tracing.
///
/// # Example
///
/// ```ignore
/// use libmu::{Connection, LoggingObserver};
/// use std::sync::Arc;
///
/// let conn = Connection::builder()
///     .observer(Arc::new(LoggingObserver::new()))
///     .connect()
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoggingObserver {
    level: LogLevel,
}

/// Log level for LoggingObserver.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogLevel {
    /// Log at trace level.
    Trace,
    /// Log at debug level (default).
    #[default]
    Debug,
    /// Log at info level.
    Info,
}

impl LoggingObserver {
    /// Create a new logging observer with debug level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging observer with a specific level.
    pub fn with_level(level: LogLevel) -> Self {
        Self { level }
    }
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Trace => tracing::trace!($($arg)+),
            LogLevel::Debug => tracing::debug!($($arg)+),
            LogLevel::Info => tracing::info!($($arg)+),
        }
    };
}

impl ConnectionObserver for LoggingObserver {
    fn on_spawn(&self, pid: u32) {
        log_at!(self.level, pid, "spawn");
    }

    fn on_state_change(&self, from: ConnectionState, to: ConnectionState) {
        log_at!(self.level, ?from, ?to, "state_change");
    }

    fn on_restart(&self, old_pid: u32, new_pid: u32) {
        log_at!(self.level, old_pid, new_pid, "restart");
    }

    fn on_discard(&self, bytes: usize, reason: &str) {
        log_at!(self.level, bytes, reason, "discard");
    }

    fn on_malformed_frame(&self, payload: &[u8], error: &crate::Error) {
        log_at!(self.level, bytes = payload.len(), %error, "malformed_frame");
    }
}
