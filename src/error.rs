/// Errors that can occur when talking to a mu server.
///
/// Errors are organized by category:
/// - Configuration errors: detected at `build()` time
/// - Launch errors: the server binary could not be started
/// - Command errors: a request could not be encoded
/// - IO errors: communication failures with the subprocess
/// - Decode errors: malformed s-expression text
/// - Lifecycle errors: the connection is no longer usable
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // -------------------------------------------------------------------------
    // Configuration errors (detected at build() time)
    // -------------------------------------------------------------------------
    /// Invalid configuration provided to builder.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // -------------------------------------------------------------------------
    // Launch errors
    // -------------------------------------------------------------------------
    /// Server binary not found.
    #[error("mu binary not found (searched: {searched})")]
    BinaryNotFound { searched: String },

    /// Failed to spawn the server subprocess.
    #[error("failed to spawn mu server process: {0}")]
    ProcessSpawn(#[source] std::io::Error),

    // -------------------------------------------------------------------------
    // Command errors
    // -------------------------------------------------------------------------
    /// The command could not be encoded (empty verb, bad timeout value).
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    // -------------------------------------------------------------------------
    // IO errors
    // -------------------------------------------------------------------------
    /// IO error communicating with the server subprocess.
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    // -------------------------------------------------------------------------
    // Decode errors
    // -------------------------------------------------------------------------
    /// Failed to decode s-expression text.
    #[error("failed to decode s-expression at byte {offset}: {message}")]
    Decode { message: String, offset: usize },

    // -------------------------------------------------------------------------
    // Lifecycle errors
    // -------------------------------------------------------------------------
    /// The connection is shutting down or has been closed.
    #[error("connection closed")]
    ConnectionClosed,
}

/// A specialized Result type for libmu operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a decode error at the given byte offset.
    pub fn decode(message: impl Into<String>, offset: usize) -> Self {
        Self::Decode {
            message: message.into(),
            offset,
        }
    }

    /// Create an IO error.
    pub fn io(source: std::io::Error) -> Self {
        Self::Io(source)
    }

    /// Check if this error means the server could not be launched at all.
    ///
    /// Launch failures are configuration problems and are never retried.
    pub fn is_launch_error(&self) -> bool {
        matches!(self, Error::BinaryNotFound { .. } | Error::ProcessSpawn(_))
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }

    #[test]
    fn is_launch_error_detection() {
        assert!(Error::BinaryNotFound {
            searched: "mu".into()
        }
        .is_launch_error());
        assert!(Error::ProcessSpawn(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied"
        ))
        .is_launch_error());
        assert!(!Error::ConnectionClosed.is_launch_error());
        assert!(!Error::InvalidConfig("x".into()).is_launch_error());
    }

    #[test]
    fn is_retryable_detection() {
        assert!(Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone")).is_retryable());
        assert!(!Error::ConnectionClosed.is_retryable());
        assert!(!Error::InvalidCommand("empty verb".into()).is_retryable());
        assert!(!Error::BinaryNotFound {
            searched: "mu".into()
        }
        .is_retryable());
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn decode_error_display() {
        let err = Error::decode("unterminated string", 7);
        assert_eq!(
            err.to_string(),
            "failed to decode s-expression at byte 7: unterminated string"
        );
    }

    #[test]
    fn question_mark_operator_io() {
        fn fallible_io() -> Result<()> {
            let _file = std::fs::File::open("/nonexistent/path/that/does/not/exist")?;
            Ok(())
        }
        let result = fallible_io();
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
