//! I/O primitives for communicating with the mu server subprocess.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout};

use crate::{Error, Result};

/// Result of one timeout-bounded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were appended to the buffer.
    Data(usize),
    /// The server closed its stdout; it has exited or is about to.
    Eof,
    /// Nothing became readable within the timeout.
    TimedOut,
}

/// Reads raw chunks from the server's stdout.
///
/// Each read waits at most the given timeout for output to become available,
/// then takes up to `chunk_size` bytes. Framing is left to the caller.
pub struct ProcessReader {
    stdout: ChildStdout,
    chunk: Vec<u8>,
}

impl ProcessReader {
    /// Create a new reader from a child process stdout.
    pub fn new(stdout: ChildStdout, chunk_size: usize) -> Self {
        Self {
            stdout,
            chunk: vec![0; chunk_size.max(1)],
        }
    }

    /// Wait up to `timeout` for output and append one chunk of it to `buf`.
    ///
    /// Cancel-safe: when the timeout fires no bytes have been consumed.
    pub async fn read_chunk(&mut self, buf: &mut Vec<u8>, timeout: Duration) -> Result<ReadOutcome> {
        match tokio::time::timeout(timeout, self.stdout.read(&mut self.chunk)).await {
            Err(_) => Ok(ReadOutcome::TimedOut),
            Ok(Ok(0)) => Ok(ReadOutcome::Eof),
            Ok(Ok(n)) => {
                buf.extend_from_slice(&self.chunk[..n]);
                Ok(ReadOutcome::Data(n))
            }
            Ok(Err(e)) => Err(Error::io(e)),
        }
    }
}

/// Writes command lines to the server's stdin.
pub struct ProcessWriter {
    stdin: ChildStdin,
}

impl ProcessWriter {
    /// Create a new writer from a child process stdin.
    pub fn new(stdin: ChildStdin) -> Self {
        Self { stdin }
    }

    /// Write `line` followed by a newline and flush.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.stdin.write_all(&bytes).await.map_err(Error::io)?;
        self.stdin.flush().await.map_err(Error::io)?;
        Ok(())
    }
}
