//! Process spawning and lifecycle management.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};

use super::io::{ProcessReader, ProcessWriter};
use crate::config::ServerConfig;
use crate::{Error, Result};

/// A running mu server process.
///
/// Owns the child and both ends of its stdio pipes. Nothing else reads from or
/// writes to them.
///
/// # Cancellation
///
/// Dropping a `ServerProcess` kills the subprocess if it's still running.
pub struct ServerProcess {
    child: Child,
    pid: u32,
    reader: ProcessReader,
    writer: ProcessWriter,
}

impl ServerProcess {
    /// Launch the server described by `config`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BinaryNotFound`] if the binary does not exist and
    /// [`Error::ProcessSpawn`] for any other launch failure.
    pub fn spawn(config: &ServerConfig) -> Result<Self> {
        let mut cmd = build_command(config);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::BinaryNotFound {
                    searched: config.binary().display().to_string(),
                }
            } else {
                Error::ProcessSpawn(e)
            }
        })?;

        let pipes_missing = || {
            Error::ProcessSpawn(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "child stdio was not captured",
            ))
        };
        let stdin = child.stdin.take().ok_or_else(pipes_missing)?;
        let stdout = child.stdout.take().ok_or_else(pipes_missing)?;
        let pid = child.id().ok_or_else(pipes_missing)?;

        tracing::debug!(pid, binary = %config.binary().display(), "spawned mu server");

        Ok(Self {
            child,
            pid,
            reader: ProcessReader::new(stdout, config.chunk_size()),
            writer: ProcessWriter::new(stdin),
        })
    }

    /// The OS process id this server was started with.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Reader over the server's stdout.
    pub fn reader(&mut self) -> &mut ProcessReader {
        &mut self.reader
    }

    /// Writer over the server's stdin.
    pub fn writer(&mut self) -> &mut ProcessWriter {
        &mut self.writer
    }

    /// Check whether the process has already exited, without blocking.
    pub fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Close stdin and wait for the process to exit.
    pub async fn reap(self) -> Result<ExitStatus> {
        let Self {
            mut child,
            pid,
            writer,
            reader,
        } = self;
        drop(writer);
        drop(reader);
        let status = child.wait().await.map_err(Error::io)?;
        tracing::debug!(pid, %status, "reaped mu server");
        Ok(status)
    }

    /// Close stdin and give the process `grace` to exit, then kill it.
    pub async fn terminate(self, grace: Duration) -> Result<ExitStatus> {
        let Self {
            mut child,
            pid,
            writer,
            reader,
        } = self;
        drop(writer);
        drop(reader);
        let status = match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => status.map_err(Error::io)?,
            Err(_) => {
                tracing::warn!(pid, ?grace, "mu server did not exit, killing it");
                child.kill().await.map_err(Error::io)?;
                child.wait().await.map_err(Error::io)?
            }
        };
        tracing::debug!(pid, %status, "reaped mu server");
        Ok(status)
    }
}

/// Build a tokio Command from the config.
fn build_command(config: &ServerConfig) -> Command {
    let mut cmd = Command::new(config.binary());

    if let Some(dir) = config.working_directory() {
        cmd.current_dir(dir);
    }

    if !config.inherit_env {
        cmd.env_clear();
    }
    for (key, value) in &config.env_vars {
        cmd.env(key, value);
    }

    cmd.args(config.build_args());
    cmd
}
