//! Encoding of requests into mu server command lines.
//!
//! ```text
//! cmd:find query:"maildir:/inbox flag:unread" maxnum:50
//! ```
//!
//! The reserved `timeout` argument never reaches the wire; it is returned
//! alongside the line so the connection can widen its read timeout for that
//! one call.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use crate::{Error, Result};

/// Argument key reserved for per-call read timeouts (seconds).
pub const TIMEOUT_KEY: &str = "timeout";

/// A request to send to the server: a verb plus ordered keyword arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    args: Vec<(String, String)>,
}

/// A command rendered for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCommand {
    /// The command line, without the terminating newline.
    pub line: String,
    /// Per-call read timeout extracted from the `timeout` argument.
    pub timeout: Option<Duration>,
}

impl Command {
    /// Create a command for `verb` with no arguments.
    pub fn new(verb: impl fmt::Display) -> Self {
        Self {
            verb: verb.to_string(),
            args: Vec::new(),
        }
    }

    /// Append a keyword argument.
    pub fn arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.args.push((key.into(), value.to_string()));
        self
    }

    /// Append several keyword arguments, keeping their order.
    pub fn args<I, K, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.args
            .extend(args.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Set the per-call read timeout.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.arg(TIMEOUT_KEY, timeout.as_secs_f64())
    }

    /// The command verb.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Render the wire line and extract the per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCommand`] if the verb or a key is empty or
    /// contains whitespace, or if `timeout` is not a positive number.
    pub fn encode(&self) -> Result<EncodedCommand> {
        if !is_token(&self.verb) {
            return Err(Error::InvalidCommand(format!(
                "verb must be a non-empty word, got {:?}",
                self.verb
            )));
        }

        let mut line = format!("cmd:{}", self.verb);
        let mut timeout = None;
        for (key, value) in &self.args {
            if key == TIMEOUT_KEY {
                timeout = Some(parse_timeout(value)?);
                continue;
            }
            if !is_token(key) {
                return Err(Error::InvalidCommand(format!(
                    "argument name must be a non-empty word, got {:?}",
                    key
                )));
            }
            line.push(' ');
            line.push_str(key);
            line.push(':');
            line.push_str(&quote(value));
        }

        Ok(EncodedCommand { line, timeout })
    }
}

/// Encode `verb` and `args` in one go.
pub fn encode<I, K, V>(verb: &str, args: I) -> Result<EncodedCommand>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    Command::new(verb).args(args).encode()
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

/// Values containing whitespace are double-quoted, with `"` and `\` escaped.
/// Line breaks are written as `\n` and `\r` so a request stays on one line.
fn quote(value: &str) -> Cow<'_, str> {
    if !value.chars().any(char::is_whitespace) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    Cow::Owned(out)
}

fn parse_timeout(value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| {
            Error::InvalidCommand(format!(
                "timeout must be a positive number of seconds, got {:?}",
                value
            ))
        })
}
