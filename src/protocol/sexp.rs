//! S-expression decoding for mu server payloads.
//!
//! The server answers every request with one or more s-expressions such as:
//!
//! ```text
//! (:docid 42 :subject "hello world" :from (("Ann" . "ann@example.com")) :flagged t)
//! ```
//!
//! This module turns that text into a [`Sexp`] tree. It knows nothing about
//! keyword folding or reserved symbols; see [`crate::protocol::normalize`].

use std::fmt;

use crate::{Error, Result};

/// The symbol the server uses for "false" and "absent".
pub const NIL: &str = "nil";
/// The symbol the server uses for "true".
pub const TRUE: &str = "t";
/// Prefix marking a keyword symbol (`:subject`).
pub const KEYWORD_MARKER: char = ':';
/// Deepest list nesting the parser accepts.
pub const MAX_DEPTH: usize = 512;

/// A decoded s-expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Sexp {
    /// An integer atom.
    Integer(i64),
    /// A floating point atom.
    Float(f64),
    /// A double-quoted string, escapes already resolved.
    String(String),
    /// A bare identifier, including `nil`, `t` and `:keywords`.
    Symbol(String),
    /// A proper list.
    List(Vec<Sexp>),
    /// A dotted pair `(car . cdr)`.
    Pair(Box<Sexp>, Box<Sexp>),
}

impl Sexp {
    /// Create a symbol.
    pub fn symbol(name: impl Into<String>) -> Self {
        Sexp::Symbol(name.into())
    }

    /// Create a string atom.
    pub fn string(value: impl Into<String>) -> Self {
        Sexp::String(value.into())
    }

    /// True for the `nil` symbol and the empty list.
    pub fn is_nil(&self) -> bool {
        match self {
            Sexp::Symbol(s) => s == NIL,
            Sexp::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// True for the `t` symbol.
    pub fn is_true(&self) -> bool {
        matches!(self, Sexp::Symbol(s) if s == TRUE)
    }

    /// If this is a `:keyword` symbol, return its name without the marker.
    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Sexp::Symbol(s) => s.strip_prefix(KEYWORD_MARKER),
            _ => None,
        }
    }

    /// Look up `:key` in a keyword property list.
    pub fn get(&self, key: &str) -> Option<&Sexp> {
        let Sexp::List(items) = self else {
            return None;
        };
        items
            .chunks(2)
            .find(|pair| pair[0].as_keyword() == Some(key))
            .and_then(|pair| pair.get(1))
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Integer(n) => write!(f, "{}", n),
            Sexp::Float(x) => write!(f, "{:?}", x),
            Sexp::String(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
            Sexp::Symbol(s) => f.write_str(s),
            Sexp::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
            Sexp::Pair(car, cdr) => write!(f, "({} . {})", car, cdr),
        }
    }
}

/// Parse exactly one s-expression from `input`.
///
/// Leading and trailing whitespace and `;` comments are allowed; anything else
/// after the first value is an error.
pub fn parse(input: &str) -> Result<Sexp> {
    let mut parser = Parser::new(input);
    parser.skip_trivia();
    if parser.at_end() {
        return Err(Error::decode("empty input", 0));
    }
    let value = parser.value()?;
    parser.skip_trivia();
    if !parser.at_end() {
        return Err(Error::decode("trailing characters", parser.pos));
    }
    Ok(value)
}

/// Parse every top-level s-expression in `input`.
pub fn parse_all(input: &str) -> Result<Vec<Sexp>> {
    let mut parser = Parser::new(input);
    let mut values = Vec::new();
    loop {
        parser.skip_trivia();
        if parser.at_end() {
            return Ok(values);
        }
        values.push(parser.value()?);
    }
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_trivia(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else if b == b';' {
                while let Some(b) = self.peek() {
                    self.pos += 1;
                    if b == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn value(&mut self) -> Result<Sexp> {
        match self.peek() {
            None => Err(Error::decode("unexpected end of input", self.pos)),
            Some(b'(') => {
                if self.depth >= MAX_DEPTH {
                    return Err(Error::decode("nesting too deep", self.pos));
                }
                self.pos += 1;
                self.depth += 1;
                let list = self.list();
                self.depth -= 1;
                list
            }
            Some(b')') => Err(Error::decode("unexpected ')'", self.pos)),
            Some(b'"') => {
                self.pos += 1;
                self.string().map(Sexp::String)
            }
            Some(_) => self.atom(),
        }
    }

    fn list(&mut self) -> Result<Sexp> {
        let start = self.pos - 1;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return Err(Error::decode("unterminated list", start)),
                Some(b')') => {
                    self.pos += 1;
                    return Ok(Sexp::List(items));
                }
                Some(b'.') if self.is_lone_dot() => {
                    if items.len() != 1 {
                        return Err(Error::decode("improper list", self.pos));
                    }
                    self.pos += 1;
                    self.skip_trivia();
                    let cdr = self.value()?;
                    self.skip_trivia();
                    if self.peek() != Some(b')') {
                        return Err(Error::decode("expected ')' after dotted pair", self.pos));
                    }
                    self.pos += 1;
                    let car = items.pop().ok_or_else(|| Error::decode("improper list", start))?;
                    return Ok(Sexp::Pair(Box::new(car), Box::new(cdr)));
                }
                Some(_) => items.push(self.value()?),
            }
        }
    }

    fn is_lone_dot(&self) -> bool {
        self.bytes
            .get(self.pos + 1)
            .map_or(true, |&b| is_delimiter(b))
    }

    fn string(&mut self) -> Result<String> {
        let start = self.pos - 1;
        let mut out = String::new();
        let mut run = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b'"' => {
                    out.push_str(&self.src[run..self.pos]);
                    self.pos += 1;
                    return Ok(out);
                }
                b'\\' => {
                    out.push_str(&self.src[run..self.pos]);
                    self.pos += 1;
                    match self.peek() {
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        Some(b'r') => out.push('\r'),
                        Some(b'"') => out.push('"'),
                        Some(b'\\') => out.push('\\'),
                        // Escaped newline is a line continuation.
                        Some(b'\n') => {}
                        Some(_) => {
                            // Keep unknown escapes literally; step over the whole char.
                            let c = self.src[self.pos..]
                                .chars()
                                .next()
                                .ok_or_else(|| Error::decode("bad escape", self.pos))?;
                            out.push(c);
                            self.pos += c.len_utf8();
                            run = self.pos;
                            continue;
                        }
                        None => break,
                    }
                    self.pos += 1;
                    run = self.pos;
                }
                _ => self.pos += 1,
            }
        }
        Err(Error::decode("unterminated string", start))
    }

    fn atom(&mut self) -> Result<Sexp> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_delimiter(b) {
                break;
            }
            self.pos += 1;
        }
        let token = &self.src[start..self.pos];
        if token.is_empty() {
            return Err(Error::decode("unexpected character", start));
        }
        Ok(classify(token))
    }
}

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'(' | b')' | b'"' | b';')
}

fn classify(token: &str) -> Sexp {
    if looks_numeric(token) {
        if let Ok(n) = token.parse::<i64>() {
            return Sexp::Integer(n);
        }
        if let Ok(x) = token.parse::<f64>() {
            return Sexp::Float(x);
        }
    }
    Sexp::Symbol(token.to_string())
}

/// Only tokens starting with a digit, or a sign/dot followed by a digit, are
/// numbers; `inf`, `nan` and friends stay symbols.
fn looks_numeric(token: &str) -> bool {
    let bytes = token.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_digit() => true,
        Some(b'-' | b'+' | b'.') => bytes.get(1).is_some_and(|b| b.is_ascii_digit() || *b == b'.'),
        _ => false,
    }
}
