//! Wire protocol types for the mu server.
//!
//! Requests are single command lines written to the server's stdin; responses
//! are length-prefixed s-expressions read from its stdout:
//!
//! ```text
//! client ──▶ cmd:find query:"flag:unread" maxnum:10\n
//! client ◀── 0xFE 1f 0xFF (:docid 12 :subject "hello")\n
//! client ◀── 0xFE 0b 0xFF (:found 1)\n
//! ```
//!
//! - [`command`] renders requests
//! - [`frame`] splits the response stream into frames
//! - [`sexp`] decodes frame payloads
//! - [`normalize`] turns decoded trees into [`serde_json::Value`]s

pub mod command;
pub mod frame;
pub mod normalize;
pub mod sexp;

pub use command::{encode, Command, EncodedCommand, TIMEOUT_KEY};
pub use frame::{encode_frame, payload_text, take_frame, FrameStatus, MARK_HI, MARK_LO};
pub use normalize::{normalize, Normalize};
pub use sexp::{parse, parse_all, Sexp};

use serde_json::Value;

/// Decode one frame payload into a normalized value.
pub fn decode_payload(payload: &[u8]) -> crate::Result<Value> {
    let sexp = parse(&payload_text(payload))?;
    Ok(sexp.normalize())
}
