//! Length-prefixed framing for mu server responses.
//!
//! # Wire Format
//!
//! ```text
//! 0xFE <lowercase hex length> 0xFF <length bytes of s-expression text>
//! ```
//!
//! Several frames may arrive back to back in one read, and a frame may be split
//! across reads. [`take_frame`] pulls at most one complete frame off the front of
//! an accumulating buffer and leaves everything else in place.

use std::borrow::Cow;

/// First byte of every frame.
pub const MARK_LO: u8 = 0xFE;
/// Byte terminating the hex length prefix.
pub const MARK_HI: u8 = 0xFF;

/// Maximum payload size (100MB) to prevent OOM from a misbehaving server.
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Outcome of trying to take one frame off the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStatus {
    /// A full frame was removed from the buffer; this is its payload.
    Complete(Vec<u8>),
    /// The buffer starts a frame but more bytes are needed. Buffer untouched.
    Incomplete,
    /// The buffer is empty or does not start with [`MARK_LO`]. Buffer untouched.
    NoFrame,
    /// The length prefix is unusable (no digits, non-hex byte, oversized).
    /// Buffer untouched.
    Malformed,
}

/// Take one complete frame from the front of `buf`.
///
/// Only a [`FrameStatus::Complete`] result modifies the buffer: the marker,
/// length prefix and payload are drained and any trailing bytes stay put for
/// the next call.
pub fn take_frame(buf: &mut Vec<u8>) -> FrameStatus {
    if buf.first() != Some(&MARK_LO) {
        return FrameStatus::NoFrame;
    }

    let mut count: usize = 0;
    let mut digits = 0;
    let mut header_end = None;
    for (i, &b) in buf.iter().enumerate().skip(1) {
        if b == MARK_HI {
            header_end = Some(i + 1);
            break;
        }
        let Some(d) = (b as char).to_digit(16) else {
            return FrameStatus::Malformed;
        };
        count = match count.checked_mul(16).and_then(|c| c.checked_add(d as usize)) {
            Some(c) if c <= MAX_FRAME_SIZE => c,
            _ => return FrameStatus::Malformed,
        };
        digits += 1;
    }

    let Some(start) = header_end else {
        return FrameStatus::Incomplete;
    };
    if digits == 0 {
        return FrameStatus::Malformed;
    }
    let end = start + count;
    if buf.len() < end {
        return FrameStatus::Incomplete;
    }

    let payload = buf[start..end].to_vec();
    buf.drain(..end);
    FrameStatus::Complete(payload)
}

/// Encode `payload` as a single wire frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let header = format!("{:x}", payload.len());
    let mut out = Vec::with_capacity(payload.len() + header.len() + 2);
    out.push(MARK_LO);
    out.extend_from_slice(header.as_bytes());
    out.push(MARK_HI);
    out.extend_from_slice(payload);
    out
}

/// Text of a payload ready for decoding: one trailing line terminator
/// (`\n` or `\r\n`) is dropped and invalid UTF-8 is replaced.
pub fn payload_text(payload: &[u8]) -> Cow<'_, str> {
    let trimmed = payload
        .strip_suffix(b"\r\n")
        .or_else(|| payload.strip_suffix(b"\n"))
        .unwrap_or(payload);
    String::from_utf8_lossy(trimmed)
}
