//! Incremental CRLF line framer.
//!
//! Splits an arbitrary sequence of byte chunks into frames. A frame ends at
//! the first CRLF; a bare LF never terminates (it is legal *inside* an
//! argument to carry a literal newline). The framer is a push parser: it
//! never assumes a single read delivers a whole line, and it resynchronizes
//! to the next CRLF boundary after a violation.
//!
//! # Invariants
//!
//! - Concatenating valid frames and feeding the bytes in arbitrary chunk
//!   sizes yields exactly that sequence of frames.
//! - Exactly one [`FramingViolation`] is reported per bad frame; subsequent
//!   valid frames are emitted intact.

use bytes::{Buf, BytesMut};

use crate::error::FramingViolation;

/// Maximum frame size in bytes, CRLF terminator included.
pub const MAX_FRAME_SIZE: usize = 1024;

/// Framer configuration.
#[derive(Debug, Clone)]
pub struct FramerConfig {
    /// Maximum frame size in bytes, terminator included.
    pub max_frame_size: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self { max_frame_size: MAX_FRAME_SIZE }
    }
}

/// Output of [`Framer::next_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramerEvent {
    /// A complete, validated frame (terminator stripped).
    Frame(String),

    /// A framing violation. The framer has already begun discarding to the
    /// next CRLF boundary; the caller decides whether it is fatal
    /// (establishment) or recoverable (steady state).
    Violation(FramingViolation),
}

/// Push parser splitting a byte stream into CRLF-terminated frames.
#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
    config: FramerConfig,
    /// Set after a violation: drop bytes until the next CRLF boundary
    /// without reporting again.
    discarding: bool,
}

impl Framer {
    /// Create a framer with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(FramerConfig::default())
    }

    /// Create a framer with an explicit configuration.
    #[must_use]
    pub fn with_config(config: FramerConfig) -> Self {
        Self { buf: BytesMut::new(), config, discarding: false }
    }

    /// Append received bytes. Call [`Framer::next_event`] until it returns
    /// `None` to drain everything that became complete.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next frame or violation, if one is complete.
    pub fn next_event(&mut self) -> Option<FramerEvent> {
        loop {
            match find_crlf(&self.buf) {
                Some(end) => {
                    // `end` is the index of the CR of the first CRLF.
                    let line = self.buf.split_to(end);
                    self.buf.advance(2);

                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }

                    match validate_frame(&line, end + 2, self.config.max_frame_size) {
                        Ok(frame) => return Some(FramerEvent::Frame(frame)),
                        Err(violation) => return Some(FramerEvent::Violation(violation)),
                    }
                }
                None => {
                    // No terminator yet. If the partial frame can no longer
                    // fit the limit, give up on it now so a missing CRLF
                    // cannot buffer unbounded garbage.
                    if !self.discarding && self.buf.len() >= self.config.max_frame_size {
                        self.discarding = true;
                        self.trim_discard_buffer();
                        return Some(FramerEvent::Violation(FramingViolation::Overlong {
                            max: self.config.max_frame_size,
                        }));
                    }
                    if self.discarding {
                        self.trim_discard_buffer();
                    }
                    return None;
                }
            }
        }
    }

    /// While discarding, only a trailing CR needs to be retained so a CRLF
    /// split across two reads is still recognized as the boundary.
    fn trim_discard_buffer(&mut self) {
        let keep = usize::from(self.buf.last() == Some(&b'\r'));
        let drop = self.buf.len() - keep;
        self.buf.advance(drop);
    }
}

/// Index of the CR of the first CRLF pair, if any.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Validate a terminator-stripped candidate frame.
///
/// `wire_len` is the on-wire length including CRLF, checked against the
/// frame size limit. Content rules: valid UTF-8, no bare CR (a CR not
/// directly followed by LF ends up inside the candidate, since only the
/// full pair terminates), and no `Cc` controls other than HT and LF.
fn validate_frame(
    line: &[u8],
    wire_len: usize,
    max_frame_size: usize,
) -> Result<String, FramingViolation> {
    if wire_len > max_frame_size {
        return Err(FramingViolation::Overlong { max: max_frame_size });
    }

    let text = std::str::from_utf8(line).map_err(|_| FramingViolation::InvalidUtf8)?;

    for ch in text.chars() {
        if ch == '\r' {
            return Err(FramingViolation::StrayCarriageReturn);
        }
        // char::is_control is exactly the Unicode Cc category.
        if ch.is_control() && ch != '\t' && ch != '\n' {
            return Err(FramingViolation::ForbiddenControl { codepoint: ch as u32 });
        }
    }

    Ok(text.to_owned())
}
