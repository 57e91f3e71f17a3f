//! Error types for the wire layer.
//!
//! Three error families with different blast radii: framing violations
//! (byte-stream level, recoverable after resynchronization), argument parse
//! errors (single value), and command errors (whole line). During
//! establishment all three are fatal; afterwards each drops exactly one
//! command instance.

use thiserror::Error;

/// A violation detected while splitting the byte stream into frames.
///
/// After any violation the framer discards input until the next CRLF
/// boundary and resumes. Exactly one violation is reported per bad frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingViolation {
    /// Frame exceeded the maximum size (terminator included).
    #[error("frame exceeds {max} bytes")]
    Overlong {
        /// Configured maximum frame size in bytes.
        max: usize,
    },

    /// A CR byte appeared without an immediately following LF.
    #[error("stray CR inside frame")]
    StrayCarriageReturn,

    /// A forbidden C0/C1 control byte appeared inside a frame.
    #[error("forbidden control character {codepoint:#04x} inside frame")]
    ForbiddenControl {
        /// The offending code point.
        codepoint: u32,
    },

    /// Frame bytes were not valid UTF-8.
    #[error("invalid UTF-8 inside frame")]
    InvalidUtf8,
}

/// A typed-argument parse failure.
///
/// Carries the expected type name and the position so drivers can trace
/// dropped commands without echoing attacker-controlled bytes into logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("argument {index} is not a valid {expected}")]
pub struct ArgError {
    /// Zero-based argument position (command name excluded).
    pub index: usize,
    /// Human-readable type name, e.g. `"vec3"` or `"bytes[16]"`.
    pub expected: &'static str,
}

/// Reasons a whole command line is rejected.
///
/// Post-establishment these are *optimistic* errors: the single command is
/// dropped and the stream continues. During establishment any of them closes
/// the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The command name is not in the catalog.
    #[error("unknown command {name:?}")]
    UnknownCommand {
        /// The unrecognized name (truncated to the frame limit by framing).
        name: String,
    },

    /// The command exists but is not valid in this direction.
    #[error("command {name:?} is not valid in this direction")]
    WrongDirection {
        /// The command name.
        name: &'static str,
    },

    /// Too few or too many arguments for the schema.
    #[error("command {name:?} takes {expected} arguments, got {got}")]
    ArgCount {
        /// The command name.
        name: &'static str,
        /// Human-readable arity description, e.g. `"2"` or `"at least 6"`.
        expected: &'static str,
        /// Number of arguments present on the wire.
        got: usize,
    },

    /// A typed argument failed to parse.
    #[error(transparent)]
    Arg(#[from] ArgError),

    /// A selector used `*` or `?` in a create-family position.
    #[error("wildcard selector in create command")]
    WildcardInCreate,

    /// A selector expansion exceeded the configured cap.
    #[error("selector expands to {got} values, cap is {cap}")]
    OverExpansion {
        /// Number of concrete values the expansion would produce.
        got: usize,
        /// Configured cap.
        cap: usize,
    },

    /// An encoded line would exceed the maximum frame size.
    #[error("encoded frame exceeds {max} bytes")]
    FrameTooLong {
        /// Maximum frame size in bytes, terminator included.
        max: usize,
    },
}
