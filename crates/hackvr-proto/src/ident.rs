//! Identifiers, tags, and user ids.
//!
//! Identifiers are dash-grouped ASCII names (`door-north-01`). The dash is a
//! structural delimiter: selectors match and expand over whole parts, never
//! substrings. Reserved identifiers begin with `$` and only protocol-defined
//! values exist; anything else starting with `$` is a type error.

use std::fmt;

/// Protocol-defined reserved identifiers (without the `$` prefix).
///
/// `$global`/`$camera` are scene entities, `$anonymous` is a userid, the
/// remainder are predefined intents.
pub const RESERVED: &[&str] =
    &["global", "camera", "anonymous", "forward", "back", "left", "right", "up", "down", "stop"];

/// The root scene object and default parent.
pub const GLOBAL: &str = "$global";

/// The viewpoint object.
pub const CAMERA: &str = "$camera";

/// The default user identity.
pub const ANONYMOUS: &str = "$anonymous";

/// A validated identifier: `^[A-Za-z0-9_]+(-[A-Za-z0-9_]+)*$`, or `$` plus a
/// protocol-defined reserved name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    /// Parse an identifier, rejecting malformed and unknown-reserved names.
    pub fn parse(s: &str) -> Result<Self, IdentError> {
        if let Some(reserved) = s.strip_prefix('$') {
            if RESERVED.contains(&reserved) {
                return Ok(Self(s.to_owned()));
            }
            return Err(IdentError::UnknownReserved);
        }
        if is_plain_ident(s) { Ok(Self(s.to_owned())) } else { Err(IdentError::Malformed) }
    }

    /// The identifier as written on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a `$`-reserved identifier.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.0.starts_with('$')
    }

    /// Dash-separated parts. Reserved identifiers are a single part.
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.split('-')
    }

    /// The `$global` identifier.
    #[must_use]
    pub fn global() -> Self {
        Self(GLOBAL.to_owned())
    }

    /// The `$camera` identifier.
    #[must_use]
    pub fn camera() -> Self {
        Self(CAMERA.to_owned())
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why an identifier failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentError {
    /// Does not match the identifier grammar.
    Malformed,
    /// Starts with `$` but is not a protocol-defined reserved name.
    UnknownReserved,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether `s` matches the plain (non-reserved) identifier grammar.
#[must_use]
pub fn is_plain_ident(s: &str) -> bool {
    !s.is_empty() && s.split('-').all(|part| !part.is_empty() && part.chars().all(is_ident_char))
}

/// A triangle tag. Same dash-part grammar as identifiers, no reserved forms.
///
/// The empty tag is represented as `Option<Tag>::None` at the schema level:
/// an untagged triangle can never be referenced by `remove-triangles`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(String);

impl Tag {
    /// Parse a non-empty tag.
    pub fn parse(s: &str) -> Result<Self, IdentError> {
        if is_plain_ident(s) { Ok(Self(s.to_owned())) } else { Err(IdentError::Malformed) }
    }

    /// The tag as written on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dash-separated parts.
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.split('-')
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maximum userid length in code points.
pub const USERID_MAX_CODEPOINTS: usize = 127;

/// A user identity: UTF-8, at most 127 code points, no LF, no leading or
/// trailing Unicode `White_Space`. The reserved value is [`ANONYMOUS`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    /// Parse and validate a userid.
    pub fn parse(s: &str) -> Result<Self, UserIdError> {
        if s.is_empty() {
            return Err(UserIdError::Empty);
        }
        if s.chars().count() > USERID_MAX_CODEPOINTS {
            return Err(UserIdError::TooLong);
        }
        if s.contains('\n') {
            return Err(UserIdError::ContainsNewline);
        }
        // char::is_whitespace is the Unicode White_Space property.
        if s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) {
            return Err(UserIdError::EdgeWhitespace);
        }
        if s.starts_with('$') && s != ANONYMOUS {
            return Err(UserIdError::UnknownReserved);
        }
        Ok(Self(s.to_owned()))
    }

    /// The `$anonymous` identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(ANONYMOUS.to_owned())
    }

    /// Whether this is the `$anonymous` identity.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS
    }

    /// The userid as written on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a userid failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIdError {
    /// Empty string.
    Empty,
    /// More than [`USERID_MAX_CODEPOINTS`] code points.
    TooLong,
    /// Contains a line feed.
    ContainsNewline,
    /// Leading or trailing Unicode whitespace.
    EdgeWhitespace,
    /// Starts with `$` but is not `$anonymous`.
    UnknownReserved,
}
