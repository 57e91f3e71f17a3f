//! Session tokens.
//!
//! A session token is an opaque 32-byte identifier carried on the wire as
//! base64url without padding (exactly 43 characters). Tokens identify a
//! session; they are not credentials. Equality is by decoded bytes, so two
//! encodings of the same bytes compare equal (base64url is canonical for a
//! fixed length, but the rule is stated in terms of bytes).

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

/// Decoded token length in bytes.
pub const TOKEN_LEN: usize = 32;

/// Encoded token length in characters.
pub const TOKEN_ENCODED_LEN: usize = 43;

/// A 32-byte session token.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken([u8; TOKEN_LEN]);

impl SessionToken {
    /// Wrap raw token bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; TOKEN_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse the wire form: base64url without padding, 43 characters.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != TOKEN_ENCODED_LEN {
            return None;
        }
        let decoded = URL_SAFE_NO_PAD.decode(s).ok()?;
        let bytes: [u8; TOKEN_LEN] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }

    /// The decoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for SessionToken {
    /// Tokens are session identifiers, but they still gate resumption:
    /// debug output shows a prefix only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({}…)", &self.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let token = SessionToken::from_bytes([7u8; 32]);
        let wire = token.to_string();
        assert_eq!(wire.len(), TOKEN_ENCODED_LEN);
        assert_eq!(SessionToken::parse(&wire), Some(token));
    }

    #[test]
    fn rejects_padding_and_wrong_length() {
        let wire = SessionToken::from_bytes([1u8; 32]).to_string();
        assert!(SessionToken::parse(&format!("{wire}=")).is_none());
        assert!(SessionToken::parse(&wire[..42]).is_none());
        assert!(SessionToken::parse("").is_none());
    }

    #[test]
    fn rejects_standard_alphabet() {
        // '+' and '/' are not in the url-safe alphabet.
        let mut wire = SessionToken::from_bytes([0xfb; 32]).to_string();
        wire.replace_range(0..1, "+");
        assert!(SessionToken::parse(&wire).is_none());
    }
}
