//! Scalar and vector argument grammar.
//!
//! Every type here has a strict parse and a canonical format, and the pair
//! round-trips: `parse(format(v)) == v` for all values, and `format(parse(s))`
//! is the canonicalization of `s` for all accepted `s`.
//!
//! Floats match `^-?\d+(\.\d+)?$`: no NaN, no infinities, no exponent, no
//! leading `+`. Vectors are parenthesized with single-space canonical
//! separators; HT is never whitespace inside a parameter (it separates
//! parameters), so only 0x20 counts.

use glam::{Vec2, Vec3};

/// Parse a float per the wire grammar.
pub fn parse_float(s: &str) -> Option<f32> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let (int, frac) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    if int.is_empty() || !int.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(frac) = frac {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    // The grammar guarantees str::parse cannot see NaN/inf/exponent forms;
    // huge literals saturate to infinity, which the grammar cannot express,
    // so they are rejected rather than silently clamped.
    let value: f32 = s.parse().ok()?;
    value.is_finite().then_some(value)
}

/// Canonical float formatting: shortest decimal form, never exponent.
///
/// Rust's `Display` for `f32` already never produces exponent notation and
/// picks the shortest digits that round-trip.
pub fn format_float(value: f32) -> String {
    debug_assert!(value.is_finite());
    let mut s = format!("{value}");
    // `-0` normalizes to `0`; the grammar has no signed zero.
    if s == "-0" {
        s.truncate(0);
        s.push('0');
    }
    s
}

/// Split the interior of a vector literal on runs of spaces.
fn vector_components(s: &str) -> Option<Vec<&str>> {
    let inner = s.strip_prefix('(')?.strip_suffix(')')?;
    // Only 0x20 separates components; anything else must belong to a float
    // literal and is rejected by the component parse.
    Some(inner.split(' ').filter(|p| !p.is_empty()).collect())
}

/// Parse a `vec2`: `(x y)` with optional padding spaces.
pub fn parse_vec2(s: &str) -> Option<Vec2> {
    let parts = vector_components(s)?;
    if parts.len() != 2 {
        return None;
    }
    Some(Vec2::new(parse_float(parts[0])?, parse_float(parts[1])?))
}

/// Parse a `vec3`: `(x y z)` with optional padding spaces.
pub fn parse_vec3(s: &str) -> Option<Vec3> {
    let parts = vector_components(s)?;
    if parts.len() != 3 {
        return None;
    }
    Some(Vec3::new(parse_float(parts[0])?, parse_float(parts[1])?, parse_float(parts[2])?))
}

/// Canonical `vec2` formatting: `(x y)`.
pub fn format_vec2(v: Vec2) -> String {
    format!("({} {})", format_float(v.x), format_float(v.y))
}

/// Canonical `vec3` formatting: `(x y z)`.
pub fn format_vec3(v: Vec3) -> String {
    format!("({} {} {})", format_float(v.x), format_float(v.y), format_float(v.z))
}

/// A 24-bit sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Parse `#RRGGBB`, hex case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }
}

impl std::fmt::Display for Color {
    /// Canonical form is lowercase hex.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Parse `bytes[N]`: exactly `2N` hex characters, either case.
pub fn parse_bytes<const N: usize>(s: &str) -> Option<[u8; N]> {
    if s.len() != 2 * N {
        return None;
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(s, &mut out).ok()?;
    Some(out)
}

/// Canonical `bytes[N]` formatting: lowercase hex. This is also the form
/// used as Ed25519 signing input for nonces.
pub fn format_bytes(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Parse a `bool`: exactly `true` or `false`.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Format a `bool`.
pub fn format_bool(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_grammar() {
        assert_eq!(parse_float("0"), Some(0.0));
        assert_eq!(parse_float("-12.5"), Some(-12.5));
        assert_eq!(parse_float("3.125"), Some(3.125));
        for bad in ["+1", "1.", ".5", "1e3", "NaN", "inf", "-", "1.2.3", "0x10", " 1"] {
            assert_eq!(parse_float(bad), None, "{bad}");
        }
    }

    #[test]
    fn float_canonicalizes() {
        assert_eq!(format_float(parse_float("5.10").unwrap()), "5.1");
        assert_eq!(format_float(parse_float("007").unwrap()), "7");
        assert_eq!(format_float(parse_float("-0").unwrap()), "0");
    }

    #[test]
    fn vec3_grammar() {
        assert_eq!(parse_vec3("(0 0 0)"), Some(Vec3::ZERO));
        assert_eq!(parse_vec3("( 1  2   3 )"), Some(Vec3::new(1.0, 2.0, 3.0)));
        for bad in ["(1 2)", "(1 2 3", "1 2 3", "(1\t2 3)", "(1 2 3 4)", "(a b c)"] {
            assert_eq!(parse_vec3(bad), None, "{bad}");
        }
    }

    #[test]
    fn vec3_canonical_form() {
        let v = parse_vec3("( -1 0.5  2 )").unwrap();
        assert_eq!(format_vec3(v), "(-1 0.5 2)");
    }

    #[test]
    fn color_round_trip() {
        let c = Color::parse("#A1b2C3").unwrap();
        assert_eq!(c, Color { r: 0xa1, g: 0xb2, b: 0xc3 });
        assert_eq!(c.to_string(), "#a1b2c3");
        assert!(Color::parse("#12345").is_none());
        assert!(Color::parse("123456").is_none());
        assert!(Color::parse("#12345g").is_none());
    }

    #[test]
    fn bytes_either_case_canonical_lower() {
        let parsed = parse_bytes::<4>("A1B2c3d4").unwrap();
        assert_eq!(format_bytes(&parsed), "a1b2c3d4");
        assert!(parse_bytes::<4>("a1b2c3").is_none());
        assert!(parse_bytes::<4>("a1b2c3dg").is_none());
    }
}
