//! Round-trip properties for the typed argument codec.
//!
//! `parse(format(v)) == v` for every value, and `format(parse(s))` is the
//! canonicalization of accepted input.

use glam::Vec3;
use hackvr_proto::{Color, SessionToken, args};
use proptest::prelude::*;

/// Finite floats the wire grammar can express (no exponent on output means
/// any finite f32 works; Display never emits exponent notation).
fn wire_float() -> impl Strategy<Value = f32> {
    (-1.0e6f32..1.0e6).prop_map(|f| if f == -0.0 { 0.0 } else { f })
}

proptest! {
    #[test]
    fn float_round_trips(value in wire_float()) {
        let wire = args::format_float(value);
        prop_assert_eq!(args::parse_float(&wire), Some(value));
    }

    #[test]
    fn vec3_round_trips(x in wire_float(), y in wire_float(), z in wire_float()) {
        let v = Vec3::new(x, y, z);
        let wire = args::format_vec3(v);
        prop_assert_eq!(args::parse_vec3(&wire), Some(v));
    }

    #[test]
    fn color_round_trips(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
        let c = Color { r, g, b };
        prop_assert_eq!(Color::parse(&c.to_string()), Some(c));
    }

    #[test]
    fn color_canonicalizes_case(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
        let upper = format!("#{r:02X}{g:02X}{b:02X}");
        let parsed = Color::parse(&upper).expect("uppercase accepted");
        prop_assert_eq!(parsed.to_string(), upper.to_lowercase());
    }

    #[test]
    fn bytes16_round_trips(raw in any::<[u8; 16]>()) {
        let wire = args::format_bytes(&raw);
        prop_assert_eq!(args::parse_bytes::<16>(&wire), Some(raw));
        // Uppercase input canonicalizes to the same value.
        prop_assert_eq!(args::parse_bytes::<16>(&wire.to_uppercase()), Some(raw));
    }

    #[test]
    fn token_round_trips(raw in any::<[u8; 32]>()) {
        let token = SessionToken::from_bytes(raw);
        prop_assert_eq!(SessionToken::parse(&token.to_string()), Some(token));
    }
}
