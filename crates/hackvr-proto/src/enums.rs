//! Closed enum arguments.
//!
//! Each wire enum parses from its exact keyword set and formats back to the
//! same keyword; no case folding.

use std::fmt;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $keyword:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Parse the wire keyword.
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $( $keyword => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// The wire keyword.
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $keyword, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Which pointer action produced a tap.
    TapKind {
        /// The primary pointer action (left click, trigger).
        Primary => "primary",
        /// The secondary pointer action (right click, grip).
        Secondary => "secondary",
    }
}

wire_enum! {
    /// How a sprite image maps onto its rectangle.
    SizeMode {
        /// Distort to fill the rectangle exactly.
        Stretch => "stretch",
        /// Scale preserving aspect so the rectangle is covered, cropping.
        Cover => "cover",
        /// Scale preserving aspect so the image fits inside, letterboxing.
        Contain => "contain",
        /// Match the rectangle width, derive height from the aspect.
        FixedWidth => "fixed-width",
        /// Match the rectangle height, derive width from the aspect.
        FixedHeight => "fixed-height",
    }
}

wire_enum! {
    /// Sprite origin convention: `{top,center,bottom}-{left,center,right}`.
    Anchor {
        /// Top-left corner.
        TopLeft => "top-left",
        /// Top edge midpoint.
        TopCenter => "top-center",
        /// Top-right corner.
        TopRight => "top-right",
        /// Left edge midpoint.
        CenterLeft => "center-left",
        /// Rectangle center.
        CenterCenter => "center-center",
        /// Right edge midpoint.
        CenterRight => "center-right",
        /// Bottom-left corner.
        BottomLeft => "bottom-left",
        /// Bottom edge midpoint.
        BottomCenter => "bottom-center",
        /// Bottom-right corner.
        BottomRight => "bottom-right",
    }
}

wire_enum! {
    /// How a tracking object aims at its target.
    TrackMode {
        /// Rotate about local up only; forward points at the target's
        /// projection onto the plane orthogonal to local up.
        Plane => "plane",
        /// Rotate local forward straight at the target, keeping local up
        /// as well as possible.
        Focus => "focus",
    }
}

wire_enum! {
    /// Whether reparenting preserves the world or the local transform.
    ReparentMode {
        /// Recompute the local transform so the world pose is unchanged.
        World => "world",
        /// Keep the local transform; the world pose moves with the parent.
        Local => "local",
    }
}

/// A protocol version: `v[1-9][0-9]*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u32);

impl Version {
    /// Version 1, the only version this implementation speaks.
    pub const V1: Self = Self(1);

    /// Parse `vN`.
    pub fn parse(s: &str) -> Option<Self> {
        let digits = s.strip_prefix('v')?;
        if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        digits.parse().ok().map(Self)
    }

    /// The numeric version.
    #[must_use]
    pub fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
