//! Geometry variants: triangle soup, image sprite, text sprite.
//!
//! A geometry id maps to exactly one variant for its whole lifetime;
//! variant mutation is rejected. Triangle soups hold tagged triangles (the
//! empty tag means "unreferenceable": such triangles can never be removed
//! or picked). Sprites are rectangles rendered as two implicit triangles;
//! their pick tag is derived from the pick position instead of being
//! authored.

use glam::Vec3;
use hackvr_proto::{AssetRef, Color, ListedTriangle, Selector, SizeMode, Tag};

/// Default cap on triangles per geometry.
pub const DEFAULT_TRIANGLE_CAP: usize = 100_000;

/// A tagged, colored triangle in a soup.
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    /// Tag shared by the authoring call; `None` is unreferenceable.
    pub tag: Option<Tag>,
    /// Face color.
    pub color: Color,
    /// Vertices in authoring order.
    pub vertices: [Vec3; 3],
}

/// Sprite placement fields shared by image and text sprites.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteRect {
    /// Rectangle width in local units.
    pub width: f32,
    /// Rectangle height in local units.
    pub height: f32,
    /// Which point of the rectangle sits at the local origin.
    pub anchor: hackvr_proto::Anchor,
    /// How the content maps onto the rectangle.
    pub size_mode: SizeMode,
}

/// An image sprite.
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    /// Placement.
    pub rect: SpriteRect,
    /// Image asset, content-addressed.
    pub image: AssetRef,
}

/// A text sprite.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSprite {
    /// Placement.
    pub rect: SpriteRect,
    /// Font asset, content-addressed.
    pub font: AssetRef,
    /// Current text.
    pub text: String,
    /// Foreground color.
    pub color: Color,
    /// Background color; `None` renders transparent.
    pub background: Option<Color>,
}

/// Default text sprite foreground.
pub const DEFAULT_TEXT_COLOR: Color = Color { r: 0xff, g: 0xff, b: 0xff };

/// One geometry: a tagged sum over the three variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Unordered bag of tagged triangles.
    Soup {
        /// The triangles.
        triangles: Vec<Triangle>,
    },
    /// Flat image rectangle.
    Sprite(Sprite),
    /// Flat text rectangle.
    Text(TextSprite),
}

impl Geometry {
    /// An empty triangle soup.
    #[must_use]
    pub fn empty_soup() -> Self {
        Self::Soup { triangles: Vec::new() }
    }

    /// Triangle count; sprites render as two implicit triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        match self {
            Self::Soup { triangles } => triangles.len(),
            Self::Sprite(_) | Self::Text(_) => 2,
        }
    }

    /// Append listed triangles sharing `tag`.
    ///
    /// Returns `false` (and appends nothing) when the geometry is not a
    /// soup or the result would exceed `cap`.
    pub fn add_list(&mut self, tag: Option<&Tag>, listed: &[ListedTriangle], cap: usize) -> bool {
        let Self::Soup { triangles } = self else {
            return false;
        };
        if triangles.len() + listed.len() > cap {
            return false;
        }
        triangles.extend(listed.iter().map(|t| Triangle {
            tag: tag.cloned(),
            color: t.color,
            vertices: t.vertices,
        }));
        true
    }

    /// Append a triangle strip: `(v[n-2], v[n-1], v[n])` per vertex after
    /// the seed triangle, all in one color.
    pub fn add_strip(
        &mut self,
        tag: Option<&Tag>,
        color: Color,
        vertices: &[Vec3],
        cap: usize,
    ) -> bool {
        self.add_sequence(tag, color, vertices, cap, |seq, n| [seq[n - 2], seq[n - 1], seq[n]])
    }

    /// Append a triangle fan: `(v[0], v[n-1], v[n])` per vertex after the
    /// seed triangle, all in one color.
    pub fn add_fan(
        &mut self,
        tag: Option<&Tag>,
        color: Color,
        vertices: &[Vec3],
        cap: usize,
    ) -> bool {
        self.add_sequence(tag, color, vertices, cap, |seq, n| [seq[0], seq[n - 1], seq[n]])
    }

    fn add_sequence(
        &mut self,
        tag: Option<&Tag>,
        color: Color,
        vertices: &[Vec3],
        cap: usize,
        pick: impl Fn(&[Vec3], usize) -> [Vec3; 3],
    ) -> bool {
        let Self::Soup { triangles } = self else {
            return false;
        };
        if vertices.len() < 3 {
            return false;
        }
        let added = vertices.len() - 2;
        if triangles.len() + added > cap {
            return false;
        }
        for n in 2..vertices.len() {
            triangles.push(Triangle { tag: tag.cloned(), color, vertices: pick(vertices, n) });
        }
        true
    }

    /// Remove triangles whose tag matches the selector.
    ///
    /// Untagged triangles never match, whatever the selector. Returns the
    /// number removed. Non-soup geometries have no tagged-triangle
    /// population, so the selector matches nothing.
    pub fn remove_triangles(&mut self, tag: &Selector) -> usize {
        let Self::Soup { triangles } = self else {
            return 0;
        };
        let before = triangles.len();
        triangles.retain(|t| !t.tag.as_ref().is_some_and(|existing| tag.matches(existing.as_str())));
        before - triangles.len()
    }

    /// Whether the variant carries mutable text.
    #[must_use]
    pub fn as_text_mut(&mut self) -> Option<&mut TextSprite> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// The implicit pick tag for a sprite: `"<X>-<Y>"` with X,Y in `[0,100]`.
///
/// `u` runs left→right and `v` top→bottom over the rectangle; out-of-range
/// inputs clamp. Every sprite pick therefore has a non-empty tag, which is
/// what makes sprites always tappable on clickable objects.
#[must_use]
pub fn sprite_pick_tag(u: f32, v: f32) -> Tag {
    let x = (u.clamp(0.0, 1.0) * 100.0).round() as u32;
    let y = (v.clamp(0.0, 1.0) * 100.0).round() as u32;
    // Two clamped integers joined by a dash always satisfy the tag grammar.
    #[allow(clippy::unwrap_used)]
    let tag = Tag::parse(&format!("{x}-{y}")).unwrap();
    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32, y: f32, z: f32) -> Vec3 {
        Vec3::new(x, y, z)
    }

    fn white() -> Color {
        Color { r: 255, g: 255, b: 255 }
    }

    fn tag(s: &str) -> Tag {
        Tag::parse(s).unwrap()
    }

    #[test]
    fn strip_winds_through_the_sequence() {
        let mut g = Geometry::empty_soup();
        let verts = [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0), v(1.0, 1.0, 0.0)];
        assert!(g.add_strip(None, white(), &verts, 100));
        let Geometry::Soup { triangles } = &g else { panic!() };
        assert_eq!(triangles.len(), 2);
        assert_eq!(triangles[0].vertices, [verts[0], verts[1], verts[2]]);
        assert_eq!(triangles[1].vertices, [verts[1], verts[2], verts[3]]);
    }

    #[test]
    fn fan_pivots_on_the_seed() {
        let mut g = Geometry::empty_soup();
        let verts = [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(1.0, 1.0, 0.0), v(0.0, 1.0, 0.0)];
        assert!(g.add_fan(None, white(), &verts, 100));
        let Geometry::Soup { triangles } = &g else { panic!() };
        assert_eq!(triangles[0].vertices, [verts[0], verts[1], verts[2]]);
        assert_eq!(triangles[1].vertices, [verts[0], verts[2], verts[3]]);
    }

    #[test]
    fn remove_by_tag_spares_untagged() {
        let mut g = Geometry::empty_soup();
        let verts = [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0)];
        g.add_strip(Some(&tag("floor-01")), white(), &verts, 100);
        g.add_strip(Some(&tag("wall")), white(), &verts, 100);
        g.add_strip(None, white(), &verts, 100);

        let removed = g.remove_triangles(&Selector::parse("floor-*").unwrap());
        assert_eq!(removed, 1);
        assert_eq!(g.triangle_count(), 2);

        // Bare * takes every *tagged* triangle, never the untagged one.
        let removed = g.remove_triangles(&Selector::parse("*").unwrap());
        assert_eq!(removed, 1);
        assert_eq!(g.triangle_count(), 1);
    }

    #[test]
    fn cap_rejects_whole_call() {
        let mut g = Geometry::empty_soup();
        let verts = [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0), v(1.0, 1.0, 0.0)];
        assert!(!g.add_strip(None, white(), &verts, 1));
        assert_eq!(g.triangle_count(), 0);
    }

    #[test]
    fn pick_tags_cover_the_grid() {
        assert_eq!(sprite_pick_tag(0.0, 0.0).as_str(), "0-0");
        assert_eq!(sprite_pick_tag(1.0, 1.0).as_str(), "100-100");
        assert_eq!(sprite_pick_tag(0.504, 0.25).as_str(), "50-25");
        assert_eq!(sprite_pick_tag(-3.0, 7.0).as_str(), "0-100");
    }
}
