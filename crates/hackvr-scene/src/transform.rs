//! Rotation conventions and the transform chain.
//!
//! Coordinate frame: +X right, +Y up, −Z forward (right-handed).
//!
//! The world transform of an object `O` with parent `P` is
//!
//! ```text
//! T_world(O) = T_world(P) ∘ Translate(pos) ∘ R_track ∘ R_local ∘ Scale(scale)
//! ```
//!
//! where `∘` composes operators, `(A ∘ B)·v = A·(B·v)`: the left operand
//! applies *after* the right operand on a column vector. `glam`'s `*` on
//! `Affine3A`/`Quat` has exactly this convention, so the chain is written as
//! a plain product.
//!
//! Euler rotations are degrees in pan/tilt/roll order with axes named by
//! effect:
//!
//! - pan about local up, positive turns right
//! - tilt about local left (−right), positive looks up
//! - roll about local forward, positive tilts the head right
//!
//! They compose as successive operations on the vector (roll first, then
//! tilt, then pan: `R = R_pan · R_tilt · R_roll`. Rotations are converted to
//! quaternions at storage time so blending slerps instead of wrapping
//! degrees through gimbal lock.

use glam::{Affine3A, Quat, Vec3};

/// Convert Euler pan/tilt/roll degrees into a quaternion.
#[must_use]
pub fn euler_deg_to_quat(euler: Vec3) -> Quat {
    let (pan, tilt, roll) = (euler.x.to_radians(), euler.y.to_radians(), euler.z.to_radians());
    // Positive pan turns right = negative rotation about +Y; positive roll
    // tilts the head right = negative rotation about +Z. Positive tilt
    // looks up = positive rotation about +X.
    Quat::from_rotation_y(-pan) * Quat::from_rotation_x(tilt) * Quat::from_rotation_z(-roll)
}

/// Compose one object's local step of the transform chain.
#[must_use]
pub fn local_step(pos: Vec3, track: Quat, local: Quat, scale: Vec3) -> Affine3A {
    Affine3A::from_translation(pos)
        * Affine3A::from_quat(track)
        * Affine3A::from_quat(local)
        * Affine3A::from_scale(scale)
}

/// Shortest-arc spherical interpolation.
///
/// `glam::Quat::slerp` already takes the shorter arc by flipping the
/// hemisphere when the dot product is negative; near `tilt = ±90°` the
/// winner of that flip is unspecified beyond shortest-arc.
#[must_use]
pub fn blend_rotation(from: Quat, to: Quat, k: f32) -> Quat {
    from.slerp(to, k.clamp(0.0, 1.0))
}

/// Rotation aiming local forward (−Z) at `dir`, keeping local up close to
/// +Y. Falls back to a +Z up-hint when `dir` is within about a degree of
/// vertical, where the +Y hint is degenerate.
#[must_use]
pub fn aim_focus(dir: Vec3) -> Quat {
    let Some(forward) = dir.try_normalize() else {
        return Quat::IDENTITY;
    };
    let up_hint = if forward.y.abs() > 0.999_8 { Vec3::Z } else { Vec3::Y };
    let z_axis = -forward;
    let x_axis = up_hint.cross(z_axis).normalize();
    let y_axis = z_axis.cross(x_axis);
    Quat::from_mat3(&glam::Mat3::from_cols(x_axis, y_axis, z_axis))
}

/// Rotation about local up (+Y) aiming forward at the projection of `dir`
/// onto the horizontal plane. Identity when `dir` is vertical.
#[must_use]
pub fn aim_plane(dir: Vec3) -> Quat {
    let flat = Vec3::new(dir.x, 0.0, dir.z);
    if flat.try_normalize().is_none() {
        return Quat::IDENTITY;
    }
    // R_y(θ)·(0,0,-1) = (-sin θ, 0, -cos θ); solve for θ.
    Quat::from_rotation_y(f32::atan2(-flat.x, -flat.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{a} != {b}");
    }

    #[test]
    fn positive_pan_turns_right() {
        let q = euler_deg_to_quat(Vec3::new(90.0, 0.0, 0.0));
        assert_close(q * Vec3::NEG_Z, Vec3::X);
    }

    #[test]
    fn positive_tilt_looks_up() {
        let q = euler_deg_to_quat(Vec3::new(0.0, 90.0, 0.0));
        assert_close(q * Vec3::NEG_Z, Vec3::Y);
    }

    #[test]
    fn positive_roll_tilts_head_right() {
        let q = euler_deg_to_quat(Vec3::new(0.0, 0.0, 90.0));
        assert_close(q * Vec3::Y, Vec3::X);
    }

    #[test]
    fn roll_is_innermost() {
        // Pan by 90° then roll: the roll axis must have turned with the pan.
        let q = euler_deg_to_quat(Vec3::new(90.0, 0.0, 90.0));
        // Facing +X after pan; head tips toward old facing (−Z is "right"
        // when looking down +X... verify via composition instead).
        let by_hand = euler_deg_to_quat(Vec3::new(90.0, 0.0, 0.0))
            * euler_deg_to_quat(Vec3::new(0.0, 0.0, 90.0));
        assert!(q.angle_between(by_hand) < 1e-4);
    }

    #[test]
    fn chain_order_scales_before_rotating() {
        let step = local_step(
            Vec3::new(10.0, 0.0, 0.0),
            Quat::IDENTITY,
            euler_deg_to_quat(Vec3::new(90.0, 0.0, 0.0)),
            Vec3::splat(2.0),
        );
        // (0,0,-1): scaled to (0,0,-2), panned right to (2,0,0), translated.
        assert_close(step.transform_point3(Vec3::NEG_Z), Vec3::new(12.0, 0.0, 0.0));
    }

    #[test]
    fn focus_aims_forward_at_target() {
        let q = aim_focus(Vec3::new(1.0, 0.0, 0.0));
        assert_close(q * Vec3::NEG_Z, Vec3::X);
        assert_close(q * Vec3::Y, Vec3::Y);
    }

    #[test]
    fn focus_near_vertical_stays_finite() {
        let q = aim_focus(Vec3::Y);
        assert_close(q * Vec3::NEG_Z, Vec3::Y);
        assert!(q.is_normalized());
    }

    #[test]
    fn plane_ignores_vertical_component() {
        let q = aim_plane(Vec3::new(1.0, 5.0, 0.0));
        assert_close(q * Vec3::NEG_Z, Vec3::X);
        let vertical = aim_plane(Vec3::Y);
        assert_eq!(vertical, Quat::IDENTITY);
    }

    #[test]
    fn zero_direction_is_identity() {
        assert_eq!(aim_focus(Vec3::ZERO), Quat::IDENTITY);
    }
}
