//! Stateless 3D vector helpers used by the orientation engine.
//!
//! Rotations are right-handed and take angles in radians. Each `rotate_*`
//! mutates the vector in place and hands it back so calls can be chained.

use glam::DVec3;
use std::f64::consts::PI;

/// Rotate `vec` about the X axis.
pub fn rotate_x(vec: &mut DVec3, angle: f64) -> &mut DVec3 {
    let (sin, cos) = angle.sin_cos();
    let (y, z) = (vec.y, vec.z);
    vec.y = y * cos - z * sin;
    vec.z = y * sin + z * cos;
    vec
}

/// Rotate `vec` about the Y axis.
pub fn rotate_y(vec: &mut DVec3, angle: f64) -> &mut DVec3 {
    let (sin, cos) = angle.sin_cos();
    let (x, z) = (vec.x, vec.z);
    vec.z = z * cos - x * sin;
    vec.x = z * sin + x * cos;
    vec
}

/// Rotate `vec` about the Z axis.
pub fn rotate_z(vec: &mut DVec3, angle: f64) -> &mut DVec3 {
    let (sin, cos) = angle.sin_cos();
    let (x, y) = (vec.x, vec.y);
    vec.x = x * cos - y * sin;
    vec.y = x * sin + y * cos;
    vec
}

/// Component-wise `a - b`.
pub fn difference(a: DVec3, b: DVec3) -> DVec3 {
    a - b
}

/// Euclidean norm.
pub fn magnitude(v: DVec3) -> f64 {
    v.length()
}

/// Wrap an angle in degrees into `[0, 360)`.
///
/// Negative inputs wrap as a true modulo (`-90` becomes `270`).
pub fn normalize_to_360(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Quadrant fix-up applied to `atan2(y, x)` results before earth-frame rotation.
///
/// Only the two left-half-plane cases are adjusted; everything else passes through.
pub fn fix_atan_quadrant(angle: f64, y: f64, x: f64) -> f64 {
    if x < 0.0 && y > 0.0 {
        PI - angle
    } else if x < 0.0 && y < 0.0 {
        PI + angle
    } else {
        angle
    }
}

/// Rotate a deviation vector into the frame where `gravity` points along +Z.
///
/// First undoes the gravity vector's heading about Z, then its tilt about Y.
pub fn earth_frame_rotate(diff: DVec3, gravity: DVec3) -> DVec3 {
    let mut rotated = diff;
    let mut gravity = gravity;

    let dz = fix_atan_quadrant(gravity.y.atan2(gravity.x), gravity.y, gravity.x);
    rotate_z(&mut rotated, -dz);
    rotate_z(&mut gravity, -dz);

    let dy = fix_atan_quadrant(gravity.x.atan2(gravity.z), gravity.x, gravity.z);
    rotate_y(&mut rotated, -dy);

    rotated
}
