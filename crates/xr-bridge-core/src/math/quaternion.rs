//! Unit quaternions for orientations
//!
//! Composition renormalizes, so orientations built up one sensor reading at a
//! time stay unit length.

use super::Vector3D;
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// A rotation `(x, y, z, w)` with `w` the scalar part
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    fn from_parts(vector: Vector3D, scalar: f32) -> Self {
        Self::new(vector.x, vector.y, vector.z, scalar)
    }

    fn vector(&self) -> Vector3D {
        Vector3D::new(self.x, self.y, self.z)
    }

    /// Right-handed rotation of `angle_radians` about `axis`
    pub fn from_axis_angle(axis: Vector3D, angle_radians: f32) -> Self {
        let (sin, cos) = (angle_radians * 0.5).sin_cos();
        Self::from_parts(axis.normalize() * sin, cos)
    }

    /// Euler angles in radians about X, Y and Z, composed in Y-X'-Z'' order.
    ///
    /// Device-orientation readings map onto this as `(beta, alpha, -gamma)`.
    pub fn from_euler_yxz(x: f32, y: f32, z: f32) -> Self {
        let (sx, cx) = (x * 0.5).sin_cos();
        let (sy, cy) = (y * 0.5).sin_cos();
        let (sz, cz) = (z * 0.5).sin_cos();

        Self::new(
            sx * cy * cz + cx * sy * sz,
            cx * sy * cz - sx * cy * sz,
            cx * cy * sz - sx * sy * cz,
            cx * cy * cz + sx * sy * sz,
        )
    }

    /// Rotation held in the upper 3x3 block of a column-major matrix
    pub fn from_rotation_matrix(m: &[f32; 16]) -> Self {
        // m[col * 4 + row]
        let at = |row: usize, col: usize| m[col * 4 + row];
        let trace = at(0, 0) + at(1, 1) + at(2, 2);

        let q = if trace > 0.0 {
            let s = 2.0 * (trace + 1.0).sqrt();
            Self::new(
                (at(2, 1) - at(1, 2)) / s,
                (at(0, 2) - at(2, 0)) / s,
                (at(1, 0) - at(0, 1)) / s,
                0.25 * s,
            )
        } else if at(0, 0) > at(1, 1) && at(0, 0) > at(2, 2) {
            let s = 2.0 * (1.0 + at(0, 0) - at(1, 1) - at(2, 2)).sqrt();
            Self::new(
                0.25 * s,
                (at(0, 1) + at(1, 0)) / s,
                (at(0, 2) + at(2, 0)) / s,
                (at(2, 1) - at(1, 2)) / s,
            )
        } else if at(1, 1) > at(2, 2) {
            let s = 2.0 * (1.0 + at(1, 1) - at(0, 0) - at(2, 2)).sqrt();
            Self::new(
                (at(0, 1) + at(1, 0)) / s,
                0.25 * s,
                (at(1, 2) + at(2, 1)) / s,
                (at(0, 2) - at(2, 0)) / s,
            )
        } else {
            let s = 2.0 * (1.0 + at(2, 2) - at(0, 0) - at(1, 1)).sqrt();
            Self::new(
                (at(0, 2) + at(2, 0)) / s,
                (at(1, 2) + at(2, 1)) / s,
                0.25 * s,
                (at(1, 0) - at(0, 1)) / s,
            )
        };

        q.normalize()
    }

    pub fn dot(&self, other: &Quaternion) -> f32 {
        self.vector().dot(&other.vector()) + self.w * other.w
    }

    pub fn magnitude(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit-length copy; degenerate input collapses to identity
    pub fn normalize(&self) -> Self {
        let magnitude = self.magnitude();
        if magnitude > 0.0 && magnitude.is_finite() {
            Self::from_parts(self.vector() * magnitude.recip(), self.w / magnitude)
        } else {
            Self::IDENTITY
        }
    }

    /// Inverse rotation of a unit quaternion
    pub fn conjugate(&self) -> Self {
        Self::from_parts(-self.vector(), self.w)
    }

    /// Inverse of any non-zero quaternion, renormalized
    pub fn inverse(&self) -> Self {
        let norm = self.dot(self);
        if norm > 0.0 && norm.is_finite() {
            Self::from_parts(-self.vector() * norm.recip(), self.w / norm).normalize()
        } else {
            Self::IDENTITY
        }
    }

    /// Spherical interpolation along the shorter arc.
    ///
    /// `t == 0` and `t == 1` copy the endpoints without touching trig.
    pub fn slerp(&self, other: &Quaternion, t: f32) -> Self {
        if t == 0.0 {
            return *self;
        }
        if t == 1.0 {
            return *other;
        }

        let mut cos_theta = self.dot(other);
        let mut target = *other;
        if cos_theta < 0.0 {
            target = Self::from_parts(-target.vector(), -target.w);
            cos_theta = -cos_theta;
        }

        let (a, b) = if cos_theta > 0.9995 {
            // Nearly parallel
            (1.0 - t, t)
        } else {
            let theta = cos_theta.acos();
            let sin_theta = theta.sin();
            (
                ((1.0 - t) * theta).sin() / sin_theta,
                (t * theta).sin() / sin_theta,
            )
        };
        Self::from_parts(
            self.vector() * a + target.vector() * b,
            self.w * a + target.w * b,
        )
        .normalize()
    }

    pub fn rotate_vector(&self, v: Vector3D) -> Vector3D {
        let axis = self.vector();
        let t = axis.cross(&v) * 2.0;
        v + t * self.w + axis.cross(&t)
    }

    /// Same rotation within `epsilon`; `q` and `-q` compare equal
    pub fn approx_same_rotation(&self, other: &Quaternion, epsilon: f32) -> bool {
        (self.dot(other).abs() - 1.0).abs() < epsilon
    }

    pub fn is_finite(&self) -> bool {
        self.vector().is_finite() && self.w.is_finite()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Quaternion {
    type Output = Quaternion;

    /// Hamilton product `self * rhs`: apply `rhs`, then `self`
    fn mul(self, rhs: Self) -> Self::Output {
        let (a, b) = (self.vector(), rhs.vector());
        Quaternion::from_parts(
            b * self.w + a * rhs.w + a.cross(&b),
            self.w * rhs.w - a.dot(&b),
        )
        .normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Matrix4;
    use std::f32::consts::PI;

    #[test]
    fn test_quarter_turn_left() {
        // FORWARD (-Z) turned a quarter about +Y faces -X
        let q = Quaternion::from_axis_angle(Vector3D::UP, PI / 2.0);
        let rotated = q.rotate_vector(Vector3D::FORWARD);
        assert!(rotated.distance(&Vector3D::new(-1.0, 0.0, 0.0)) < 1e-5);
    }

    #[test]
    fn test_conjugate_undoes_rotation() {
        let q = Quaternion::from_axis_angle(Vector3D::new(0.2, 1.0, -0.4), 1.1);
        let v = Vector3D::new(0.3, -2.0, 5.0);
        let back = q.conjugate().rotate_vector(q.rotate_vector(v));
        assert!(back.distance(&v) < 1e-5);
        assert!((q * q.conjugate()).approx_same_rotation(&Quaternion::IDENTITY, 1e-5));
    }

    #[test]
    fn test_degenerate_normalizes_to_identity() {
        assert_eq!(
            Quaternion::new(0.0, 0.0, 0.0, 0.0).normalize(),
            Quaternion::IDENTITY
        );
        assert_eq!(
            Quaternion::new(f32::NAN, 0.0, 0.0, 1.0).normalize(),
            Quaternion::IDENTITY
        );
    }

    #[test]
    fn test_repeated_multiplication_stays_unit() {
        let step = Quaternion::from_axis_angle(Vector3D::new(0.3, 1.0, 0.2), 0.013);
        let mut q = Quaternion::IDENTITY;
        for _ in 0..10_000 {
            q = q * step;
        }
        assert!((q.magnitude() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_inverse_of_unnormalized() {
        let q = Quaternion::new(0.0, 2.0, 0.0, 2.0);
        let product = q.normalize() * q.inverse();
        assert!(product.approx_same_rotation(&Quaternion::IDENTITY, 1e-5));
    }

    #[test]
    fn test_slerp_endpoints_and_midpoint() {
        let a = Quaternion::from_axis_angle(Vector3D::UP, 0.4);
        let b = Quaternion::from_axis_angle(Vector3D::UP, 1.2);
        assert_eq!(a.slerp(&b, 0.0), a);
        assert_eq!(a.slerp(&b, 1.0), b);

        let mid = a.slerp(&b, 0.5);
        let expected = Quaternion::from_axis_angle(Vector3D::UP, 0.8);
        assert!(mid.approx_same_rotation(&expected, 1e-5));
    }

    #[test]
    fn test_slerp_takes_shorter_arc() {
        let a = Quaternion::from_axis_angle(Vector3D::UP, 0.2);
        let b = Quaternion::from_axis_angle(Vector3D::UP, -0.2);
        let flipped = Quaternion::new(-b.x, -b.y, -b.z, -b.w);
        let mid = a.slerp(&flipped, 0.5);
        assert!(mid.approx_same_rotation(&Quaternion::IDENTITY, 1e-5));
    }

    #[test]
    fn test_euler_yaw_only_matches_axis_angle() {
        let yaw = Quaternion::from_euler_yxz(0.0, 0.7, 0.0);
        let expected = Quaternion::from_axis_angle(Vector3D::UP, 0.7);
        assert!(yaw.approx_same_rotation(&expected, 1e-6));
    }

    #[test]
    fn test_rotation_matrix_round_trip() {
        for (axis, angle) in [
            (Vector3D::new(1.0, 2.0, -0.5), 2.1),
            (Vector3D::RIGHT, PI * 0.95),
            (Vector3D::UP, PI * 0.95),
            (Vector3D::FORWARD, PI * 0.95),
        ] {
            let q = Quaternion::from_axis_angle(axis, angle);
            let m = Matrix4::from_rotation_translation(q, Vector3D::new(4.0, 5.0, 6.0));
            let back = Quaternion::from_rotation_matrix(&m.0);
            assert!(back.approx_same_rotation(&q, 1e-5), "{:?} {}", axis, angle);
        }
    }
}
