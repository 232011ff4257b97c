//! Column-major 4x4 affine matrices
//!
//! The free functions write into caller-supplied buffers and never allocate;
//! [`Matrix4`] wraps them for value-style use. Element `(row, col)` lives at
//! index `col * 4 + row`, translation at indices 12..15.

use super::{Quaternion, Vector3D};
use serde::{Deserialize, Serialize};

/// Determinants below this magnitude are treated as singular
const SINGULAR_EPSILON: f32 = 1e-12;

/// Write the identity matrix into `out`
pub fn identity(out: &mut [f32; 16]) {
    *out = [
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ];
}

/// `out = a * b`
pub fn multiply(out: &mut [f32; 16], a: &[f32; 16], b: &[f32; 16]) {
    for col in 0..4 {
        let b0 = b[col * 4];
        let b1 = b[col * 4 + 1];
        let b2 = b[col * 4 + 2];
        let b3 = b[col * 4 + 3];
        for row in 0..4 {
            out[col * 4 + row] = b0 * a[row] + b1 * a[4 + row] + b2 * a[8 + row] + b3 * a[12 + row];
        }
    }
}

/// Invert `m` into `out`.
///
/// Returns `false` and writes identity when `m` is singular or contains
/// non-finite values, so corruption never leaks into later frames.
pub fn invert(out: &mut [f32; 16], m: &[f32; 16]) -> bool {
    if m.iter().any(|v| !v.is_finite()) {
        identity(out);
        return false;
    }

    let (a00, a01, a02, a03) = (m[0], m[1], m[2], m[3]);
    let (a10, a11, a12, a13) = (m[4], m[5], m[6], m[7]);
    let (a20, a21, a22, a23) = (m[8], m[9], m[10], m[11]);
    let (a30, a31, a32, a33) = (m[12], m[13], m[14], m[15]);

    let b00 = a00 * a11 - a01 * a10;
    let b01 = a00 * a12 - a02 * a10;
    let b02 = a00 * a13 - a03 * a10;
    let b03 = a01 * a12 - a02 * a11;
    let b04 = a01 * a13 - a03 * a11;
    let b05 = a02 * a13 - a03 * a12;
    let b06 = a20 * a31 - a21 * a30;
    let b07 = a20 * a32 - a22 * a30;
    let b08 = a20 * a33 - a23 * a30;
    let b09 = a21 * a32 - a22 * a31;
    let b10 = a21 * a33 - a23 * a31;
    let b11 = a22 * a33 - a23 * a32;

    let det = b00 * b11 - b01 * b10 + b02 * b09 + b03 * b08 - b04 * b07 + b05 * b06;
    if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
        identity(out);
        return false;
    }
    let det = 1.0 / det;

    let result = [
        (a11 * b11 - a12 * b10 + a13 * b09) * det,
        (a02 * b10 - a01 * b11 - a03 * b09) * det,
        (a31 * b05 - a32 * b04 + a33 * b03) * det,
        (a22 * b04 - a21 * b05 - a23 * b03) * det,
        (a12 * b08 - a10 * b11 - a13 * b07) * det,
        (a00 * b11 - a02 * b08 + a03 * b07) * det,
        (a32 * b02 - a30 * b05 - a33 * b01) * det,
        (a20 * b05 - a22 * b02 + a23 * b01) * det,
        (a10 * b10 - a11 * b08 + a13 * b06) * det,
        (a01 * b08 - a00 * b10 - a03 * b06) * det,
        (a30 * b04 - a31 * b02 + a33 * b00) * det,
        (a21 * b02 - a20 * b04 - a23 * b00) * det,
        (a11 * b07 - a10 * b09 - a12 * b06) * det,
        (a00 * b09 - a01 * b07 + a02 * b06) * det,
        (a31 * b01 - a30 * b03 - a32 * b00) * det,
        (a20 * b03 - a21 * b01 + a22 * b00) * det,
    ];

    if result.iter().any(|v| !v.is_finite()) {
        identity(out);
        return false;
    }
    *out = result;
    true
}

/// Build a rigid transform from a rotation and a translation
pub fn from_rotation_translation(out: &mut [f32; 16], q: &Quaternion, t: &Vector3D) {
    let (x, y, z, w) = (q.x, q.y, q.z, q.w);
    let (x2, y2, z2) = (x + x, y + y, z + z);
    let (xx, xy, xz) = (x * x2, x * y2, x * z2);
    let (yy, yz, zz) = (y * y2, y * z2, z * z2);
    let (wx, wy, wz) = (w * x2, w * y2, w * z2);

    *out = [
        1.0 - (yy + zz),
        xy + wz,
        xz - wy,
        0.0,
        xy - wz,
        1.0 - (xx + zz),
        yz + wx,
        0.0,
        xz + wy,
        yz - wx,
        1.0 - (xx + yy),
        0.0,
        t.x,
        t.y,
        t.z,
        1.0,
    ];
}

/// GL-style perspective projection (`fovy` in radians)
pub fn perspective(out: &mut [f32; 16], fovy: f32, aspect: f32, near: f32, far: f32) {
    let f = 1.0 / (fovy / 2.0).tan();
    let nf = 1.0 / (near - far);
    *out = [0.0; 16];
    out[0] = f / aspect;
    out[5] = f;
    out[10] = (far + near) * nf;
    out[11] = -1.0;
    out[14] = 2.0 * far * near * nf;
}

/// Asymmetric projection from per-edge field-of-view angles in degrees
pub fn from_field_of_view(
    out: &mut [f32; 16],
    up_degrees: f32,
    down_degrees: f32,
    left_degrees: f32,
    right_degrees: f32,
    near: f32,
    far: f32,
) {
    let up = up_degrees.to_radians().tan();
    let down = down_degrees.to_radians().tan();
    let left = left_degrees.to_radians().tan();
    let right = right_degrees.to_radians().tan();
    let x_scale = 2.0 / (left + right);
    let y_scale = 2.0 / (up + down);

    *out = [0.0; 16];
    out[0] = x_scale;
    out[5] = y_scale;
    out[8] = -((left - right) * x_scale * 0.5);
    out[9] = (up - down) * y_scale * 0.5;
    out[10] = far / (near - far);
    out[11] = -1.0;
    out[14] = (far * near) / (near - far);
}

/// A column-major 4x4 matrix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix4(pub [f32; 16]);

impl Matrix4 {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub fn identity() -> Self {
        Self::IDENTITY
    }

    pub fn from_translation(t: Vector3D) -> Self {
        let mut m = Self::IDENTITY;
        m.0[12] = t.x;
        m.0[13] = t.y;
        m.0[14] = t.z;
        m
    }

    pub fn from_rotation_translation(q: Quaternion, t: Vector3D) -> Self {
        let mut out = [0.0; 16];
        from_rotation_translation(&mut out, &q, &t);
        Self(out)
    }

    pub fn perspective(fovy: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut out = [0.0; 16];
        perspective(&mut out, fovy, aspect, near, far);
        Self(out)
    }

    /// `self * other`
    pub fn multiply(&self, other: &Matrix4) -> Self {
        let mut out = [0.0; 16];
        multiply(&mut out, &self.0, &other.0);
        Self(out)
    }

    /// Inverse, or `None` for singular / non-finite input
    pub fn try_inverse(&self) -> Option<Self> {
        let mut out = [0.0; 16];
        invert(&mut out, &self.0).then_some(Self(out))
    }

    /// Inverse, falling back to identity (and logging) for singular input
    pub fn inverse_or_identity(&self) -> Self {
        self.try_inverse().unwrap_or_else(|| {
            tracing::warn!("non-invertible matrix, substituting identity");
            Self::IDENTITY
        })
    }

    pub fn translation(&self) -> Vector3D {
        Vector3D::from_column(&self.0, 3)
    }

    pub fn rotation(&self) -> Quaternion {
        Quaternion::from_rotation_matrix(&self.0)
    }

    /// Transform a point (w = 1)
    pub fn transform_point(&self, p: Vector3D) -> Vector3D {
        let m = &self.0;
        Vector3D::new(
            m[0] * p.x + m[4] * p.y + m[8] * p.z + m[12],
            m[1] * p.x + m[5] * p.y + m[9] * p.z + m[13],
            m[2] * p.x + m[6] * p.y + m[10] * p.z + m[14],
        )
    }

    /// Transform a direction (w = 0)
    pub fn transform_direction(&self, d: Vector3D) -> Vector3D {
        let m = &self.0;
        Vector3D::new(
            m[0] * d.x + m[4] * d.y + m[8] * d.z,
            m[1] * d.x + m[5] * d.y + m[9] * d.z,
            m[2] * d.x + m[6] * d.y + m[10] * d.z,
        )
    }

    /// Transform a homogeneous vector
    pub fn transform_vec4(&self, v: [f32; 4]) -> [f32; 4] {
        let m = &self.0;
        let mut out = [0.0; 4];
        for (row, slot) in out.iter_mut().enumerate() {
            *slot = m[row] * v[0] + m[4 + row] * v[1] + m[8 + row] * v[2] + m[12 + row] * v[3];
        }
        out
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Element-wise comparison within `epsilon`
    pub fn approx_eq(&self, other: &Matrix4, epsilon: f32) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }

    pub fn as_array(&self) -> &[f32; 16] {
        &self.0
    }
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<[f32; 16]> for Matrix4 {
    fn from(m: [f32; 16]) -> Self {
        Self(m)
    }
}
