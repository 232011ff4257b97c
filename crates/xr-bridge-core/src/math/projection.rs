//! Perspective projection settings and view-ray unprojection

use super::{Matrix4, Vector3D};

/// Projection settings for a single view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Vertical field of view in radians
    pub fov: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
}

impl Projection {
    /// Create a perspective projection from a vertical field of view in degrees
    pub fn perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov: fov_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Matrix4 {
        Matrix4::perspective(self.fov, self.aspect, self.near, self.far)
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::perspective(70.0, 16.0 / 9.0, 0.1, 1000.0)
    }
}

/// Convert normalized screen coordinates (0..1, origin top-left) to NDC (-1..1)
pub fn screen_to_ndc(x: f32, y: f32) -> (f32, f32) {
    (x * 2.0 - 1.0, 1.0 - y * 2.0)
}

/// A ray through the scene in the frame of the pose it was built from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRay {
    pub origin: Vector3D,
    /// Unit direction
    pub direction: Vector3D,
}

impl ViewRay {
    /// Cast a ray from a normalized screen point through `projection`, then
    /// carry it into tracking space with the viewer's `pose`.
    ///
    /// Returns `None` when the projection cannot be inverted or the ray has
    /// no direction.
    pub fn from_screen(x: f32, y: f32, projection: &Matrix4, pose: &Matrix4) -> Option<Self> {
        let inverse_projection = projection.try_inverse()?;
        let (ndc_x, ndc_y) = screen_to_ndc(x, y);

        let near = inverse_projection.transform_vec4([ndc_x, ndc_y, -1.0, 1.0]);
        let far = inverse_projection.transform_vec4([ndc_x, ndc_y, 1.0, 1.0]);
        if near[3].abs() < f32::EPSILON || far[3].abs() < f32::EPSILON {
            return None;
        }
        let near = Vector3D::new(near[0] / near[3], near[1] / near[3], near[2] / near[3]);
        let far = Vector3D::new(far[0] / far[3], far[1] / far[3], far[2] / far[3]);

        let local_direction = (far - near).normalize();
        if local_direction.magnitude_squared() == 0.0 || !local_direction.is_finite() {
            return None;
        }

        Some(Self {
            origin: pose.translation(),
            direction: pose.transform_direction(local_direction).normalize(),
        })
    }

    /// Point `distance` meters along the ray
    pub fn point_at(&self, distance: f32) -> Vector3D {
        self.origin + self.direction * distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Quaternion;
    use std::f32::consts::PI;

    #[test]
    fn test_screen_to_ndc() {
        assert_eq!(screen_to_ndc(0.5, 0.5), (0.0, 0.0));
        assert_eq!(screen_to_ndc(0.0, 0.0), (-1.0, 1.0));
        assert_eq!(screen_to_ndc(1.0, 1.0), (1.0, -1.0));
    }

    #[test]
    fn test_center_ray_looks_forward() {
        let projection = Projection::default().matrix();
        let pose = Matrix4::from_translation(Vector3D::new(0.0, 1.1, 0.0));
        let ray = ViewRay::from_screen(0.5, 0.5, &projection, &pose).unwrap();

        assert_eq!(ray.origin, Vector3D::new(0.0, 1.1, 0.0));
        let p = ray.point_at(1.0);
        assert!(p.x.abs() < 1e-4);
        assert!((p.y - 1.1).abs() < 1e-4);
        assert!((p.z + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_ray_follows_pose_rotation() {
        let projection = Projection::default().matrix();
        let pose = Matrix4::from_rotation_translation(
            Quaternion::from_axis_angle(Vector3D::UP, PI / 2.0),
            Vector3D::ZERO,
        );
        let ray = ViewRay::from_screen(0.5, 0.5, &projection, &pose).unwrap();
        assert!((ray.direction.x + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_degenerate_projection() {
        let flat = Matrix4([0.0; 16]);
        assert!(ViewRay::from_screen(0.5, 0.5, &flat, &Matrix4::IDENTITY).is_none());
    }
}
