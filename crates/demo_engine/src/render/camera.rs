//! Z-up free camera
//!
//! The camera's local frame is right = +X, forward = +Y, up = +Z. The view
//! matrix converts that frame into Vulkan view space (looking down -Z, Y up)
//! and the projection maps depth to `[0, 1]` with Y flipped for Vulkan's
//! Y-down clip space.

use nalgebra::{Matrix4, Point3, Translation3, UnitQuaternion, Vector3};

/// Default vertical field of view in degrees
pub const DEFAULT_FOV_DEGREES: f32 = 60.0;
/// Default near plane
pub const DEFAULT_NEAR: f32 = 0.001;
/// Default far plane
pub const DEFAULT_FAR: f32 = 256.0;

/// Free-flying camera with a translation and a quaternion orientation
#[derive(Debug, Clone)]
pub struct Camera {
    /// Eye position in world space
    pub translation: Vector3<f32>,
    /// Camera-to-world orientation
    pub rotation: UnitQuaternion<f32>,
    /// Units moved per frame by the controller
    pub movement_speed: f32,
    /// Radians per mouse pixel for drag rotation
    pub rotation_speed: f32,
    fov: f32,
    aspect: f32,
    near: f32,
    far: f32,
    projection_changed: bool,
}

impl Camera {
    /// Camera at the origin looking along +Y with the default projection
    pub fn new(aspect: f32) -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            movement_speed: 0.05,
            rotation_speed: -0.005,
            fov: DEFAULT_FOV_DEGREES.to_radians(),
            aspect,
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
            projection_changed: false,
        }
    }

    /// Replace projection parameters; `fov_degrees` is vertical
    pub fn set_projection(&mut self, fov_degrees: f32, aspect: f32, near: f32, far: f32) {
        self.fov = fov_degrees.to_radians();
        self.aspect = aspect;
        self.near = near;
        self.far = far;
        self.projection_changed = true;
    }

    /// Update the aspect ratio after a resize
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > 0.01 {
            log::debug!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.projection_changed |= (self.aspect - aspect).abs() > f32::EPSILON;
        self.aspect = aspect;
    }

    /// Whether the projection changed since the last call; clears the flag
    pub fn take_projection_changed(&mut self) -> bool {
        std::mem::take(&mut self.projection_changed)
    }

    /// Place the eye at `translation`
    pub fn set_translation(&mut self, translation: Vector3<f32>) {
        self.translation = translation;
    }

    /// Move along the camera's own axes
    pub fn translate_local(&mut self, delta: Vector3<f32>) {
        self.translation += self.rotation * delta;
    }

    /// Move along the world axes
    pub fn translate_world(&mut self, delta: Vector3<f32>) {
        self.translation += delta;
    }

    /// Rotate about the world Z (up) axis
    pub fn rotate_world_z(&mut self, angle: f32) {
        self.rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle) * self.rotation;
    }

    /// Pitch about the camera's right axis
    ///
    /// The right axis is horizontal as long as the camera only yaws about
    /// world Z, so this tilts without introducing roll.
    pub fn rotate_world_x(&mut self, angle: f32) {
        self.rotation *= UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angle);
    }

    /// Direction the camera looks in world space
    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * Vector3::y()
    }

    /// World-to-view transform
    pub fn view_matrix(&self) -> Matrix4<f32> {
        let world_to_camera =
            self.rotation.inverse().to_homogeneous() * Translation3::from(-self.translation).to_homogeneous();
        z_up_to_view() * world_to_camera
    }

    /// View transform with translation removed, for sky geometry
    pub fn rotation_only_view_matrix(&self) -> Matrix4<f32> {
        z_up_to_view() * self.rotation.inverse().to_homogeneous()
    }

    /// Right-handed perspective with `[0, 1]` depth and Vulkan's Y-down clip space
    pub fn projection_matrix(&self) -> Matrix4<f32> {
        let f = 1.0 / (self.fov * 0.5).tan();
        let range = self.near - self.far;
        Matrix4::new(
            f / self.aspect, 0.0, 0.0, 0.0,
            0.0, -f, 0.0, 0.0,
            0.0, 0.0, self.far / range, self.near * self.far / range,
            0.0, 0.0, -1.0, 0.0,
        )
    }

    /// Project a world position to normalized device coordinates
    pub fn project(&self, point: Point3<f32>) -> Option<Vector3<f32>> {
        let clip = self.projection_matrix() * self.view_matrix() * point.to_homogeneous();
        if clip.w.abs() <= f32::EPSILON {
            return None;
        }
        Some(Vector3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w))
    }
}

/// Camera frame (right +X, forward +Y, up +Z) to view space (right +X, up +Y, forward -Z)
fn z_up_to_view() -> Matrix4<f32> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, -1.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_point_ahead_projects_to_center() {
        let camera = Camera::new(16.0 / 9.0);
        let ndc = camera.project(Point3::new(0.0, 10.0, 0.0)).unwrap();
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_depth_range_is_zero_to_one() {
        let camera = Camera::new(1.0);
        let near = camera.project(Point3::new(0.0, DEFAULT_NEAR, 0.0)).unwrap();
        let far = camera.project(Point3::new(0.0, DEFAULT_FAR, 0.0)).unwrap();
        assert_relative_eq!(near.z, 0.0, epsilon = 1e-4);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_up_is_negative_y_in_clip_space() {
        let camera = Camera::new(1.0);
        let ndc = camera.project(Point3::new(0.0, 5.0, 1.0)).unwrap();
        assert!(ndc.y < 0.0);
        let ndc = camera.project(Point3::new(1.0, 5.0, 0.0)).unwrap();
        assert!(ndc.x > 0.0);
    }

    #[test]
    fn test_translate_local_follows_orientation() {
        let mut camera = Camera::new(1.0);
        camera.rotate_world_z(FRAC_PI_2);
        camera.translate_local(Vector3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(camera.translation, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_translate_world_ignores_orientation() {
        let mut camera = Camera::new(1.0);
        camera.rotate_world_z(FRAC_PI_2);
        camera.translate_world(Vector3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(camera.translation, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_pitch_tilts_forward_up() {
        let mut camera = Camera::new(1.0);
        camera.rotate_world_x(FRAC_PI_2);
        assert_relative_eq!(camera.forward(), Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_aspect_change_is_reported_once() {
        let mut camera = Camera::new(16.0 / 9.0);
        assert!(!camera.take_projection_changed());

        camera.set_aspect_ratio(16.0 / 9.0);
        assert!(!camera.take_projection_changed());

        let before = camera.projection_matrix();
        camera.set_aspect_ratio(4.0 / 3.0);
        assert!(camera.take_projection_changed());
        assert!(!camera.take_projection_changed());
        assert!(camera.projection_matrix()[(0, 0)] > before[(0, 0)]);
    }

    #[test]
    fn test_rotation_only_view_ignores_translation() {
        let mut camera = Camera::new(1.0);
        let before = camera.rotation_only_view_matrix();
        camera.set_translation(Vector3::new(4.0, -2.0, 7.0));
        assert_relative_eq!(camera.rotation_only_view_matrix(), before, epsilon = 1e-6);
    }
}
