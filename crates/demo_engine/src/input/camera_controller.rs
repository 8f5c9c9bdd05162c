//! Keyboard and mouse camera controls
//!
//! W/S, A/D and Q/E move along the camera's Y, X and Z axes, or along the
//! world axes while Shift is held. Left/Right arrows yaw about world Z and a
//! left-button drag orbits.

use nalgebra::Vector3;
use crate::input::{InputState, KeyFlags, MouseButton};
use crate::render::camera::Camera;

/// Yaw applied per frame while an arrow key is held
const ARROW_YAW_SPEED: f32 = -0.02;

/// Applies held keys and mouse drags to a [`Camera`]
#[derive(Debug, Clone, Default)]
pub struct CameraController;

impl CameraController {
    /// Create a controller
    pub fn new() -> Self {
        Self
    }

    /// Apply one frame of input
    ///
    /// Returns true when the camera moved or its projection changed since
    /// the previous update, i.e. whenever its matrices must be re-uploaded.
    pub fn update(&self, camera: &mut Camera, input: &InputState) -> bool {
        let speed = camera.movement_speed;
        let mut delta = Vector3::zeros();
        for (key, direction) in [
            (KeyFlags::W, Vector3::y()),
            (KeyFlags::S, -Vector3::y()),
            (KeyFlags::A, -Vector3::x()),
            (KeyFlags::D, Vector3::x()),
            (KeyFlags::Q, -Vector3::z()),
            (KeyFlags::E, Vector3::z()),
        ] {
            if input.is_held(key) {
                delta += direction * speed;
            }
        }

        let mut changed = false;
        if delta != Vector3::zeros() {
            if input.is_held(KeyFlags::SHIFT) {
                camera.translate_world(delta);
            } else {
                camera.translate_local(delta);
            }
            changed = true;
        }

        let drag = input.mouse_delta();
        if input.is_button_held(MouseButton::Left) && drag != nalgebra::Vector2::zeros() {
            camera.rotate_world_z(-drag.x * camera.rotation_speed);
            camera.rotate_world_x(-drag.y * camera.rotation_speed);
            changed = true;
        }

        // Shift+arrows are reserved
        if !input.is_held(KeyFlags::SHIFT) {
            if input.is_held(KeyFlags::LEFT) {
                camera.rotate_world_z(ARROW_YAW_SPEED);
                changed = true;
            }
            if input.is_held(KeyFlags::RIGHT) {
                camera.rotate_world_z(-ARROW_YAW_SPEED);
                changed = true;
            }
        }

        changed | camera.take_projection_changed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{InputEvent, KeyCode};
    use approx::assert_relative_eq;

    fn held(keys: &[KeyCode]) -> InputState {
        let mut input = InputState::new();
        for &key in keys {
            input.apply(InputEvent::Key { key, pressed: true });
        }
        input
    }

    #[test]
    fn test_no_input_leaves_camera_unchanged() {
        let mut camera = Camera::new(1.0);
        let changed = CameraController::new().update(&mut camera, &InputState::new());
        assert!(!changed);
        assert_relative_eq!(camera.translation, Vector3::zeros());
    }

    #[test]
    fn test_w_moves_forward_in_local_space() {
        let mut camera = Camera::new(1.0);
        camera.rotate_world_z(std::f32::consts::PI);
        let changed = CameraController::new().update(&mut camera, &held(&[KeyCode::W]));
        assert!(changed);
        assert_relative_eq!(camera.translation, Vector3::new(0.0, -camera.movement_speed, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_shift_moves_in_world_space() {
        let mut camera = Camera::new(1.0);
        camera.rotate_world_z(std::f32::consts::PI);
        CameraController::new().update(&mut camera, &held(&[KeyCode::W, KeyCode::Shift]));
        assert_relative_eq!(camera.translation, Vector3::new(0.0, camera.movement_speed, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let mut camera = Camera::new(1.0);
        let changed = CameraController::new().update(&mut camera, &held(&[KeyCode::A, KeyCode::D]));
        assert!(!changed);
    }

    #[test]
    fn test_drag_without_button_does_not_rotate() {
        let mut camera = Camera::new(1.0);
        let mut input = InputState::new();
        input.apply(InputEvent::CursorMoved { x: 0.0, y: 0.0 });
        input.apply(InputEvent::CursorMoved { x: 30.0, y: 10.0 });
        assert!(!CameraController::new().update(&mut camera, &input));

        input.apply(InputEvent::MouseButton { button: MouseButton::Left, pressed: true });
        assert!(CameraController::new().update(&mut camera, &input));
        assert!(camera.rotation.angle() > 0.0);
    }

    #[test]
    fn test_resize_without_input_reports_change_once() {
        let controller = CameraController::new();
        let mut camera = Camera::new(16.0 / 9.0);
        camera.set_aspect_ratio(4.0 / 3.0);

        assert!(controller.update(&mut camera, &InputState::new()));
        assert!(!controller.update(&mut camera, &InputState::new()));
        assert_relative_eq!(camera.translation, Vector3::zeros());
    }

    #[test]
    fn test_arrow_yaw() {
        let mut camera = Camera::new(1.0);
        CameraController::new().update(&mut camera, &held(&[KeyCode::Left]));
        assert_relative_eq!(camera.rotation.angle(), ARROW_YAW_SPEED.abs(), epsilon = 1e-6);
    }
}
