//! Input state tracking
//!
//! The window translates GLFW events into [`InputEvent`]s; [`InputState`]
//! folds them into what the shell and the camera controller read each frame.

pub mod camera_controller;

pub use camera_controller::CameraController;

use bitflags::bitflags;
use nalgebra::Vector2;

/// Keys the demos react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// W key
    W,
    /// S key
    S,
    /// A key
    A,
    /// D key
    D,
    /// Q key
    Q,
    /// E key
    E,
    /// I key
    I,
    /// K key
    K,
    /// J key
    J,
    /// L key
    L,
    /// U key
    U,
    /// O key
    O,
    /// Space key
    Space,
    /// Up arrow
    Up,
    /// Down arrow
    Down,
    /// Left arrow
    Left,
    /// Right arrow
    Right,
    /// Either shift key
    Shift,
    /// Escape key
    Escape,
    /// F1 key
    F1,
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left mouse button
    Left,
    /// Right mouse button
    Right,
    /// Middle mouse button
    Middle,
}

/// Backend-neutral window event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Key pressed or released
    Key {
        /// Which key
        key: KeyCode,
        /// True on press, false on release
        pressed: bool,
    },
    /// Cursor moved to a window position in pixels
    CursorMoved {
        /// Horizontal position
        x: f64,
        /// Vertical position
        y: f64,
    },
    /// Mouse button pressed or released
    MouseButton {
        /// Which button
        button: MouseButton,
        /// True on press, false on release
        pressed: bool,
    },
    /// Framebuffer resized
    Resized {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },
    /// The user asked to close the window
    CloseRequested,
}

bitflags! {
    /// Held movement and modifier keys
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeyFlags: u32 {
        /// W
        const W = 1 << 0;
        /// S
        const S = 1 << 1;
        /// A
        const A = 1 << 2;
        /// D
        const D = 1 << 3;
        /// Q
        const Q = 1 << 4;
        /// E
        const E = 1 << 5;
        /// I
        const I = 1 << 6;
        /// K
        const K = 1 << 7;
        /// J
        const J = 1 << 8;
        /// L
        const L = 1 << 9;
        /// U
        const U = 1 << 10;
        /// O
        const O = 1 << 11;
        /// Space
        const SPACE = 1 << 12;
        /// Up arrow
        const UP = 1 << 13;
        /// Down arrow
        const DOWN = 1 << 14;
        /// Left arrow
        const LEFT = 1 << 15;
        /// Right arrow
        const RIGHT = 1 << 16;
        /// Shift
        const SHIFT = 1 << 17;
    }
}

impl KeyFlags {
    /// Flag tracked for `key`, if it is a held key
    pub fn from_key(key: KeyCode) -> Option<Self> {
        let flag = match key {
            KeyCode::W => Self::W,
            KeyCode::S => Self::S,
            KeyCode::A => Self::A,
            KeyCode::D => Self::D,
            KeyCode::Q => Self::Q,
            KeyCode::E => Self::E,
            KeyCode::I => Self::I,
            KeyCode::K => Self::K,
            KeyCode::J => Self::J,
            KeyCode::L => Self::L,
            KeyCode::U => Self::U,
            KeyCode::O => Self::O,
            KeyCode::Space => Self::SPACE,
            KeyCode::Up => Self::UP,
            KeyCode::Down => Self::DOWN,
            KeyCode::Left => Self::LEFT,
            KeyCode::Right => Self::RIGHT,
            KeyCode::Shift => Self::SHIFT,
            KeyCode::Escape | KeyCode::F1 => return None,
        };
        Some(flag)
    }
}

/// Per-frame view of the input devices
#[derive(Debug, Clone, Default)]
pub struct InputState {
    keys: KeyFlags,
    mouse_position: Vector2<f32>,
    mouse_delta: Vector2<f32>,
    mouse_buttons: [bool; 3],
    cursor_seen: bool,
    quit_requested: bool,
    overlay_toggled: bool,
    resized: Option<(u32, u32)>,
}

impl InputState {
    /// Nothing held, cursor at the origin
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the state
    pub fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::Key { key, pressed } => {
                if let Some(flag) = KeyFlags::from_key(key) {
                    self.keys.set(flag, pressed);
                }
                match key {
                    KeyCode::Escape if pressed => self.quit_requested = true,
                    KeyCode::F1 if pressed => self.overlay_toggled = !self.overlay_toggled,
                    _ => {}
                }
            }
            InputEvent::CursorMoved { x, y } => {
                let position = Vector2::new(x as f32, y as f32);
                // The first position only establishes where the cursor is
                if self.cursor_seen {
                    self.mouse_delta += position - self.mouse_position;
                }
                self.mouse_position = position;
                self.cursor_seen = true;
            }
            InputEvent::MouseButton { button, pressed } => {
                self.mouse_buttons[button_slot(button)] = pressed;
            }
            InputEvent::Resized { width, height } => self.resized = Some((width, height)),
            InputEvent::CloseRequested => self.quit_requested = true,
        }
    }

    /// Clear per-frame accumulators; held keys and buttons persist
    pub fn end_frame(&mut self) {
        self.mouse_delta = Vector2::zeros();
        self.overlay_toggled = false;
        self.resized = None;
    }

    /// Held keys
    pub fn keys(&self) -> KeyFlags {
        self.keys
    }

    /// Whether `key` is held
    pub fn is_held(&self, key: KeyFlags) -> bool {
        self.keys.contains(key)
    }

    /// Whether `button` is held
    pub fn is_button_held(&self, button: MouseButton) -> bool {
        self.mouse_buttons[button_slot(button)]
    }

    /// Cursor position in window pixels
    pub fn mouse_position(&self) -> Vector2<f32> {
        self.mouse_position
    }

    /// Cursor movement since the last `end_frame`
    pub fn mouse_delta(&self) -> Vector2<f32> {
        self.mouse_delta
    }

    /// Whether Escape or the window close button was used
    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// Whether the overlay visibility should flip this frame
    pub fn overlay_toggled(&self) -> bool {
        self.overlay_toggled
    }

    /// Latest framebuffer size reported this frame
    pub fn resized(&self) -> Option<(u32, u32)> {
        self.resized
    }
}

fn button_slot(button: MouseButton) -> usize {
    match button {
        MouseButton::Left => 0,
        MouseButton::Right => 1,
        MouseButton::Middle => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn key(key: KeyCode, pressed: bool) -> InputEvent {
        InputEvent::Key { key, pressed }
    }

    #[test]
    fn test_keys_track_press_and_release() {
        let mut input = InputState::new();
        input.apply(key(KeyCode::W, true));
        input.apply(key(KeyCode::Shift, true));
        assert!(input.is_held(KeyFlags::W | KeyFlags::SHIFT));

        input.apply(key(KeyCode::W, false));
        assert!(!input.is_held(KeyFlags::W));
        assert!(input.is_held(KeyFlags::SHIFT));
    }

    #[test]
    fn test_first_cursor_position_has_no_delta() {
        let mut input = InputState::new();
        input.apply(InputEvent::CursorMoved { x: 100.0, y: 50.0 });
        assert_relative_eq!(input.mouse_delta().norm(), 0.0);

        input.apply(InputEvent::CursorMoved { x: 110.0, y: 45.0 });
        input.apply(InputEvent::CursorMoved { x: 112.0, y: 45.0 });
        assert_relative_eq!(input.mouse_delta().x, 12.0);
        assert_relative_eq!(input.mouse_delta().y, -5.0);
    }

    #[test]
    fn test_end_frame_zeroes_delta_but_keeps_held_state() {
        let mut input = InputState::new();
        input.apply(InputEvent::CursorMoved { x: 0.0, y: 0.0 });
        input.apply(InputEvent::CursorMoved { x: 4.0, y: 4.0 });
        input.apply(InputEvent::MouseButton { button: MouseButton::Left, pressed: true });
        input.apply(key(KeyCode::A, true));
        input.end_frame();

        assert_relative_eq!(input.mouse_delta().norm(), 0.0);
        assert!(input.is_button_held(MouseButton::Left));
        assert!(input.is_held(KeyFlags::A));
    }

    #[test]
    fn test_escape_and_close_request_quit() {
        let mut input = InputState::new();
        input.apply(key(KeyCode::Escape, false));
        assert!(!input.quit_requested());
        input.apply(key(KeyCode::Escape, true));
        assert!(input.quit_requested());

        let mut input = InputState::new();
        input.apply(InputEvent::CloseRequested);
        assert!(input.quit_requested());
    }

    #[test]
    fn test_f1_toggles_overlay_once_per_press() {
        let mut input = InputState::new();
        input.apply(key(KeyCode::F1, true));
        input.apply(key(KeyCode::F1, false));
        assert!(input.overlay_toggled());
        input.end_frame();
        assert!(!input.overlay_toggled());
    }

    #[test]
    fn test_resize_reports_latest_size() {
        let mut input = InputState::new();
        input.apply(InputEvent::Resized { width: 800, height: 600 });
        input.apply(InputEvent::Resized { width: 1024, height: 768 });
        assert_eq!(input.resized(), Some((1024, 768)));
        input.end_frame();
        assert_eq!(input.resized(), None);
    }
}
