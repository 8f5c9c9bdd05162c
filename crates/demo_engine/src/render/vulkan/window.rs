//! Window management using GLFW
//!
//! Creates the Vulkan-capable window and translates GLFW events into the
//! backend-neutral [`InputEvent`]s the shell and camera controller consume.

use thiserror::Error;
use crate::input::{InputEvent, KeyCode, MouseButton};

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialised
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// Any other GLFW failure
    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window wrapper
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Create a window without a client API, ready for a Vulkan surface
    pub fn new(title: &str, width: u32, height: u32, resizable: bool) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(resizable));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_cursor_pos_polling(true);
        window.set_mouse_button_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::info!("Created {}x{} window \"{}\"", width, height, title);
        Ok(Self { glfw, window, events })
    }

    /// Pump the event queue and translate everything we care about
    pub fn poll_events(&mut self) -> Vec<InputEvent> {
        self.glfw.poll_events();
        glfw::flush_messages(&self.events)
            .filter_map(|(_, event)| translate_event(event))
            .collect()
    }

    /// Block until at least one event arrives; used while minimised
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Framebuffer size in pixels
    pub fn get_framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    /// Replace the window title
    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    /// Get required Vulkan instance extensions from GLFW
    pub fn get_required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::GlfwError("Failed to get required extensions".to_string()))
    }

    /// Create Vulkan surface using GLFW's built-in functionality
    pub fn create_vulkan_surface(&mut self, instance: ash::vk::Instance) -> WindowResult<ash::vk::SurfaceKHR> {
        let mut surface = ash::vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == ash::vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::GlfwError(format!("Failed to create Vulkan surface: {:?}", result)))
        }
    }
}

fn translate_event(event: glfw::WindowEvent) -> Option<InputEvent> {
    match event {
        glfw::WindowEvent::Key(key, _, action, _) => {
            let pressed = match action {
                glfw::Action::Press | glfw::Action::Repeat => true,
                glfw::Action::Release => false,
            };
            translate_key(key).map(|key| InputEvent::Key { key, pressed })
        }
        glfw::WindowEvent::CursorPos(x, y) => Some(InputEvent::CursorMoved { x, y }),
        glfw::WindowEvent::MouseButton(button, action, _) => {
            let button = match button {
                glfw::MouseButton::Button1 => MouseButton::Left,
                glfw::MouseButton::Button2 => MouseButton::Right,
                glfw::MouseButton::Button3 => MouseButton::Middle,
                _ => return None,
            };
            Some(InputEvent::MouseButton {
                button,
                pressed: action != glfw::Action::Release,
            })
        }
        glfw::WindowEvent::FramebufferSize(width, height) => Some(InputEvent::Resized {
            width: width.max(0) as u32,
            height: height.max(0) as u32,
        }),
        glfw::WindowEvent::Close => Some(InputEvent::CloseRequested),
        _ => None,
    }
}

fn translate_key(key: glfw::Key) -> Option<KeyCode> {
    use glfw::Key;
    Some(match key {
        Key::W => KeyCode::W,
        Key::S => KeyCode::S,
        Key::A => KeyCode::A,
        Key::D => KeyCode::D,
        Key::Q => KeyCode::Q,
        Key::E => KeyCode::E,
        Key::I => KeyCode::I,
        Key::K => KeyCode::K,
        Key::J => KeyCode::J,
        Key::L => KeyCode::L,
        Key::U => KeyCode::U,
        Key::O => KeyCode::O,
        Key::Space => KeyCode::Space,
        Key::Up => KeyCode::Up,
        Key::Down => KeyCode::Down,
        Key::Left => KeyCode::Left,
        Key::Right => KeyCode::Right,
        Key::LeftShift | Key::RightShift => KeyCode::Shift,
        Key::Escape => KeyCode::Escape,
        Key::F1 => KeyCode::F1,
        _ => return None,
    })
}
