//! The demo shell: window, renderer and main loop
//!
//! Each iteration polls input, moves the camera, lets the demo update,
//! renders one frame and paces to the configured frame rate. Resizes, overlay
//! toggles and per-second overlay refreshes happen between frames.

use thiserror::Error;
use crate::application::{describe_frame_stats, AppError, Demo, FrameInfo};
use crate::config::ConfigError;
use crate::core::ApplicationConfig;
use crate::foundation::time::{FramePacer, Timer};
use crate::input::{CameraController, InputState};
use crate::render::camera::Camera;
use crate::render::vulkan::{VulkanError, VulkanResult, Window, WindowError};
use crate::render::Renderer;

/// Errors that end a demo run
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Window creation failed
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Device setup or frame submission failed
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// The demo reported an error
    #[error("Demo error: {0}")]
    App(#[from] AppError),
}

/// Runs one [`Demo`] until its window closes
pub struct Engine {
    config: ApplicationConfig,
}

impl Engine {
    /// Validate `config` and prepare to run
    pub fn new(config: ApplicationConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration the engine runs with
    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// Open the window, run `demo` and tear everything down
    ///
    /// The demo is cleaned up and dropped before the device goes away, also
    /// when the loop ends with an error.
    pub fn run<D: Demo>(self, mut demo: D) -> Result<(), EngineError> {
        let window_config = &self.config.window;
        let mut window = Window::new(
            &window_config.title,
            window_config.width,
            window_config.height,
            window_config.resizable,
        )?;
        let mut renderer = Renderer::new(&mut window, &self.config)?;

        log::info!("Starting {}", demo.title());
        let result = self.run_loop(&mut window, &mut renderer, &mut demo);

        if let Err(e) = renderer.shutdown() {
            log::error!("Frame loop shutdown failed: {}", e);
        }
        demo.cleanup();
        drop(demo);
        drop(renderer);
        drop(window);
        log::info!("Shut down cleanly");
        result
    }

    fn run_loop<D: Demo>(
        &self,
        window: &mut Window,
        renderer: &mut Renderer,
        demo: &mut D,
    ) -> Result<(), EngineError> {
        let mut camera = demo.initial_camera(renderer.gpu().aspect_ratio());
        demo.load_assets(&renderer.gpu(), renderer.paths())?;
        rebuild_draw(renderer, demo)?;

        let controller = CameraController::new();
        let mut input = InputState::new();
        let mut timer = Timer::new();
        let mut pacer = FramePacer::new(self.config.engine.target_fps);
        let mut pending_resize = None;

        refresh_overlay(renderer, demo, &timer)?;

        while !window.should_close() {
            pacer.begin_frame();
            let fps_sampled = timer.update();

            for event in window.poll_events() {
                input.apply(event);
            }
            if input.quit_requested() {
                log::info!("Quit requested");
                break;
            }

            let mut overlay_dirty = fps_sampled;
            if input.overlay_toggled() && renderer.has_overlay() {
                let visible = !renderer.overlay_visible();
                renderer.set_overlay_visible(visible);
                overlay_dirty |= visible;
            }

            if let Some(size) = input.resized() {
                pending_resize = Some(size);
            }
            if let Some(size) = pending_resize.take() {
                if !handle_resize(renderer, demo, &mut camera, &timer, size)? {
                    // Minimized: block until something happens
                    window.wait_events();
                    pending_resize = Some(window.get_framebuffer_size());
                    input.end_frame();
                    continue;
                }
            }

            let camera_moved = controller.update(&mut camera, &input);
            let frame = FrameInfo {
                delta: timer.delta_time(),
                elapsed: timer.total_time(),
                frame: timer.frame_count(),
                camera: &camera,
                camera_moved,
                input: &input,
                extent: renderer.extent(),
            };
            let change = demo.update_frame_state(&frame, renderer.frame_loop_mut().transfers_mut())?;
            if change.redraw {
                rebuild_draw(renderer, demo)?;
            }

            match renderer.render_frame(|index, command_buffer| demo.before_render_pass(index, command_buffer)) {
                Ok(()) => {}
                Err(e) if e.is_swapchain_out_of_date() => {
                    log::debug!("Swapchain out of date, rebuilding");
                    pending_resize = Some(window.get_framebuffer_size());
                }
                Err(e) => return Err(e.into()),
            }

            if fps_sampled {
                window.set_title(&format!("{} - {} fps", demo.title(), timer.fps()));
            }
            if overlay_dirty || change.overlay {
                refresh_overlay(renderer, demo, &timer)?;
            }

            input.end_frame();
            pacer.wait();
        }

        log::info!("Rendered {} frames", timer.frame_count());
        Ok(())
    }
}

fn rebuild_draw<D: Demo>(renderer: &mut Renderer, demo: &D) -> Result<(), AppError> {
    renderer.rebuild_draw(|recorder, image_index| demo.build_draw_commands(recorder, image_index))
}

fn refresh_overlay<D: Demo>(renderer: &mut Renderer, demo: &D, timer: &Timer) -> VulkanResult<()> {
    let width = renderer.extent().width;
    renderer.update_overlay(|text| {
        describe_frame_stats(text, demo.title(), timer.delta_time() * 1000.0, timer.fps(), width);
        demo.describe_overlay(text);
    })
}

/// Rebuild the swapchain and everything recorded against it
///
/// Returns false when the window is minimized and nothing was rebuilt.
fn handle_resize<D: Demo>(
    renderer: &mut Renderer,
    demo: &mut D,
    camera: &mut Camera,
    timer: &Timer,
    size: (u32, u32),
) -> Result<bool, EngineError> {
    if !renderer.resize(size)? {
        return Ok(false);
    }
    camera.set_aspect_ratio(renderer.gpu().aspect_ratio());
    demo.on_resize(&renderer.gpu())?;
    rebuild_draw(renderer, demo)?;
    refresh_overlay(renderer, demo, timer)?;
    Ok(true)
}
