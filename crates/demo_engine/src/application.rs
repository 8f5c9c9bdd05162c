//! The contract between a demo and the engine
//!
//! A demo creates its GPU resources once in [`Demo::load_assets`], records
//! its draw commands per swapchain image in [`Demo::build_draw_commands`] and
//! reacts to time and input in [`Demo::update_frame_state`]. The engine calls
//! `build_draw_commands` again after every resize and whenever
//! `update_frame_state` asks for a redraw.

use ash::vk;
use nalgebra::Matrix4;
use thiserror::Error;
use crate::assets::{AssetError, AssetPaths};
use crate::config::ConfigError;
use crate::input::InputState;
use crate::render::camera::Camera;
use crate::render::frame::TransferQueue;
use crate::render::text::{OverlayText, TextAlign};
use crate::render::vulkan::{DrawRecorder, VulkanError};
use crate::render::GpuContext;

/// Errors a demo can report
#[derive(Error, Debug)]
pub enum AppError {
    /// Device or resource failure
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// Missing or malformed asset
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Bad configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Anything else
    #[error("{0}")]
    Custom(String),
}

impl AppError {
    /// Whether the error only means the swapchain must be rebuilt
    pub fn is_swapchain_out_of_date(&self) -> bool {
        matches!(self, Self::Vulkan(VulkanError::SwapchainOutOfDate))
    }
}

/// Per-frame inputs handed to [`Demo::update_frame_state`]
pub struct FrameInfo<'a> {
    /// Seconds since the previous frame
    pub delta: f32,
    /// Seconds since the demo started
    pub elapsed: f32,
    /// Frames rendered so far
    pub frame: u64,
    /// Camera after this frame's controller update
    pub camera: &'a Camera,
    /// Whether the camera moved or its projection changed this frame
    pub camera_moved: bool,
    /// Input state for this frame
    pub input: &'a InputState,
    /// Current swapchain extent
    pub extent: vk::Extent2D,
}

impl FrameInfo<'_> {
    /// Projection and view matrices of this frame's camera
    pub fn camera_matrices(&self) -> (Matrix4<f32>, Matrix4<f32>) {
        (self.camera.projection_matrix(), self.camera.view_matrix())
    }
}

/// What changed during a frame update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneChange {
    /// The draw secondaries must be re-recorded
    pub redraw: bool,
    /// The overlay text must be refreshed now instead of at the next tick
    pub overlay: bool,
}

impl SceneChange {
    /// Nothing to rebuild
    pub const NONE: Self = Self {
        redraw: false,
        overlay: false,
    };

    /// Only the overlay text changed
    pub const OVERLAY: Self = Self {
        redraw: false,
        overlay: true,
    };
}

/// A demo driven by the engine
pub trait Demo {
    /// Window title and log prefix
    fn title(&self) -> &str;

    /// Starting camera; called once before `load_assets`
    fn initial_camera(&self, aspect: f32) -> Camera {
        Camera::new(aspect)
    }

    /// Create meshes, textures, buffers, descriptor sets and pipelines
    fn load_assets(&mut self, gpu: &GpuContext<'_>, paths: &AssetPaths) -> Result<(), AppError>;

    /// Record the draw commands for one swapchain image
    ///
    /// `recorder` targets a secondary command buffer already inside the render
    /// pass. Viewport and scissor are dynamic in every pipeline, so they must
    /// be set here.
    fn build_draw_commands(&self, recorder: &mut DrawRecorder, image_index: usize) -> Result<(), AppError>;

    /// Advance the demo by one frame
    ///
    /// Uniform data changed here reaches the GPU through `transfers`, which
    /// is submitted after this frame's draw.
    fn update_frame_state(
        &mut self,
        frame: &FrameInfo<'_>,
        transfers: &mut TransferQueue,
    ) -> Result<SceneChange, AppError>;

    /// Add demo lines to the overlay; frame time and FPS are already there
    fn describe_overlay(&self, _text: &mut OverlayText) {}

    /// Record into a primary command buffer ahead of the render pass
    fn before_render_pass(
        &self,
        _image_index: usize,
        _command_buffer: vk::CommandBuffer,
    ) -> Result<(), AppError> {
        Ok(())
    }

    /// Swapchain was rebuilt; the draw commands are re-recorded afterwards
    fn on_resize(&mut self, _gpu: &GpuContext<'_>) -> Result<(), AppError> {
        Ok(())
    }

    /// Release GPU resources; the device is idle when this is called
    fn cleanup(&mut self);
}

/// Frame-time and FPS lines every demo overlay starts with
pub fn describe_frame_stats(text: &mut OverlayText, title: &str, frame_time_ms: f32, fps: u32, width: u32) {
    text.add_text(title, 5.0, 5.0, TextAlign::Left);
    text.add_text(
        format!("{:.2} ms ({} fps)", frame_time_ms, fps),
        5.0,
        25.0,
        TextAlign::Left,
    );
    text.add_text("Press F1 to toggle the overlay", width as f32 - 5.0, 5.0, TextAlign::Right);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_date_detection() {
        assert!(AppError::from(VulkanError::SwapchainOutOfDate).is_swapchain_out_of_date());
        assert!(!AppError::from(VulkanError::NoSuitableMemoryType).is_swapchain_out_of_date());
        assert!(!AppError::Custom("x".to_string()).is_swapchain_out_of_date());
    }

    #[test]
    fn test_frame_stats_lines() {
        let mut text = OverlayText::new();
        describe_frame_stats(&mut text, "Scene", 16.667, 60, 1280);
        let lines = text.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].text, "16.67 ms (60 fps)");
        assert_eq!(lines[2].align, TextAlign::Right);
    }
}
