//! Swapchain-bound rendering state
//!
//! `Renderer` owns the context, the swapchain and everything rebuilt with it,
//! and drives the frame loop through the Vulkan backend. Demos record their
//! draw commands through closures handed a [`DrawRecorder`] for one image.

use ash::vk;
use crate::assets::AssetPaths;
use crate::core::ApplicationConfig;
use crate::render::frame::{FrameBackend, FrameLoop, RenderTargets, SecondaryKind};
use crate::render::text::OverlayText;
use crate::render::vulkan::{
    CommandPool, DrawRecorder, FramebufferSet, RenderPass, Swapchain, TextOverlay, VulkanBackend,
    VulkanContext, VulkanError, VulkanResult, Window,
};

/// What demos get to create their GPU resources with
pub struct GpuContext<'a> {
    /// Instance, device and queues
    pub context: &'a VulkanContext,
    /// Pool for one-time upload commands
    pub command_pool: &'a CommandPool,
    /// Render pass every demo pipeline must be compatible with
    pub render_pass: vk::RenderPass,
    /// Current swapchain extent
    pub extent: vk::Extent2D,
    /// Current swapchain image count
    pub image_count: usize,
}

impl GpuContext<'_> {
    /// Whether one indirect draw call may carry several commands
    pub fn supports_multi_draw_indirect(&self) -> bool {
        self.context.supports_multi_draw_indirect()
    }

    /// Width over height of the current extent
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height.max(1) as f32
    }
}

/// Swapchain, render targets, frame loop and text overlay
///
/// Field order is drop order: everything created from the device goes before
/// `context`.
pub struct Renderer {
    overlay: Option<TextOverlay>,
    frame_loop: FrameLoop,
    backend: VulkanBackend,
    framebuffers: FramebufferSet,
    render_pass: RenderPass,
    swapchain: Swapchain,
    command_pool: CommandPool,
    paths: AssetPaths,
    vsync: bool,
    clear_color: [f32; 4],
    context: VulkanContext,
}

impl Renderer {
    /// Create the device, swapchain and render targets for `window`
    ///
    /// A missing or unreadable overlay font is logged and the renderer runs
    /// without an overlay.
    pub fn new(window: &mut Window, config: &ApplicationConfig) -> VulkanResult<Self> {
        let context = VulkanContext::new(window, &config.window.title, config.renderer.validation)?;
        let swapchain = Swapchain::create(&context, window.get_framebuffer_size(), config.window.vsync)?;
        let render_pass = RenderPass::new_forward_pass(context.raw_device(), swapchain.format().format)?;
        let framebuffers = FramebufferSet::new(&context, render_pass.handle(), &swapchain)?;
        let command_pool = CommandPool::new(context.raw_device(), context.graphics_queue_family())?;
        let mut backend = VulkanBackend::new(&context, command_pool.handle(), swapchain.handle());

        let paths = AssetPaths::new(&config.assets.assets_dir, &config.assets.shader_dir);
        let overlay = if config.renderer.text_overlay {
            match TextOverlay::new(
                &context,
                &command_pool,
                render_pass.handle(),
                &paths,
                &config.renderer.font,
                config.renderer.font_size,
            ) {
                Ok(overlay) => Some(overlay),
                Err(e) => {
                    log::warn!("Text overlay disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let clear_color = config.renderer.clear_color;
        let targets = render_targets(&render_pass, &framebuffers, swapchain.extent(), clear_color);
        let frame_loop = FrameLoop::new(&mut backend, targets, overlay.is_some())?;

        log::info!(
            "Renderer ready: {}x{}, {} swapchain images, overlay {}",
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.image_count(),
            if overlay.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            overlay,
            frame_loop,
            backend,
            framebuffers,
            render_pass,
            swapchain,
            command_pool,
            paths,
            vsync: config.window.vsync,
            clear_color,
            context,
        })
    }

    /// Handles demos create their resources against
    pub fn gpu(&self) -> GpuContext<'_> {
        GpuContext {
            context: &self.context,
            command_pool: &self.command_pool,
            render_pass: self.render_pass.handle(),
            extent: self.swapchain.extent(),
            image_count: self.swapchain.image_count(),
        }
    }

    /// Asset and shader locations
    pub fn paths(&self) -> &AssetPaths {
        &self.paths
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Frame loop, for queuing transfers and inspecting command buffer state
    pub fn frame_loop_mut(&mut self) -> &mut FrameLoop {
        &mut self.frame_loop
    }

    /// Whether the overlay exists
    pub fn has_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    /// Whether the overlay is shown
    pub fn overlay_visible(&self) -> bool {
        self.overlay.is_some() && self.frame_loop.commands().overlay_visible()
    }

    /// Show or hide the overlay
    pub fn set_overlay_visible(&mut self, visible: bool) {
        self.frame_loop.commands_mut().set_overlay_visible(visible);
    }

    /// Re-record the draw secondaries, one call of `record` per swapchain image
    pub fn rebuild_draw<F, E>(&mut self, mut record: F) -> Result<(), E>
    where
        F: FnMut(&mut DrawRecorder, usize) -> Result<(), E>,
        E: From<VulkanError>,
    {
        let device = self.context.raw_device();
        let extent = self.swapchain.extent();
        self.frame_loop
            .rebuild_secondary(&mut self.backend, SecondaryKind::Draw, |index, command_buffer| {
                let mut recorder = DrawRecorder::new(&device, command_buffer, extent);
                record(&mut recorder, index)
            })
    }

    /// Re-record the overlay secondaries from the overlay's current text
    pub fn rebuild_overlay(&mut self) -> VulkanResult<()> {
        let Some(overlay) = self.overlay.as_ref() else {
            return Ok(());
        };
        let device = self.context.raw_device();
        let extent = self.swapchain.extent();
        self.frame_loop
            .rebuild_secondary(&mut self.backend, SecondaryKind::Overlay, |_, command_buffer| {
                let mut recorder = DrawRecorder::new(&device, command_buffer, extent);
                overlay.record(&mut recorder);
                Ok::<(), VulkanError>(())
            })
    }

    /// Replace the overlay text and re-record the overlay secondaries
    ///
    /// Waits for the queue first, since in-flight frames read the overlay
    /// vertex buffer. Does nothing while the overlay is hidden.
    pub fn update_overlay<F>(&mut self, describe: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut OverlayText),
    {
        if !self.overlay_visible() {
            return Ok(());
        }
        let Some(overlay) = self.overlay.as_mut() else {
            return Ok(());
        };

        self.backend.queue_wait_idle()?;
        overlay.begin_text_update();
        describe(overlay.text_mut());
        let extent = self.swapchain.extent();
        overlay.end_text_update(
            &self.context,
            self.frame_loop.recycler_mut(),
            (extent.width, extent.height),
        )?;
        self.rebuild_overlay()
    }

    /// Acquire, draw and present one frame
    ///
    /// `before_render_pass` records into each primary ahead of the render pass
    /// whenever the primaries are rebuilt. An out-of-date swapchain surfaces as
    /// `VulkanError::SwapchainOutOfDate` converted into `E`.
    pub fn render_frame<F, E>(&mut self, before_render_pass: F) -> Result<(), E>
    where
        F: FnMut(usize, vk::CommandBuffer) -> Result<(), E>,
        E: From<VulkanError>,
    {
        let frame = self.frame_loop.prepare_frame(&mut self.backend, before_render_pass)?;
        self.frame_loop.draw_current(&mut self.backend, frame, None)?;
        self.frame_loop.submit_frame(&mut self.backend, frame)?;
        Ok(())
    }

    /// Rebuild the swapchain and framebuffers for a new window size
    ///
    /// Returns false without touching anything when the window is minimized.
    /// Both secondary collections are empty afterwards; the caller re-records
    /// them before the next frame.
    pub fn resize(&mut self, size: (u32, u32)) -> VulkanResult<bool> {
        if size.0 == 0 || size.1 == 0 {
            log::debug!("Skipping resize to {}x{}", size.0, size.1);
            return Ok(false);
        }

        self.context.wait_idle()?;
        let swapchain = self.swapchain.recreate(&self.context, size, self.vsync)?;
        if swapchain.format().format != self.swapchain.format().format {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "surface format changed from {:?} to {:?}",
                    self.swapchain.format().format,
                    swapchain.format().format
                ),
            });
        }
        let framebuffers = FramebufferSet::new(&self.context, self.render_pass.handle(), &swapchain)?;
        self.framebuffers = framebuffers;
        self.swapchain = swapchain;
        self.backend.set_swapchain(self.swapchain.handle());

        let targets = render_targets(
            &self.render_pass,
            &self.framebuffers,
            self.swapchain.extent(),
            self.clear_color,
        );
        self.frame_loop.resize(&mut self.backend, targets)?;
        Ok(true)
    }

    /// Wait for the device and release the frame loop's objects
    pub fn shutdown(&mut self) -> VulkanResult<()> {
        self.frame_loop.destroy(&mut self.backend)
    }
}

fn render_targets(
    render_pass: &RenderPass,
    framebuffers: &FramebufferSet,
    extent: vk::Extent2D,
    clear_color: [f32; 4],
) -> RenderTargets {
    RenderTargets::new(render_pass.handle(), framebuffers.handles().to_vec(), extent, clear_color)
}
