//! Device operations the frame core depends on
//!
//! The frame loop, the command buffer manager and the recycler only ever talk to
//! the GPU through [`FrameBackend`]. The Vulkan implementation lives in
//! `render::vulkan::backend`; tests drive the same code through a mock.

use ash::vk;
use crate::render::frame::transfer::PendingTransfer;
use crate::render::vulkan::VulkanResult;

/// Render pass and per-image framebuffers that secondary and primary command
/// buffers are recorded against
#[derive(Clone)]
pub struct RenderTargets {
    /// Render pass all demo drawing happens in
    pub render_pass: vk::RenderPass,
    /// One framebuffer per swapchain image
    pub framebuffers: Vec<vk::Framebuffer>,
    /// Render area
    pub extent: vk::Extent2D,
    /// Clear values for the colour and depth attachments
    pub clear_values: [vk::ClearValue; 2],
}

impl std::fmt::Debug for RenderTargets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `vk::ClearValue` is a union and does not implement `Debug`
        f.debug_struct("RenderTargets")
            .field("render_pass", &self.render_pass)
            .field("framebuffers", &self.framebuffers)
            .field("extent", &self.extent)
            .finish_non_exhaustive()
    }
}

impl RenderTargets {
    /// Build targets with the default clear colour and a depth clear of 1.0
    pub fn new(
        render_pass: vk::RenderPass,
        framebuffers: Vec<vk::Framebuffer>,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> Self {
        Self {
            render_pass,
            framebuffers,
            extent,
            clear_values: [
                vk::ClearValue {
                    color: vk::ClearColorValue { float32: clear_color },
                },
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
                },
            ],
        }
    }

    /// Number of swapchain images the targets cover
    pub fn image_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Full render area rectangle
    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

/// Inheritance state for a secondary command buffer recorded for one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondaryInheritance {
    /// Render pass the secondary executes inside
    pub render_pass: vk::RenderPass,
    /// Subpass index
    pub subpass: u32,
    /// Framebuffer of the image the buffer belongs to
    pub framebuffer: vk::Framebuffer,
}

/// One queue submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    /// Semaphores waited on before execution
    pub wait_semaphores: Vec<vk::Semaphore>,
    /// Stage each wait semaphore gates, parallel to `wait_semaphores`
    pub wait_stages: Vec<vk::PipelineStageFlags>,
    /// Command buffers executed in order
    pub command_buffers: Vec<vk::CommandBuffer>,
    /// Semaphores signalled on completion
    pub signal_semaphores: Vec<vk::Semaphore>,
}

impl Submission {
    /// Add a wait on `semaphore` at `stage`
    pub fn wait_on(&mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags) {
        self.wait_semaphores.push(semaphore);
        self.wait_stages.push(stage);
    }

    /// Whether this submission waits on `semaphore`
    pub fn waits_on(&self, semaphore: vk::Semaphore) -> bool {
        self.wait_semaphores.contains(&semaphore)
    }

    /// Stage the submission waits on `semaphore` at, if it waits on it at all
    pub fn wait_stage_for(&self, semaphore: vk::Semaphore) -> Option<vk::PipelineStageFlags> {
        self.wait_semaphores
            .iter()
            .position(|&s| s == semaphore)
            .map(|i| self.wait_stages[i])
    }
}

/// GPU operations used by the per-frame orchestration
///
/// All waits are unbounded; there is no timeout anywhere in the frame path.
pub trait FrameBackend {
    /// Create a binary semaphore
    fn create_semaphore(&mut self) -> VulkanResult<vk::Semaphore>;
    /// Destroy a semaphore
    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);

    /// Create an unsignalled fence
    fn create_fence(&mut self) -> VulkanResult<vk::Fence>;
    /// Destroy a fence
    fn destroy_fence(&mut self, fence: vk::Fence);
    /// Non-blocking fence status query
    fn fence_signaled(&self, fence: vk::Fence) -> VulkanResult<bool>;
    /// Block until `fence` signals
    fn wait_for_fence(&mut self, fence: vk::Fence) -> VulkanResult<()>;

    /// Allocate `count` command buffers of the given level from the frame pool
    fn allocate_command_buffers(
        &mut self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> VulkanResult<Vec<vk::CommandBuffer>>;
    /// Return command buffers to the pool
    fn free_command_buffers(&mut self, buffers: &[vk::CommandBuffer]);
    /// Reset a command buffer so it can be re-recorded
    fn reset_command_buffer(&mut self, buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Begin a primary command buffer; `one_time` marks it one-time-submit
    fn begin_primary(&mut self, buffer: vk::CommandBuffer, one_time: bool) -> VulkanResult<()>;
    /// Begin a secondary command buffer continuing `inheritance`'s render pass
    fn begin_secondary(
        &mut self,
        buffer: vk::CommandBuffer,
        inheritance: &SecondaryInheritance,
    ) -> VulkanResult<()>;
    /// Finish recording
    fn end_command_buffer(&mut self, buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Begin the render pass on image `image_index` with secondary contents
    fn begin_render_pass(
        &mut self,
        buffer: vk::CommandBuffer,
        targets: &RenderTargets,
        image_index: usize,
    );
    /// Execute secondary command buffers from a primary
    fn execute_commands(&mut self, buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]);
    /// End the current render pass
    fn end_render_pass(&mut self, buffer: vk::CommandBuffer);
    /// Record an inline buffer update
    fn update_buffer(&mut self, buffer: vk::CommandBuffer, transfer: &PendingTransfer);

    /// Submit to the graphics queue, signalling `fence` on completion
    fn submit(&mut self, submission: &Submission, fence: vk::Fence) -> VulkanResult<()>;
    /// Wait until the graphics queue is idle
    fn queue_wait_idle(&mut self) -> VulkanResult<()>;
    /// Wait until the whole device is idle
    fn device_wait_idle(&mut self) -> VulkanResult<()>;

    /// Acquire the next swapchain image, signalling `signal` when it is ready
    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> VulkanResult<u32>;
    /// Present `image_index` once `wait` is signalled
    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VulkanResult<()>;

    /// Destroy a buffer and free its memory
    fn destroy_buffer(&mut self, buffer: vk::Buffer, memory: vk::DeviceMemory);
}
