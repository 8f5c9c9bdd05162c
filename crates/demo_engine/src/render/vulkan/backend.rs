//! [`FrameBackend`] on a real device

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};
use crate::render::frame::{FrameBackend, PendingTransfer, RenderTargets, SecondaryInheritance, Submission};
use crate::render::vulkan::context::{VulkanContext, VulkanError, VulkanResult};
use crate::render::vulkan::swapchain::{acquire_image, present_image};

/// Frame operations against one device, queue pair, command pool and swapchain
pub struct VulkanBackend {
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    command_pool: vk::CommandPool,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
}

impl VulkanBackend {
    /// Bind the backend to a context, pool and swapchain
    pub fn new(context: &VulkanContext, command_pool: vk::CommandPool, swapchain: vk::SwapchainKHR) -> Self {
        Self {
            device: context.raw_device(),
            graphics_queue: context.graphics_queue(),
            present_queue: context.present_queue(),
            command_pool,
            swapchain_loader: context.swapchain_loader().clone(),
            swapchain,
        }
    }

    /// Point acquire/present at a rebuilt swapchain
    pub fn set_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        self.swapchain = swapchain;
    }
}

impl FrameBackend for VulkanBackend {
    fn create_semaphore(&mut self) -> VulkanResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.create_semaphore(&create_info, None).map_err(VulkanError::Api) }
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&mut self) -> VulkanResult<vk::Fence> {
        let create_info = vk::FenceCreateInfo::builder();
        unsafe { self.device.create_fence(&create_info, None).map_err(VulkanError::Api) }
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn fence_signaled(&self, fence: vk::Fence) -> VulkanResult<bool> {
        unsafe { self.device.get_fence_status(fence).map_err(VulkanError::Api) }
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(VulkanError::Api)
        }
    }

    fn allocate_command_buffers(
        &mut self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(level)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&alloc_info).map_err(VulkanError::Api) }
    }

    fn free_command_buffers(&mut self, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(self.command_pool, buffers) }
    }

    fn reset_command_buffer(&mut self, buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(buffer, vk::CommandBufferResetFlags::RELEASE_RESOURCES)
                .map_err(VulkanError::Api)
        }
    }

    fn begin_primary(&mut self, buffer: vk::CommandBuffer, one_time: bool) -> VulkanResult<()> {
        let flags = if one_time {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::SIMULTANEOUS_USE
        };
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe {
            self.device
                .begin_command_buffer(buffer, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    fn begin_secondary(
        &mut self,
        buffer: vk::CommandBuffer,
        inheritance: &SecondaryInheritance,
    ) -> VulkanResult<()> {
        let inheritance_info = vk::CommandBufferInheritanceInfo::builder()
            .render_pass(inheritance.render_pass)
            .subpass(inheritance.subpass)
            .framebuffer(inheritance.framebuffer);
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(
                vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE
                    | vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
            )
            .inheritance_info(&inheritance_info);
        unsafe {
            self.device
                .begin_command_buffer(buffer, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    fn end_command_buffer(&mut self, buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe { self.device.end_command_buffer(buffer).map_err(VulkanError::Api) }
    }

    fn begin_render_pass(&mut self, buffer: vk::CommandBuffer, targets: &RenderTargets, image_index: usize) {
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(targets.render_pass)
            .framebuffer(targets.framebuffers[image_index])
            .render_area(targets.render_area())
            .clear_values(&targets.clear_values);
        unsafe {
            self.device.cmd_begin_render_pass(
                buffer,
                &begin_info,
                vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
            );
        }
    }

    fn execute_commands(&mut self, buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]) {
        unsafe { self.device.cmd_execute_commands(buffer, secondaries) }
    }

    fn end_render_pass(&mut self, buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(buffer) }
    }

    fn update_buffer(&mut self, buffer: vk::CommandBuffer, transfer: &PendingTransfer) {
        unsafe {
            self.device
                .cmd_update_buffer(buffer, transfer.buffer, transfer.offset, &transfer.data);
        }
    }

    fn submit(&mut self, submission: &Submission, fence: vk::Fence) -> VulkanResult<()> {
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&submission.wait_semaphores)
            .wait_dst_stage_mask(&submission.wait_stages)
            .command_buffers(&submission.command_buffers)
            .signal_semaphores(&submission.signal_semaphores)
            .build();
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], fence)
                .map_err(VulkanError::Api)
        }
    }

    fn queue_wait_idle(&mut self) -> VulkanResult<()> {
        unsafe { self.device.queue_wait_idle(self.graphics_queue).map_err(VulkanError::Api) }
    }

    fn device_wait_idle(&mut self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> VulkanResult<u32> {
        acquire_image(&self.swapchain_loader, self.swapchain, signal)
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VulkanResult<()> {
        present_image(&self.swapchain_loader, self.present_queue, self.swapchain, image_index, wait)
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer, memory: vk::DeviceMemory) {
        unsafe {
            self.device.destroy_buffer(buffer, None);
            self.device.free_memory(memory, None);
        }
    }
}
