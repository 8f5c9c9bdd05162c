//! Recording backend for frame core tests

use std::collections::HashMap;
use ash::vk;
use ash::vk::Handle;
use crate::render::frame::device::{FrameBackend, RenderTargets, SecondaryInheritance, Submission};
use crate::render::frame::transfer::PendingTransfer;
use crate::render::vulkan::VulkanResult;

/// Command recorded into a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    BeginPrimary(vk::CommandBuffer, bool),
    BeginSecondary(vk::CommandBuffer, SecondaryInheritance),
    End(vk::CommandBuffer),
    BeginRenderPass(vk::CommandBuffer, usize),
    Execute(vk::CommandBuffer, Vec<vk::CommandBuffer>),
    EndRenderPass(vk::CommandBuffer),
    UpdateBuffer(vk::CommandBuffer, PendingTransfer),
}

/// Backend that hands out fake handles and records every call
///
/// Fences only signal when waited on, when the queue or device goes idle, or
/// when a test calls [`MockBackend::signal_fence`].
#[derive(Debug, Default)]
pub struct MockBackend {
    next_handle: u64,
    image_count: u32,
    next_image: u32,
    fences: HashMap<vk::Fence, bool>,
    pub submissions: Vec<(Submission, vk::Fence)>,
    pub recorded: Vec<Recorded>,
    pub allocated: Vec<(vk::CommandBufferLevel, u32)>,
    pub freed_command_buffers: Vec<vk::CommandBuffer>,
    pub destroyed_semaphores: Vec<vk::Semaphore>,
    pub destroyed_fences: Vec<vk::Fence>,
    pub destroyed_buffers: Vec<vk::Buffer>,
    pub waited_fences: Vec<vk::Fence>,
    pub presented: Vec<(u32, vk::Semaphore)>,
    pub acquire_signals: Vec<vk::Semaphore>,
    pub reset_count: usize,
    pub queue_idle_waits: usize,
}

impl MockBackend {
    pub fn new(image_count: u32) -> Self {
        Self {
            next_handle: 1,
            image_count,
            ..Self::default()
        }
    }

    pub fn set_image_count(&mut self, image_count: u32) {
        self.image_count = image_count;
        self.next_image = 0;
    }

    fn handle(&mut self) -> u64 {
        let raw = self.next_handle;
        self.next_handle += 1;
        raw
    }

    pub fn signal_fence(&mut self, fence: vk::Fence) {
        self.fences.insert(fence, true);
    }

    pub fn signal_all(&mut self) {
        for signaled in self.fences.values_mut() {
            *signaled = true;
        }
    }

    /// Allocation sizes made at `level`, in order
    pub fn allocations(&self, level: vk::CommandBufferLevel) -> Vec<u32> {
        self.allocated
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, count)| *count)
            .collect()
    }

    /// Every secondary executed from any primary
    pub fn executed_secondaries(&self) -> Vec<vk::CommandBuffer> {
        self.recorded
            .iter()
            .filter_map(|r| match r {
                Recorded::Execute(_, secondaries) => Some(secondaries.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn updates(&self) -> Vec<PendingTransfer> {
        self.recorded
            .iter()
            .filter_map(|r| match r {
                Recorded::UpdateBuffer(_, transfer) => Some(transfer.clone()),
                _ => None,
            })
            .collect()
    }
}

impl FrameBackend for MockBackend {
    fn create_semaphore(&mut self) -> VulkanResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.handle()))
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.destroyed_semaphores.push(semaphore);
    }

    fn create_fence(&mut self) -> VulkanResult<vk::Fence> {
        let fence = vk::Fence::from_raw(self.handle());
        self.fences.insert(fence, false);
        Ok(fence)
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        self.fences.remove(&fence);
        self.destroyed_fences.push(fence);
    }

    fn fence_signaled(&self, fence: vk::Fence) -> VulkanResult<bool> {
        Ok(self.fences.get(&fence).copied().unwrap_or(false))
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> VulkanResult<()> {
        assert!(
            self.fences.contains_key(&fence),
            "waited on a destroyed fence {:?}",
            fence
        );
        self.waited_fences.push(fence);
        self.signal_fence(fence);
        Ok(())
    }

    fn allocate_command_buffers(
        &mut self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> VulkanResult<Vec<vk::CommandBuffer>> {
        self.allocated.push((level, count));
        Ok((0..count)
            .map(|_| vk::CommandBuffer::from_raw(self.handle()))
            .collect())
    }

    fn free_command_buffers(&mut self, buffers: &[vk::CommandBuffer]) {
        self.freed_command_buffers.extend_from_slice(buffers);
    }

    fn reset_command_buffer(&mut self, _buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.reset_count += 1;
        Ok(())
    }

    fn begin_primary(&mut self, buffer: vk::CommandBuffer, one_time: bool) -> VulkanResult<()> {
        self.recorded.push(Recorded::BeginPrimary(buffer, one_time));
        Ok(())
    }

    fn begin_secondary(
        &mut self,
        buffer: vk::CommandBuffer,
        inheritance: &SecondaryInheritance,
    ) -> VulkanResult<()> {
        self.recorded.push(Recorded::BeginSecondary(buffer, *inheritance));
        Ok(())
    }

    fn end_command_buffer(&mut self, buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.recorded.push(Recorded::End(buffer));
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        buffer: vk::CommandBuffer,
        _targets: &RenderTargets,
        image_index: usize,
    ) {
        self.recorded.push(Recorded::BeginRenderPass(buffer, image_index));
    }

    fn execute_commands(&mut self, buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]) {
        self.recorded.push(Recorded::Execute(buffer, secondaries.to_vec()));
    }

    fn end_render_pass(&mut self, buffer: vk::CommandBuffer) {
        self.recorded.push(Recorded::EndRenderPass(buffer));
    }

    fn update_buffer(&mut self, buffer: vk::CommandBuffer, transfer: &PendingTransfer) {
        self.recorded.push(Recorded::UpdateBuffer(buffer, transfer.clone()));
    }

    fn submit(&mut self, submission: &Submission, fence: vk::Fence) -> VulkanResult<()> {
        self.submissions.push((submission.clone(), fence));
        Ok(())
    }

    fn queue_wait_idle(&mut self) -> VulkanResult<()> {
        self.queue_idle_waits += 1;
        self.signal_all();
        Ok(())
    }

    fn device_wait_idle(&mut self) -> VulkanResult<()> {
        self.signal_all();
        Ok(())
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> VulkanResult<u32> {
        self.acquire_signals.push(signal);
        let image = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count.max(1);
        Ok(image)
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VulkanResult<()> {
        self.presented.push((image_index, wait));
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer, _memory: vk::DeviceMemory) {
        self.destroyed_buffers.push(buffer);
    }
}

/// Render targets with `image_count` fake framebuffers
pub fn targets(image_count: u64) -> RenderTargets {
    RenderTargets::new(
        vk::RenderPass::from_raw(0xA000),
        (0..image_count)
            .map(|i| vk::Framebuffer::from_raw(0xB000 + i))
            .collect(),
        vk::Extent2D { width: 1280, height: 720 },
        [0.1, 0.1, 0.1, 1.0],
    )
}
