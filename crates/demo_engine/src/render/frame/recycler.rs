//! Fence-gated deferred destruction
//!
//! Objects that may still be referenced by in-flight GPU work are not destroyed
//! directly. They go into the dumpster as [`CleanupAction`]s; the next
//! submission binds the dumpster to its fence, and the batch only runs once
//! that fence has signalled.

use std::collections::VecDeque;
use ash::vk;
use crate::render::frame::device::FrameBackend;
use crate::render::frame::submit_fences::SubmitFences;
use crate::render::vulkan::VulkanResult;

/// A deferred destruction step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupAction {
    /// Destroy a semaphore
    DestroySemaphore(vk::Semaphore),
    /// Free command buffers back to the frame pool
    FreeCommandBuffers(Vec<vk::CommandBuffer>),
    /// Forget the outstanding submit fence of an image, if it is still `fence`
    ClearSubmitFence {
        /// Swapchain image index
        image_index: usize,
        /// Fence the slot is expected to hold
        fence: vk::Fence,
    },
    /// Destroy a buffer and its memory
    DestroyBuffer {
        /// Buffer handle
        buffer: vk::Buffer,
        /// Backing memory
        memory: vk::DeviceMemory,
    },
}

impl CleanupAction {
    fn run<B: FrameBackend>(self, backend: &mut B, submit_fences: &mut SubmitFences) {
        match self {
            Self::DestroySemaphore(semaphore) => backend.destroy_semaphore(semaphore),
            Self::FreeCommandBuffers(buffers) => {
                if !buffers.is_empty() {
                    backend.free_command_buffers(&buffers);
                }
            }
            Self::ClearSubmitFence { image_index, fence } => {
                submit_fences.clear(image_index, fence);
            }
            Self::DestroyBuffer { buffer, memory } => backend.destroy_buffer(buffer, memory),
        }
    }
}

/// Dumpster plus the FIFO of fenced batches
#[derive(Debug, Default)]
pub struct Recycler {
    dumpster: Vec<CleanupAction>,
    pending: VecDeque<(vk::Fence, Vec<CleanupAction>)>,
}

impl Recycler {
    /// Create an empty recycler
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an action in the dumpster; it is bound to the next submission's fence
    pub fn discard(&mut self, action: CleanupAction) {
        self.dumpster.push(action);
    }

    /// Move a command buffer collection into the dumpster, leaving it empty
    pub fn trash_command_buffers(&mut self, buffers: &mut Vec<vk::CommandBuffer>) {
        if buffers.is_empty() {
            return;
        }
        self.dumpster
            .push(CleanupAction::FreeCommandBuffers(std::mem::take(buffers)));
    }

    /// Bind everything in the dumpster to `fence`
    ///
    /// The fence is always queued, even with an empty dumpster, so that the
    /// recycler owns its destruction.
    pub fn empty_dumpster(&mut self, fence: vk::Fence) {
        let actions = std::mem::take(&mut self.dumpster);
        self.pending.push_back((fence, actions));
    }

    /// Queue a batch bound to a fence directly, bypassing the dumpster
    pub fn push_batch(&mut self, fence: vk::Fence, actions: Vec<CleanupAction>) {
        self.pending.push_back((fence, actions));
    }

    /// Run every leading batch whose fence has signalled, then destroy the fence
    ///
    /// Stops at the first batch whose fence is still pending, so batches always
    /// run in submission order.
    pub fn recycle<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        submit_fences: &mut SubmitFences,
    ) -> VulkanResult<usize> {
        let mut ran = 0;
        while let Some((fence, _)) = self.pending.front() {
            if !backend.fence_signaled(*fence)? {
                break;
            }
            if let Some((fence, actions)) = self.pending.pop_front() {
                for action in actions {
                    action.run(backend, submit_fences);
                }
                backend.destroy_fence(fence);
                ran += 1;
            }
        }
        Ok(ran)
    }

    /// Run everything regardless of fence state
    ///
    /// Only valid once the device is idle.
    pub fn flush<B: FrameBackend>(&mut self, backend: &mut B, submit_fences: &mut SubmitFences) {
        while let Some((fence, actions)) = self.pending.pop_front() {
            for action in actions {
                action.run(backend, submit_fences);
            }
            backend.destroy_fence(fence);
        }
        for action in std::mem::take(&mut self.dumpster) {
            action.run(backend, submit_fences);
        }
        log::debug!("Recycler flushed");
    }

    /// Actions not yet bound to a fence
    pub fn dumpster_len(&self) -> usize {
        self.dumpster.len()
    }

    /// Fenced batches still waiting
    pub fn pending_batches(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frame::mock::MockBackend;
    use ash::vk::Handle;

    #[test]
    fn test_actions_wait_for_their_fence() {
        let mut backend = MockBackend::new(2);
        let mut fences = SubmitFences::new(2);
        let mut recycler = Recycler::new();

        let semaphore = backend.create_semaphore().unwrap();
        let fence = backend.create_fence().unwrap();
        recycler.discard(CleanupAction::DestroySemaphore(semaphore));
        recycler.empty_dumpster(fence);

        assert_eq!(recycler.recycle(&mut backend, &mut fences).unwrap(), 0);
        assert!(!backend.destroyed_semaphores.contains(&semaphore));
        assert_eq!(recycler.pending_batches(), 1);

        backend.signal_fence(fence);
        assert_eq!(recycler.recycle(&mut backend, &mut fences).unwrap(), 1);
        assert!(backend.destroyed_semaphores.contains(&semaphore));
        assert!(backend.destroyed_fences.contains(&fence));
        assert_eq!(recycler.pending_batches(), 0);
    }

    #[test]
    fn test_batches_run_in_order() {
        let mut backend = MockBackend::new(2);
        let mut fences = SubmitFences::new(2);
        let mut recycler = Recycler::new();

        let first = backend.create_fence().unwrap();
        let second = backend.create_fence().unwrap();
        let sem_a = backend.create_semaphore().unwrap();
        let sem_b = backend.create_semaphore().unwrap();

        recycler.discard(CleanupAction::DestroySemaphore(sem_a));
        recycler.empty_dumpster(first);
        recycler.discard(CleanupAction::DestroySemaphore(sem_b));
        recycler.empty_dumpster(second);

        // Second fence done but first still pending: nothing may run yet
        backend.signal_fence(second);
        assert_eq!(recycler.recycle(&mut backend, &mut fences).unwrap(), 0);
        assert!(backend.destroyed_semaphores.is_empty());

        backend.signal_fence(first);
        assert_eq!(recycler.recycle(&mut backend, &mut fences).unwrap(), 2);
        assert_eq!(backend.destroyed_semaphores, vec![sem_a, sem_b]);
    }

    #[test]
    fn test_trash_command_buffers_empties_collection() {
        let mut recycler = Recycler::new();
        let mut buffers = vec![vk::CommandBuffer::from_raw(7), vk::CommandBuffer::from_raw(8)];
        recycler.trash_command_buffers(&mut buffers);
        assert!(buffers.is_empty());
        assert_eq!(recycler.dumpster_len(), 1);

        // Trashing an empty collection adds nothing
        recycler.trash_command_buffers(&mut buffers);
        assert_eq!(recycler.dumpster_len(), 1);
    }

    #[test]
    fn test_flush_runs_everything() {
        let mut backend = MockBackend::new(2);
        let mut fences = SubmitFences::new(2);
        let mut recycler = Recycler::new();

        let fence = backend.create_fence().unwrap();
        let bound = backend.create_semaphore().unwrap();
        let loose = backend.create_semaphore().unwrap();
        recycler.discard(CleanupAction::DestroySemaphore(bound));
        recycler.empty_dumpster(fence);
        recycler.discard(CleanupAction::DestroySemaphore(loose));

        recycler.flush(&mut backend, &mut fences);
        assert_eq!(backend.destroyed_semaphores, vec![bound, loose]);
        assert_eq!(recycler.pending_batches(), 0);
        assert_eq!(recycler.dumpster_len(), 0);
    }
}
