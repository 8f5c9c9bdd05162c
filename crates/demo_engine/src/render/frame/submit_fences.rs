//! Per-image submit fence tracking

use ash::vk;
use crate::render::frame::device::FrameBackend;
use crate::render::vulkan::VulkanResult;

/// Outstanding submission fence per swapchain image
///
/// The fences themselves are owned by the recycler: each one is the fence a
/// dumpster batch is bound to, and it is destroyed when that batch runs.
#[derive(Debug, Default)]
pub struct SubmitFences {
    slots: Vec<Option<vk::Fence>>,
}

impl SubmitFences {
    /// Track `image_count` images, none outstanding
    pub fn new(image_count: usize) -> Self {
        Self {
            slots: vec![None; image_count],
        }
    }

    /// Fence for a new submission on `image_index`
    ///
    /// If the image still has a submission in flight, blocks on it first.
    pub fn acquire<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        image_index: usize,
    ) -> VulkanResult<vk::Fence> {
        if let Some(previous) = self.slots[image_index].take() {
            log::trace!("Waiting on outstanding submit fence for image {}", image_index);
            backend.wait_for_fence(previous)?;
        }
        let fence = backend.create_fence()?;
        self.slots[image_index] = Some(fence);
        Ok(fence)
    }

    /// Forget the slot for `image_index` if it still holds `fence`
    pub fn clear(&mut self, image_index: usize, fence: vk::Fence) {
        if let Some(slot) = self.slots.get_mut(image_index) {
            if *slot == Some(fence) {
                *slot = None;
            }
        }
    }

    /// Fence currently outstanding for `image_index`
    pub fn outstanding(&self, image_index: usize) -> Option<vk::Fence> {
        self.slots.get(image_index).copied().flatten()
    }

    /// Drop all tracking and resize to a new image count
    ///
    /// Only valid after the device went idle.
    pub fn reset(&mut self, image_count: usize) {
        self.slots = vec![None; image_count];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frame::mock::MockBackend;

    #[test]
    fn test_acquire_waits_on_previous_fence() {
        let mut backend = MockBackend::new(2);
        let mut fences = SubmitFences::new(2);

        let first = fences.acquire(&mut backend, 0).unwrap();
        assert_eq!(fences.outstanding(0), Some(first));
        assert!(backend.waited_fences.is_empty());

        let second = fences.acquire(&mut backend, 0).unwrap();
        assert_ne!(first, second);
        assert_eq!(backend.waited_fences, vec![first]);
        assert_eq!(fences.outstanding(0), Some(second));
    }

    #[test]
    fn test_clear_ignores_stale_fence() {
        let mut backend = MockBackend::new(2);
        let mut fences = SubmitFences::new(2);

        let first = fences.acquire(&mut backend, 1).unwrap();
        let second = fences.acquire(&mut backend, 1).unwrap();

        fences.clear(1, first);
        assert_eq!(fences.outstanding(1), Some(second));

        fences.clear(1, second);
        assert_eq!(fences.outstanding(1), None);
    }
}
