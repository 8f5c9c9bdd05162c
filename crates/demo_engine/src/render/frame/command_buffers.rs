//! Primary, draw and overlay command buffer collections
//!
//! Each non-empty collection holds exactly one buffer per swapchain image. The
//! secondaries carry the demo's drawing and the text overlay; the primaries only
//! open the render pass and execute them, so they are re-recorded whenever a
//! secondary collection changes.

use ash::vk;
use crate::render::frame::device::{FrameBackend, RenderTargets, SecondaryInheritance};
use crate::render::frame::recycler::Recycler;
use crate::render::vulkan::VulkanError;

/// Which secondary collection to rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryKind {
    /// Scene drawing recorded by the demo
    Draw,
    /// Text overlay
    Overlay,
}

/// Owner of the three per-image command buffer collections
#[derive(Debug, Default)]
pub struct CommandBufferManager {
    primary: Vec<vk::CommandBuffer>,
    draw: Vec<vk::CommandBuffer>,
    overlay: Vec<vk::CommandBuffer>,
    primary_dirty: bool,
    overlay_enabled: bool,
    overlay_visible: bool,
}

impl CommandBufferManager {
    /// Create an empty manager
    pub fn new(overlay_enabled: bool) -> Self {
        Self {
            overlay_enabled,
            overlay_visible: true,
            ..Self::default()
        }
    }

    /// Re-record one secondary collection
    ///
    /// The old buffers may still be executing, so they go through the dumpster
    /// rather than being freed here. `record` is called once per image between
    /// begin and end. If any recording fails the previous collection is kept
    /// and the partially recorded one is discarded.
    pub fn rebuild_secondary<B, F, E>(
        &mut self,
        backend: &mut B,
        recycler: &mut Recycler,
        targets: &RenderTargets,
        kind: SecondaryKind,
        mut record: F,
    ) -> Result<(), E>
    where
        B: FrameBackend,
        F: FnMut(usize, vk::CommandBuffer) -> Result<(), E>,
        E: From<VulkanError>,
    {
        let count = targets.image_count();
        let mut buffers =
            backend.allocate_command_buffers(vk::CommandBufferLevel::SECONDARY, count as u32)?;

        for (index, &buffer) in buffers.iter().enumerate() {
            let inheritance = SecondaryInheritance {
                render_pass: targets.render_pass,
                subpass: 0,
                framebuffer: targets.framebuffers[index],
            };
            let recorded = backend
                .begin_secondary(buffer, &inheritance)
                .map_err(E::from)
                .and_then(|()| record(index, buffer))
                .and_then(|()| backend.end_command_buffer(buffer).map_err(E::from));
            if let Err(e) = recorded {
                recycler.trash_command_buffers(&mut buffers);
                return Err(e);
            }
        }

        let collection = match kind {
            SecondaryKind::Draw => &mut self.draw,
            SecondaryKind::Overlay => &mut self.overlay,
        };
        recycler.trash_command_buffers(collection);
        *collection = buffers;
        log::debug!("Rebuilt {:?} command buffers for {} images", kind, count);
        self.primary_dirty = true;
        Ok(())
    }

    /// Re-record the primary command buffers
    ///
    /// # Panics
    ///
    /// Panics when the draw collection has not been built for the current
    /// image count.
    pub fn rebuild_primary<B, F, E>(
        &mut self,
        backend: &mut B,
        targets: &RenderTargets,
        mut before_render_pass: F,
    ) -> Result<(), E>
    where
        B: FrameBackend,
        F: FnMut(usize, vk::CommandBuffer) -> Result<(), E>,
        E: From<VulkanError>,
    {
        assert!(
            !self.draw.is_empty(),
            "draw command buffers must be built before the primary command buffers"
        );
        let count = targets.image_count();
        assert_eq!(self.draw.len(), count, "draw command buffers do not match the image count");

        backend.queue_wait_idle()?;

        if self.primary.len() == count {
            for &buffer in &self.primary {
                backend.reset_command_buffer(buffer)?;
            }
        } else {
            if !self.primary.is_empty() {
                backend.free_command_buffers(&self.primary);
                self.primary.clear();
            }
            self.primary =
                backend.allocate_command_buffers(vk::CommandBufferLevel::PRIMARY, count as u32)?;
        }

        let with_overlay = self.overlay_active() && self.overlay.len() == count;
        for index in 0..count {
            let buffer = self.primary[index];
            backend.begin_primary(buffer, false)?;
            before_render_pass(index, buffer)?;
            backend.begin_render_pass(buffer, targets, index);
            backend.execute_commands(buffer, &[self.draw[index]]);
            if with_overlay {
                backend.execute_commands(buffer, &[self.overlay[index]]);
            }
            backend.end_render_pass(buffer);
            backend.end_command_buffer(buffer)?;
        }

        self.primary_dirty = false;
        Ok(())
    }

    /// Drop all three collections after a swapchain rebuild
    ///
    /// Only valid once the device is idle.
    pub fn invalidate<B: FrameBackend>(&mut self, backend: &mut B) {
        for collection in [&mut self.primary, &mut self.draw, &mut self.overlay] {
            if !collection.is_empty() {
                backend.free_command_buffers(collection);
                collection.clear();
            }
        }
        self.primary_dirty = true;
    }

    /// Whether the primaries need re-recording before the next frame
    pub fn is_dirty(&self) -> bool {
        self.primary_dirty
    }

    /// Force a primary rebuild on the next frame
    pub fn mark_dirty(&mut self) {
        self.primary_dirty = true;
    }

    /// Primary buffer for `image_index`, if built
    pub fn primary(&self, image_index: usize) -> Option<vk::CommandBuffer> {
        self.primary.get(image_index).copied()
    }

    /// Number of buffers in a secondary collection
    pub fn secondary_len(&self, kind: SecondaryKind) -> usize {
        match kind {
            SecondaryKind::Draw => self.draw.len(),
            SecondaryKind::Overlay => self.overlay.len(),
        }
    }

    /// Number of primary buffers
    pub fn primary_len(&self) -> usize {
        self.primary.len()
    }

    /// Whether the overlay exists at all
    pub fn overlay_enabled(&self) -> bool {
        self.overlay_enabled
    }

    /// Show or hide the overlay; changes mark the primaries dirty
    pub fn set_overlay_visible(&mut self, visible: bool) {
        if self.overlay_visible != visible {
            self.overlay_visible = visible;
            self.primary_dirty = true;
        }
    }

    /// Whether the overlay is currently shown
    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    fn overlay_active(&self) -> bool {
        self.overlay_enabled && self.overlay_visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frame::mock::{targets, MockBackend, Recorded};
    use crate::render::vulkan::VulkanResult;

    fn build_draw(
        manager: &mut CommandBufferManager,
        backend: &mut MockBackend,
        recycler: &mut Recycler,
        targets: &RenderTargets,
    ) {
        manager
            .rebuild_secondary(backend, recycler, targets, SecondaryKind::Draw, |_, _| {
                VulkanResult::Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_secondary_rebuild_marks_dirty() {
        let mut backend = MockBackend::new(3);
        let mut recycler = Recycler::new();
        let targets = targets(3);
        let mut manager = CommandBufferManager::new(false);

        let mut recorded = Vec::new();
        manager
            .rebuild_secondary(&mut backend, &mut recycler, &targets, SecondaryKind::Draw, |i, cmd| {
                recorded.push((i, cmd));
                VulkanResult::Ok(())
            })
            .unwrap();

        assert!(manager.is_dirty());
        assert_eq!(manager.secondary_len(SecondaryKind::Draw), 3);
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_secondary_inherits_image_framebuffer() {
        let mut backend = MockBackend::new(2);
        let mut recycler = Recycler::new();
        let targets = targets(2);
        let mut manager = CommandBufferManager::new(false);
        build_draw(&mut manager, &mut backend, &mut recycler, &targets);

        let inherited: Vec<_> = backend
            .recorded
            .iter()
            .filter_map(|r| match r {
                Recorded::BeginSecondary(_, inheritance) => Some(inheritance.framebuffer),
                _ => None,
            })
            .collect();
        assert_eq!(inherited, targets.framebuffers);
    }

    #[test]
    fn test_rebuild_trashes_previous_secondaries() {
        let mut backend = MockBackend::new(2);
        let mut recycler = Recycler::new();
        let targets = targets(2);
        let mut manager = CommandBufferManager::new(false);

        build_draw(&mut manager, &mut backend, &mut recycler, &targets);
        assert_eq!(recycler.dumpster_len(), 0);
        build_draw(&mut manager, &mut backend, &mut recycler, &targets);
        assert_eq!(recycler.dumpster_len(), 1);
        assert!(backend.freed_command_buffers.is_empty());
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_secondaries() {
        let mut backend = MockBackend::new(2);
        let mut recycler = Recycler::new();
        let targets = targets(2);
        let mut manager = CommandBufferManager::new(false);
        build_draw(&mut manager, &mut backend, &mut recycler, &targets);
        manager
            .rebuild_primary(&mut backend, &targets, |_, _| VulkanResult::Ok(()))
            .unwrap();
        let executed = backend.executed_secondaries();

        let result = manager.rebuild_secondary(&mut backend, &mut recycler, &targets, SecondaryKind::Draw, |index, _| {
            if index == 1 {
                Err(VulkanError::InvalidOperation {
                    reason: "recording failed".to_string(),
                })
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(manager.secondary_len(SecondaryKind::Draw), 2);
        assert!(!manager.is_dirty());
        // Only the half-recorded collection was discarded
        assert_eq!(recycler.dumpster_len(), 1);

        backend.recorded.clear();
        manager.mark_dirty();
        manager
            .rebuild_primary(&mut backend, &targets, |_, _| VulkanResult::Ok(()))
            .unwrap();
        assert_eq!(backend.executed_secondaries(), executed);
    }

    #[test]
    fn test_primary_rebuild_clears_dirty_and_reuses_buffers() {
        let mut backend = MockBackend::new(2);
        let mut recycler = Recycler::new();
        let targets = targets(2);
        let mut manager = CommandBufferManager::new(false);
        build_draw(&mut manager, &mut backend, &mut recycler, &targets);

        manager
            .rebuild_primary(&mut backend, &targets, |_, _| VulkanResult::Ok(()))
            .unwrap();
        assert!(!manager.is_dirty());
        let first = manager.primary(0);

        manager.mark_dirty();
        manager
            .rebuild_primary(&mut backend, &targets, |_, _| VulkanResult::Ok(()))
            .unwrap();
        assert_eq!(manager.primary(0), first);
        assert_eq!(backend.allocations(vk::CommandBufferLevel::PRIMARY), vec![2]);
        assert_eq!(backend.reset_count, 2);
    }

    #[test]
    fn test_overlay_executed_only_when_visible() {
        let mut backend = MockBackend::new(1);
        let mut recycler = Recycler::new();
        let targets = targets(1);
        let mut manager = CommandBufferManager::new(true);
        build_draw(&mut manager, &mut backend, &mut recycler, &targets);
        manager
            .rebuild_secondary(&mut backend, &mut recycler, &targets, SecondaryKind::Overlay, |_, _| {
                VulkanResult::Ok(())
            })
            .unwrap();

        manager
            .rebuild_primary(&mut backend, &targets, |_, _| VulkanResult::Ok(()))
            .unwrap();
        assert_eq!(backend.executed_secondaries().len(), 2);

        manager.set_overlay_visible(false);
        assert!(manager.is_dirty());
        backend.recorded.clear();
        manager
            .rebuild_primary(&mut backend, &targets, |_, _| VulkanResult::Ok(()))
            .unwrap();
        assert_eq!(backend.executed_secondaries().len(), 1);
    }

    #[test]
    #[should_panic(expected = "draw command buffers must be built")]
    fn test_primary_rebuild_without_draw_buffers_panics() {
        let mut backend = MockBackend::new(2);
        let targets = targets(2);
        let mut manager = CommandBufferManager::new(false);
        let _ = manager.rebuild_primary(&mut backend, &targets, |_, _| VulkanResult::Ok(()));
    }

    #[test]
    fn test_invalidate_frees_everything() {
        let mut backend = MockBackend::new(2);
        let mut recycler = Recycler::new();
        let targets = targets(2);
        let mut manager = CommandBufferManager::new(false);
        build_draw(&mut manager, &mut backend, &mut recycler, &targets);
        manager
            .rebuild_primary(&mut backend, &targets, |_, _| VulkanResult::Ok(()))
            .unwrap();

        manager.invalidate(&mut backend);
        assert!(manager.is_dirty());
        assert_eq!(manager.primary_len(), 0);
        assert_eq!(manager.secondary_len(SecondaryKind::Draw), 0);
        assert_eq!(backend.freed_command_buffers.len(), 4);
    }
}
