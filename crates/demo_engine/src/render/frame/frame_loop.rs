//! Per-frame acquire, submit and present
//!
//! One frame goes through `prepare_frame` → `draw_current` → `submit_frame`.
//! The image index produced by `prepare_frame` travels in a [`FrameContext`]
//! instead of living in shared state.
//!
//! Buffer updates queued during a frame are submitted right after that frame's
//! draw, gated on a semaphore the draw signals. The following frame waits on
//! their completion at the transfer stage, so a frame's draw only ever sees
//! updates queued before the *previous* frame's draw.

use ash::vk;
use crate::render::frame::command_buffers::{CommandBufferManager, SecondaryKind};
use crate::render::frame::device::{FrameBackend, RenderTargets, Submission};
use crate::render::frame::recycler::{CleanupAction, Recycler};
use crate::render::frame::submit_fences::SubmitFences;
use crate::render::frame::transfer::TransferQueue;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Where the loop is inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Between frames
    Idle,
    /// Re-recording primary command buffers
    Recording,
    /// Image acquired, waiting for the draw submission
    Acquiring,
    /// Draw submitted, waiting for present
    Submitting,
    /// Presenting
    Presenting,
}

/// The swapchain image a frame renders to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    /// Index of the acquired swapchain image
    pub image_index: u32,
}

/// Frame orchestration state
#[derive(Debug)]
pub struct FrameLoop {
    acquire_complete: vk::Semaphore,
    render_complete: vk::Semaphore,
    transfer_complete: Option<vk::Semaphore>,
    state: FrameState,
    commands: CommandBufferManager,
    recycler: Recycler,
    submit_fences: SubmitFences,
    transfers: TransferQueue,
    targets: RenderTargets,
}

impl FrameLoop {
    /// Create the loop and its semaphore pair
    pub fn new<B: FrameBackend>(
        backend: &mut B,
        targets: RenderTargets,
        overlay_enabled: bool,
    ) -> VulkanResult<Self> {
        let acquire_complete = backend.create_semaphore()?;
        let render_complete = backend.create_semaphore()?;
        let image_count = targets.image_count();
        Ok(Self {
            acquire_complete,
            render_complete,
            transfer_complete: None,
            state: FrameState::Idle,
            commands: CommandBufferManager::new(overlay_enabled),
            recycler: Recycler::new(),
            submit_fences: SubmitFences::new(image_count),
            transfers: TransferQueue::new(),
            targets,
        })
    }

    /// Re-record one secondary collection against the current targets
    pub fn rebuild_secondary<B, F, E>(
        &mut self,
        backend: &mut B,
        kind: SecondaryKind,
        record: F,
    ) -> Result<(), E>
    where
        B: FrameBackend,
        F: FnMut(usize, vk::CommandBuffer) -> Result<(), E>,
        E: From<VulkanError>,
    {
        assert_eq!(self.state, FrameState::Idle, "secondary rebuild inside a frame");
        self.commands
            .rebuild_secondary(backend, &mut self.recycler, &self.targets, kind, record)
    }

    /// Rebuild the primaries if dirty, then acquire the next image
    ///
    /// # Panics
    ///
    /// Panics when called inside a frame, or when the primaries are dirty and
    /// no draw command buffers exist.
    pub fn prepare_frame<B, F, E>(
        &mut self,
        backend: &mut B,
        before_render_pass: F,
    ) -> Result<FrameContext, E>
    where
        B: FrameBackend,
        F: FnMut(usize, vk::CommandBuffer) -> Result<(), E>,
        E: From<VulkanError>,
    {
        assert_eq!(self.state, FrameState::Idle, "prepare_frame called inside a frame");

        if self.commands.is_dirty() {
            self.state = FrameState::Recording;
            let rebuilt = self
                .commands
                .rebuild_primary(backend, &self.targets, before_render_pass);
            if let Err(e) = rebuilt {
                self.state = FrameState::Idle;
                return Err(e);
            }
        }

        self.state = FrameState::Acquiring;
        match backend.acquire_next_image(self.acquire_complete) {
            Ok(image_index) => Ok(FrameContext { image_index }),
            Err(e) => {
                self.state = FrameState::Idle;
                Err(e.into())
            }
        }
    }

    /// Submit the acquired image's primary command buffer
    ///
    /// `wait_override` replaces the acquire semaphore as the colour-output
    /// wait, for callers chaining their own submissions in front.
    ///
    /// # Panics
    ///
    /// Panics when called out of order or when no primary command buffer
    /// exists for the image.
    pub fn draw_current<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        frame: FrameContext,
        wait_override: Option<vk::Semaphore>,
    ) -> VulkanResult<()> {
        assert_eq!(self.state, FrameState::Acquiring, "draw_current called before prepare_frame");
        let image_index = frame.image_index as usize;
        let primary = self
            .commands
            .primary(image_index)
            .unwrap_or_else(|| panic!("no primary command buffer for image {}", image_index));
        self.state = FrameState::Submitting;

        let fence = self.submit_fences.acquire(backend, image_index)?;
        self.recycler
            .discard(CleanupAction::ClearSubmitFence { image_index, fence });

        let mut submission = Submission::default();
        submission.wait_on(
            wait_override.unwrap_or(self.acquire_complete),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        );
        if let Some(transfer_complete) = self.transfer_complete.take() {
            submission.wait_on(transfer_complete, vk::PipelineStageFlags::TRANSFER);
            self.recycler
                .discard(CleanupAction::DestroySemaphore(transfer_complete));
        }
        self.recycler.empty_dumpster(fence);

        submission.command_buffers.push(primary);
        submission.signal_semaphores.push(self.render_complete);

        let transfer_pending = if self.transfers.is_empty() {
            None
        } else {
            let semaphore = backend.create_semaphore()?;
            submission.signal_semaphores.push(semaphore);
            Some(semaphore)
        };

        backend.submit(&submission, fence)?;

        if let Some(transfer_pending) = transfer_pending {
            self.execute_pending_transfers(backend, transfer_pending)?;
        }

        self.recycler.recycle(backend, &mut self.submit_fences)?;
        Ok(())
    }

    /// Submit queued buffer updates after the draw that signals `transfer_pending`
    fn execute_pending_transfers<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        transfer_pending: vk::Semaphore,
    ) -> VulkanResult<()> {
        let fence = backend.create_fence()?;
        let transfer_complete = backend.create_semaphore()?;
        let buffer = backend
            .allocate_command_buffers(vk::CommandBufferLevel::PRIMARY, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "transfer command buffer allocation returned nothing".to_string(),
            })?;

        backend.begin_primary(buffer, true)?;
        for transfer in self.transfers.iter() {
            backend.update_buffer(buffer, transfer);
        }
        backend.end_command_buffer(buffer)?;

        let mut submission = Submission::default();
        submission.wait_on(transfer_pending, vk::PipelineStageFlags::ALL_COMMANDS);
        submission.command_buffers.push(buffer);
        submission.signal_semaphores.push(transfer_complete);
        backend.submit(&submission, fence)?;

        log::trace!("Submitted {} pending transfers", self.transfers.len());
        self.recycler.push_batch(
            fence,
            vec![
                CleanupAction::DestroySemaphore(transfer_pending),
                CleanupAction::FreeCommandBuffers(vec![buffer]),
            ],
        );
        self.transfer_complete = Some(transfer_complete);
        self.transfers.clear();
        Ok(())
    }

    /// Present the frame once rendering completes
    pub fn submit_frame<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        frame: FrameContext,
    ) -> VulkanResult<()> {
        assert_eq!(self.state, FrameState::Submitting, "submit_frame called before draw_current");
        self.state = FrameState::Presenting;
        let presented = backend.present(frame.image_index, self.render_complete);
        self.state = FrameState::Idle;
        presented
    }

    /// Switch to rebuilt render targets after a swapchain rebuild
    ///
    /// All command buffer collections are dropped; the caller rebuilds the
    /// secondaries before the next frame.
    pub fn resize<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        targets: RenderTargets,
    ) -> VulkanResult<()> {
        assert_eq!(self.state, FrameState::Idle, "resize inside a frame");
        backend.device_wait_idle()?;
        self.recycler.flush(backend, &mut self.submit_fences);
        self.commands.invalidate(backend);
        self.submit_fences.reset(targets.image_count());
        log::info!(
            "Frame targets resized to {}x{} with {} images",
            targets.extent.width,
            targets.extent.height,
            targets.image_count()
        );
        self.targets = targets;
        Ok(())
    }

    /// Release everything the loop owns
    pub fn destroy<B: FrameBackend>(&mut self, backend: &mut B) -> VulkanResult<()> {
        backend.queue_wait_idle()?;
        backend.device_wait_idle()?;
        self.recycler.flush(backend, &mut self.submit_fences);
        self.commands.invalidate(backend);
        if let Some(transfer_complete) = self.transfer_complete.take() {
            backend.destroy_semaphore(transfer_complete);
        }
        backend.destroy_semaphore(self.acquire_complete);
        backend.destroy_semaphore(self.render_complete);
        self.acquire_complete = vk::Semaphore::null();
        self.render_complete = vk::Semaphore::null();
        self.transfers.clear();
        self.state = FrameState::Idle;
        Ok(())
    }

    /// Current frame state
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Whether the primaries will be re-recorded on the next `prepare_frame`
    pub fn is_dirty(&self) -> bool {
        self.commands.is_dirty()
    }

    /// Buffer updates for the next draw
    pub fn transfers_mut(&mut self) -> &mut TransferQueue {
        &mut self.transfers
    }

    /// Command buffer collections
    pub fn commands(&self) -> &CommandBufferManager {
        &self.commands
    }

    /// Mutable command buffer collections, for overlay visibility
    pub fn commands_mut(&mut self) -> &mut CommandBufferManager {
        &mut self.commands
    }

    /// Render targets command buffers are recorded against
    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    /// Deferred destruction queue
    pub fn recycler_mut(&mut self) -> &mut Recycler {
        &mut self.recycler
    }

    /// Semaphore the next draw waits on for transfer completion, if any
    pub fn transfer_complete(&self) -> Option<vk::Semaphore> {
        self.transfer_complete
    }

    /// Semaphore signalled when an image has been acquired
    pub fn acquire_semaphore(&self) -> vk::Semaphore {
        self.acquire_complete
    }

    /// Semaphore signalled when the draw finishes
    pub fn render_semaphore(&self) -> vk::Semaphore {
        self.render_complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frame::mock::{targets, MockBackend};
    use ash::vk::Handle;

    fn no_hook(_: usize, _: vk::CommandBuffer) -> VulkanResult<()> {
        Ok(())
    }

    fn setup(image_count: u32) -> (MockBackend, FrameLoop) {
        let mut backend = MockBackend::new(image_count);
        let mut frames = FrameLoop::new(&mut backend, targets(u64::from(image_count)), false).unwrap();
        frames
            .rebuild_secondary(&mut backend, SecondaryKind::Draw, no_hook)
            .unwrap();
        (backend, frames)
    }

    fn run_frame(backend: &mut MockBackend, frames: &mut FrameLoop) -> FrameContext {
        let frame = frames.prepare_frame(backend, no_hook).unwrap();
        frames.draw_current(backend, frame, None).unwrap();
        frames.submit_frame(backend, frame).unwrap();
        frame
    }

    /// Draw submissions only: the ones executing a primary built by the loop
    fn draw_submissions(backend: &MockBackend, frames: &FrameLoop) -> Vec<Submission> {
        let primaries: Vec<_> = (0..frames.commands().primary_len())
            .filter_map(|i| frames.commands().primary(i))
            .collect();
        backend
            .submissions
            .iter()
            .filter(|(s, _)| s.command_buffers.iter().any(|c| primaries.contains(c)))
            .map(|(s, _)| s.clone())
            .collect()
    }

    #[test]
    fn test_primaries_allocated_once_across_frames() {
        let (mut backend, mut frames) = setup(3);
        for _ in 0..12 {
            run_frame(&mut backend, &mut frames);
        }
        assert_eq!(backend.allocations(vk::CommandBufferLevel::PRIMARY), vec![3]);
        assert_eq!(backend.presented.len(), 12);
        assert_eq!(frames.state(), FrameState::Idle);
    }

    #[test]
    fn test_dirty_flag_follows_rebuilds() {
        let (mut backend, mut frames) = setup(2);
        assert!(frames.is_dirty());

        let frame = frames.prepare_frame(&mut backend, no_hook).unwrap();
        assert!(!frames.is_dirty());
        frames.draw_current(&mut backend, frame, None).unwrap();
        frames.submit_frame(&mut backend, frame).unwrap();

        frames
            .rebuild_secondary(&mut backend, SecondaryKind::Draw, no_hook)
            .unwrap();
        assert!(frames.is_dirty());
    }

    #[test]
    fn test_draw_waits_on_acquire_and_signals_render() {
        let (mut backend, mut frames) = setup(2);
        run_frame(&mut backend, &mut frames);

        let (submission, _) = &backend.submissions[0];
        assert_eq!(
            submission.wait_stage_for(frames.acquire_semaphore()),
            Some(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        );
        assert_eq!(submission.signal_semaphores, vec![frames.render_semaphore()]);
        assert_eq!(backend.presented[0].1, frames.render_semaphore());
    }

    #[test]
    fn test_wait_override_replaces_acquire_semaphore() {
        let (mut backend, mut frames) = setup(2);
        let external = vk::Semaphore::from_raw(0xE000);
        let frame = frames.prepare_frame(&mut backend, no_hook).unwrap();
        frames.draw_current(&mut backend, frame, Some(external)).unwrap();

        let (submission, _) = &backend.submissions[0];
        assert!(submission.waits_on(external));
        assert!(!submission.waits_on(frames.acquire_semaphore()));
    }

    #[test]
    fn test_transfers_visible_from_next_frame() {
        let (mut backend, mut frames) = setup(2);
        let buffer = vk::Buffer::from_raw(0xC000);

        // Frame F: queue an update before its draw
        let frame = frames.prepare_frame(&mut backend, no_hook).unwrap();
        frames.transfers_mut().queue_value(buffer, 0, &42u32).unwrap();
        frames.draw_current(&mut backend, frame, None).unwrap();
        frames.submit_frame(&mut backend, frame).unwrap();

        let transfer_complete = frames.transfer_complete().expect("transfer semaphore");
        assert!(frames.transfers_mut().is_empty());
        assert_eq!(backend.updates().len(), 1);

        // Submission order: draw F, then the transfer gated on draw F
        assert_eq!(backend.submissions.len(), 2);
        let draw_f = backend.submissions[0].0.clone();
        let transfer = backend.submissions[1].0.clone();
        let transfer_pending = draw_f.signal_semaphores[1];
        assert_eq!(
            transfer.wait_stage_for(transfer_pending),
            Some(vk::PipelineStageFlags::ALL_COMMANDS)
        );
        assert_eq!(transfer.signal_semaphores, vec![transfer_complete]);
        assert!(!draw_f.waits_on(transfer_complete));

        // Frame F+1 waits on the transfer at the transfer stage
        run_frame(&mut backend, &mut frames);
        let draws = draw_submissions(&backend, &frames);
        assert_eq!(draws.len(), 2);
        assert_eq!(
            draws[1].wait_stage_for(transfer_complete),
            Some(vk::PipelineStageFlags::TRANSFER)
        );
        assert!(frames.transfer_complete().is_none());

        // Frame F+2 has nothing to wait on
        run_frame(&mut backend, &mut frames);
        let draws = draw_submissions(&backend, &frames);
        assert_eq!(draws[2].wait_semaphores.len(), 1);
    }

    #[test]
    fn test_trashed_buffers_freed_only_after_fence() {
        let (mut backend, mut frames) = setup(2);
        run_frame(&mut backend, &mut frames);

        frames
            .rebuild_secondary(&mut backend, SecondaryKind::Draw, no_hook)
            .unwrap();
        let frame = frames.prepare_frame(&mut backend, no_hook).unwrap();
        backend.freed_command_buffers.clear();
        frames.draw_current(&mut backend, frame, None).unwrap();

        // The old draw buffers went out with this frame's fence, which is pending
        let fence = backend.submissions.last().map(|(_, f)| *f).unwrap();
        assert!(backend.freed_command_buffers.is_empty());

        backend.signal_fence(fence);
        frames.submit_frame(&mut backend, frame).unwrap();
        run_frame(&mut backend, &mut frames);
        assert_eq!(backend.freed_command_buffers.len(), 2);
        assert!(backend.destroyed_fences.contains(&fence));
    }

    #[test]
    fn test_submit_fence_reused_image_waits() {
        let (mut backend, mut frames) = setup(2);
        run_frame(&mut backend, &mut frames);
        run_frame(&mut backend, &mut frames);
        let first_fence = backend.submissions[0].1;
        assert!(backend.waited_fences.is_empty());

        // Image 0 again: its previous submission must be waited on
        let frame = run_frame(&mut backend, &mut frames);
        assert_eq!(frame.image_index, 0);
        assert_eq!(backend.waited_fences, vec![first_fence]);
    }

    #[test]
    fn test_resize_reallocates_at_new_count() {
        let (mut backend, mut frames) = setup(3);
        run_frame(&mut backend, &mut frames);

        frames.resize(&mut backend, targets(2)).unwrap();
        backend.set_image_count(2);
        assert!(frames.is_dirty());
        assert_eq!(frames.commands().primary_len(), 0);
        assert_eq!(frames.commands().secondary_len(SecondaryKind::Draw), 0);

        frames
            .rebuild_secondary(&mut backend, SecondaryKind::Draw, no_hook)
            .unwrap();
        assert_eq!(frames.commands().secondary_len(SecondaryKind::Draw), 2);
        let frame = frames.prepare_frame(&mut backend, no_hook).unwrap();
        assert_eq!(frames.commands().primary_len(), 2);
        frames.draw_current(&mut backend, frame, None).unwrap();
        frames.submit_frame(&mut backend, frame).unwrap();
        assert_eq!(backend.allocations(vk::CommandBufferLevel::PRIMARY), vec![3, 2]);
    }

    #[test]
    fn test_resize_reallocates_overlay_at_new_count() {
        let mut backend = MockBackend::new(3);
        let mut frames = FrameLoop::new(&mut backend, targets(3), true).unwrap();
        for kind in [SecondaryKind::Draw, SecondaryKind::Overlay] {
            frames.rebuild_secondary(&mut backend, kind, no_hook).unwrap();
        }
        run_frame(&mut backend, &mut frames);

        frames.resize(&mut backend, targets(2)).unwrap();
        backend.set_image_count(2);
        assert_eq!(frames.commands().secondary_len(SecondaryKind::Draw), 0);
        assert_eq!(frames.commands().secondary_len(SecondaryKind::Overlay), 0);

        for kind in [SecondaryKind::Draw, SecondaryKind::Overlay] {
            frames.rebuild_secondary(&mut backend, kind, no_hook).unwrap();
        }
        assert_eq!(frames.commands().secondary_len(SecondaryKind::Draw), 2);
        assert_eq!(frames.commands().secondary_len(SecondaryKind::Overlay), 2);

        backend.recorded.clear();
        run_frame(&mut backend, &mut frames);
        // Both primaries execute the draw and overlay secondaries
        assert_eq!(backend.executed_secondaries().len(), 4);
        assert_eq!(backend.allocations(vk::CommandBufferLevel::SECONDARY), vec![3, 3, 2, 2]);
    }

    #[test]
    #[should_panic(expected = "draw command buffers must be built")]
    fn test_prepare_without_draw_buffers_panics() {
        let mut backend = MockBackend::new(2);
        let mut frames = FrameLoop::new(&mut backend, targets(2), false).unwrap();
        frames.commands_mut().mark_dirty();
        let _ = frames.prepare_frame(&mut backend, no_hook);
    }

    #[test]
    #[should_panic(expected = "draw_current called before prepare_frame")]
    fn test_draw_out_of_order_panics() {
        let (mut backend, mut frames) = setup(2);
        let _ = frames.draw_current(&mut backend, FrameContext { image_index: 0 }, None);
    }

    #[test]
    fn test_destroy_releases_semaphores() {
        let (mut backend, mut frames) = setup(2);
        let acquire = frames.acquire_semaphore();
        let render = frames.render_semaphore();
        run_frame(&mut backend, &mut frames);
        frames.destroy(&mut backend).unwrap();

        assert!(backend.destroyed_semaphores.contains(&acquire));
        assert!(backend.destroyed_semaphores.contains(&render));
        assert_eq!(frames.recycler_mut().pending_batches(), 0);
    }
}
