//! Backend-independent frame orchestration
//!
//! Command buffer collections, deferred destruction, per-image submit fences,
//! pending buffer transfers and the acquire/submit/present sequence. Nothing in
//! here calls Vulkan directly; see [`FrameBackend`].

pub mod command_buffers;
pub mod device;
pub mod frame_loop;
pub mod recycler;
pub mod submit_fences;
pub mod transfer;

#[cfg(test)]
pub(crate) mod mock;

pub use command_buffers::{CommandBufferManager, SecondaryKind};
pub use device::{FrameBackend, RenderTargets, SecondaryInheritance, Submission};
pub use frame_loop::{FrameContext, FrameLoop, FrameState};
pub use recycler::{CleanupAction, Recycler};
pub use submit_fences::SubmitFences;
pub use transfer::{PendingTransfer, TransferQueue, MAX_INLINE_UPDATE};
