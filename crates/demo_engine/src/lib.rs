//! # Demo Engine
//!
//! A thin Vulkan framework for small rendering demos.
//!
//! ## Features
//!
//! - **Frame orchestration**: command buffer collections, deferred destruction,
//!   per-image submit fences and queued buffer transfers, independent of Vulkan
//! - **Swapchain handling**: resize and out-of-date recovery
//! - **Assets**: Wavefront OBJ meshes, PNG textures, cubemaps and arrays
//! - **Text overlay**: frame statistics and demo lines, toggled with F1
//! - **Free camera**: z-up keyboard and mouse controls
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use demo_engine::prelude::*;
//!
//! struct Empty;
//!
//! impl Demo for Empty {
//!     fn title(&self) -> &str {
//!         "Empty"
//!     }
//!
//!     fn load_assets(&mut self, _gpu: &GpuContext<'_>, _paths: &AssetPaths) -> Result<(), AppError> {
//!         Ok(())
//!     }
//!
//!     fn build_draw_commands(&self, recorder: &mut DrawRecorder, _image_index: usize) -> Result<(), AppError> {
//!         recorder.set_full_viewport();
//!         Ok(())
//!     }
//!
//!     fn update_frame_state(
//!         &mut self,
//!         _frame: &FrameInfo<'_>,
//!         _transfers: &mut TransferQueue,
//!     ) -> Result<SceneChange, AppError> {
//!         Ok(SceneChange::NONE)
//!     }
//!
//!     fn cleanup(&mut self) {}
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApplicationConfig::new("Empty");
//!     Engine::new(config)?.run(Empty)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod core;
pub mod foundation;
pub mod input;
pub mod render;

mod application;
mod engine;

pub use application::{describe_frame_stats, AppError, Demo, FrameInfo, SceneChange};
pub use engine::{Engine, EngineError};

/// Common imports for demos
pub mod prelude {
    pub use crate::{
        assets::{AssetError, AssetPaths, MeshData, MeshLoader, MeshPart, VertexComponent, VertexLayout},
        config::Config,
        core::ApplicationConfig,
        foundation::logging,
        render::{
            camera::Camera,
            frame::TransferQueue,
            text::{OverlayText, TextAlign},
            vulkan::{
                Buffer, DescriptorPool, DescriptorSetLayout, DescriptorWriter, DrawRecorder, GraphicsPipeline,
                MeshBuffer, PipelineBuilder, PipelineLayout, ShaderModule, Texture, TextureKind, UniformBuffer,
                VulkanError,
            },
            GpuContext,
        },
        AppError, Demo, Engine, EngineError, FrameInfo, SceneChange,
    };
}
