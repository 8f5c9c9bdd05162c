//! Vulkan backend
//!
//! RAII wrappers over `ash` objects plus [`VulkanBackend`], the implementation
//! of the frame core's backend trait against a real device.

pub mod backend;
pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor;
pub mod framebuffer;
pub mod overlay;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod texture;
pub mod vertex_layout;
pub mod window;

pub use backend::VulkanBackend;
pub use buffer::{Buffer, MeshBuffer, UniformBuffer};
pub use commands::{CommandPool, DrawRecorder};
pub use context::{find_memory_type, PhysicalDeviceInfo, QueueFamilies, VulkanContext, VulkanError, VulkanResult};
pub use descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter, PipelineLayout};
pub use framebuffer::FramebufferSet;
pub use overlay::TextOverlay;
pub use pipeline::{GraphicsPipeline, PipelineBuilder};
pub use render_pass::RenderPass;
pub use shader::ShaderModule;
pub use swapchain::Swapchain;
pub use texture::{Texture, TextureData, TextureKind};
pub use window::{Window, WindowError, WindowResult};
