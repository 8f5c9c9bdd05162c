//! Rendering
//!
//! [`frame`] holds the backend-independent frame orchestration, [`vulkan`] the
//! device-facing wrappers, and [`Renderer`] ties the two to a window.

pub mod camera;
pub mod frame;
pub mod renderer;
pub mod text;
pub mod vulkan;

pub use camera::Camera;
pub use renderer::{GpuContext, Renderer};
pub use text::{OverlayText, TextAlign};
