//! Core configuration types shared by the engine and the demos

pub mod config;

pub use config::{ApplicationConfig, AssetConfig, EngineConfig, RendererConfig, WindowConfig};
