//! Asset loading: meshes from OBJ files and the errors shared with texture loading

pub mod mesh_loader;

pub use mesh_loader::{MeshData, MeshDimensions, MeshLoader, MeshPart, VertexComponent, VertexLayout};

use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::render::vulkan::VulkanError;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Model file could not be parsed
    #[error("Failed to load model {path}: {reason}")]
    Model {
        /// File that failed
        path: String,
        /// Parser message
        reason: String,
    },

    /// Image file could not be decoded
    #[error("Failed to decode image {path}: {source}")]
    Image {
        /// File that failed
        path: String,
        /// Decoder error
        #[source]
        source: image::ImageError,
    },

    /// Image dimensions do not fit the requested texture kind
    #[error("Invalid texture layout: {0}")]
    Layout(String),

    /// Font data could not be parsed
    #[error("Failed to load font: {0}")]
    Font(String),

    /// GPU upload failed
    #[error("GPU upload failed: {0}")]
    Vulkan(#[from] VulkanError),
}

/// Resolves asset and shader paths against the configured directories
#[derive(Debug, Clone)]
pub struct AssetPaths {
    assets_dir: PathBuf,
    shader_dir: PathBuf,
}

impl AssetPaths {
    /// Create a resolver rooted at the two directories
    pub fn new(assets_dir: impl Into<PathBuf>, shader_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            shader_dir: shader_dir.into(),
        }
    }

    /// Path of an asset such as `models/rock.obj`
    pub fn asset(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.assets_dir.join(relative)
    }

    /// Path of a compiled shader such as `scene/mesh.vert.spv`
    pub fn shader(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.shader_dir.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_paths_join_directories() {
        let paths = AssetPaths::new("resources", "target/shaders");
        assert_eq!(paths.asset("models/rock.obj"), PathBuf::from("resources/models/rock.obj"));
        assert_eq!(
            paths.shader("scene/mesh.vert.spv"),
            PathBuf::from("target/shaders/scene/mesh.vert.spv")
        );
    }
}
