//! # Application Configuration
//!
//! Everything a demo can tune without recompiling: logging and pacing, the
//! window, renderer switches and where assets and compiled shaders live.
//! Every section has defaults, so a config file only needs the fields it
//! changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use crate::config::{Config, ConfigError};

/// Process argument that forces validation layers on
pub const VALIDATION_ARG: &str = "--validation";

/// # Engine Configuration
///
/// Logging and frame pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log level; `RUST_LOG` overrides it
    pub log_level: String,
    /// Frame rate cap
    pub target_fps: u32,
}

impl EngineConfig {
    /// Info logging at 60 FPS
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            target_fps: 60,
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set target FPS
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Window Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Title shown before the first FPS update
    pub title: String,
    /// Initial width in pixels
    pub width: u32,
    /// Initial height in pixels
    pub height: u32,
    /// Wait for vertical blank when presenting
    pub vsync: bool,
    /// Allow the user to resize the window
    pub resizable: bool,
}

impl WindowConfig {
    /// Resizable 1280x720 window with vsync
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            width: 1280,
            height: 720,
            vsync: true,
            resizable: true,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new("Vulkan Demo")
    }
}

/// # Renderer Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Enable Vulkan validation layers
    pub validation: bool,
    /// Build the text overlay at startup
    pub text_overlay: bool,
    /// Colour attachment clear value
    pub clear_color: [f32; 4],
    /// Overlay font, relative to the asset directory
    pub font: String,
    /// Overlay font size in pixels
    pub font_size: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: false,
            text_overlay: true,
            clear_color: [0.1, 0.1, 0.1, 1.0],
            font: "fonts/overlay.ttf".to_string(),
            font_size: 16.0,
        }
    }
}

/// # Asset Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Base directory for models, textures and fonts
    pub assets_dir: PathBuf,
    /// Directory holding compiled SPIR-V
    pub shader_dir: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("resources"),
            shader_dir: PathBuf::from("target/shaders"),
        }
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration each demo binary loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Window configuration
    pub window: WindowConfig,
    /// Rendering configuration
    pub renderer: RendererConfig,
    /// Asset locations
    pub assets: AssetConfig,
}

impl ApplicationConfig {
    /// Defaults with the given window title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            window: WindowConfig::new(title),
            ..Self::default()
        }
    }

    /// Set the initial window size
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window.width = width;
        self.window.height = height;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.renderer.validation = enabled;
        self
    }

    /// Enable or disable the text overlay
    pub fn with_text_overlay(mut self, enabled: bool) -> Self {
        self.renderer.text_overlay = enabled;
        self
    }

    /// Apply command-line switches; `--validation` turns validation on
    pub fn apply_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if args.into_iter().any(|arg| arg.as_ref() == VALIDATION_ARG) {
            self.renderer.validation = true;
        }
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.title.is_empty() {
            return Err(ConfigError::Invalid("window title cannot be empty".to_string()));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.engine.target_fps == 0 {
            return Err(ConfigError::Invalid("target FPS must be positive".to_string()));
        }
        if self.renderer.font_size <= 0.0 {
            return Err(ConfigError::Invalid("font size must be positive".to_string()));
        }
        Ok(())
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ApplicationConfig::new("Scene");
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.target_fps, 60);
        assert_eq!(config.renderer.clear_color, [0.1, 0.1, 0.1, 1.0]);
        assert_eq!(config.window.title, "Scene");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ApplicationConfig::new("").validate().is_err());
        assert!(ApplicationConfig::new("x").with_window_size(0, 720).validate().is_err());

        let mut config = ApplicationConfig::new("x");
        config.engine.target_fps = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validation_argument() {
        let config = ApplicationConfig::new("x").apply_args(["demo", "--validation"]);
        assert!(config.renderer.validation);
        let config = ApplicationConfig::new("x").apply_args(["demo"]);
        assert!(!config.renderer.validation);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ApplicationConfig = toml::from_str(
            r#"
            [window]
            width = 800

            [engine]
            target_fps = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.engine.target_fps, 30);
        assert!(config.renderer.text_overlay);
    }

    #[test]
    fn test_ron_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!("demo_engine_config_{}.ron", std::process::id()));
        let config = ApplicationConfig::new("Indirect").with_text_overlay(false);
        config.save_to_file(&path).unwrap();
        let loaded = ApplicationConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.window.title, "Indirect");
        assert!(!loaded.renderer.text_overlay);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let loaded = ApplicationConfig::load_or_default("does/not/exist.toml").unwrap();
        assert_eq!(loaded.window.width, 1280);
    }
}
