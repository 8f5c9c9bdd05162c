//! Startup shared by the demo binaries

use std::path::Path;
use ash::vk;
use demo_engine::prelude::*;

/// Load `config/<name>.toml` if present, apply command-line switches, start
/// logging and run `demo` until its window closes
pub fn run<D: Demo>(name: &str, demo: D) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = Path::new("config").join(format!("{}.toml", name));
    let loaded = if config_path.exists() {
        ApplicationConfig::load_from_file(&config_path)
    } else {
        Ok(ApplicationConfig::new(demo.title()))
    };

    let config = match loaded {
        Ok(config) => config.apply_args(std::env::args()),
        Err(e) => {
            logging::init(log::LevelFilter::Info);
            log::error!("Failed to read {}: {}", config_path.display(), e);
            return Err(e.into());
        }
    };
    logging::init(logging::parse_level(&config.engine.log_level));

    log::info!("Starting {} (validation {})", demo.title(), config.renderer.validation);
    let result = Engine::new(config).and_then(|engine| engine.run(demo));
    match result {
        Ok(()) => {
            log::info!("{} finished", name);
            Ok(())
        }
        Err(e) => {
            log::error!("{} failed: {}", name, e);
            Err(e.into())
        }
    }
}

/// How a demo's uniform block reaches the GPU this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformWrite {
    /// Unchanged since the last upload
    Skip,
    /// Nothing has been submitted yet, so the mapping is written directly
    Direct,
    /// Copied by the next frame's transfer pass
    Queued,
}

impl UniformWrite {
    /// `written` is whether the first upload happened, `changed` whether the
    /// contents differ from it
    pub fn for_frame(written: bool, changed: bool) -> Self {
        match (written, changed) {
            (false, _) => Self::Direct,
            (true, true) => Self::Queued,
            (true, false) => Self::Skip,
        }
    }
}

/// Vertex and fragment shaders compiled from `<stem>.vert` and `<stem>.frag`
pub fn load_shader_pair(
    gpu: &GpuContext<'_>,
    paths: &AssetPaths,
    stem: &str,
) -> Result<(ShaderModule, ShaderModule), AppError> {
    let device = gpu.context.raw_device();
    let vertex = ShaderModule::from_file(
        device.clone(),
        paths.shader(format!("{}.vert.spv", stem)),
        vk::ShaderStageFlags::VERTEX,
    )?;
    let fragment = ShaderModule::from_file(
        device,
        paths.shader(format!("{}.frag.spv", stem)),
        vk::ShaderStageFlags::FRAGMENT,
    )?;
    Ok((vertex, fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use demo_engine::input::{CameraController, InputState};

    #[test]
    fn test_first_upload_is_direct() {
        assert_eq!(UniformWrite::for_frame(false, false), UniformWrite::Direct);
        assert_eq!(UniformWrite::for_frame(false, true), UniformWrite::Direct);
        assert_eq!(UniformWrite::for_frame(true, false), UniformWrite::Skip);
    }

    #[test]
    fn test_resize_queues_projection_upload() {
        let controller = CameraController::new();
        let mut camera = Camera::new(16.0 / 9.0);
        let input = InputState::new();
        assert!(!controller.update(&mut camera, &input));

        camera.set_aspect_ratio(4.0 / 3.0);
        let changed = controller.update(&mut camera, &input);
        let write = UniformWrite::for_frame(true, changed);
        assert_eq!(write, UniformWrite::Queued);

        let mut transfers = TransferQueue::new();
        let projection: [f32; 16] = camera.projection_matrix().as_slice().try_into().unwrap();
        transfers.queue_value(vk::Buffer::null(), 0, &projection).unwrap();
        assert_eq!(transfers.len(), 1);
    }
}
