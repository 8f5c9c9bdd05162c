//! Instanced mesh rendering
//!
//! One rock mesh drawn 8192 times in a single indexed draw. Per-instance
//! position, rotation, scale and texture layer come from a second vertex
//! buffer bound at binding 1 with instance rate. The uniform block's `time`
//! drives a wobble in the vertex shader and is rewritten every frame through
//! the frame loop's pending transfers.

mod common;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use common::UniformWrite;
use demo_engine::prelude::*;
use demo_engine::render::vulkan::descriptor::{layout_binding, pool_sizes};
use demo_engine::render::vulkan::vertex_layout::{attribute_descriptions, binding_description};
use nalgebra::{Matrix4, Vector3};
use rand::Rng;
use std::f32::consts::PI;

const TITLE: &str = "Vulkan Example - Instanced mesh rendering";
const INSTANCE_COUNT: u32 = 8192;
const INSTANCE_BINDING: u32 = 1;
const ROCK_MESH: &str = "models/rock01.obj";
const ROCK_SCALE: f32 = 0.1;
const ROCK_TEXTURES: &str = "textures/texturearray_rocks.png";
const ROCK_TEXTURE_LAYERS: u32 = 5;
/// Radius of the sphere instances are scattered over
const FIELD_RADIUS: f32 = 7.5;

/// Per-instance attributes at locations 4-7
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct InstanceData {
    position: [f32; 3],
    rotation: [f32; 3],
    scale: f32,
    texture_index: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct InstancingUniforms {
    projection: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    time: f32,
    _padding: [f32; 3],
}

impl InstancingUniforms {
    fn new(projection: Matrix4<f32>, view: Matrix4<f32>, time: f32) -> Self {
        Self {
            projection: projection.into(),
            view: view.into(),
            time,
            _padding: [0.0; 3],
        }
    }
}

/// Scatter `count` instances over a thin band of a sphere
fn generate_instances(rng: &mut impl Rng, count: u32, texture_layers: u32) -> Vec<InstanceData> {
    (0..count)
        .map(|_| {
            let rotation = [PI * rng.gen::<f32>(), PI * rng.gen::<f32>(), PI * rng.gen::<f32>()];
            let theta = 2.0 * PI * rng.gen::<f32>();
            let phi = (1.0 - 2.0 * rng.gen::<f32>()).acos();
            let position = Vector3::new(
                phi.sin() * theta.cos(),
                theta.sin() * rng.gen::<f32>() / 1500.0,
                phi.cos(),
            ) * FIELD_RADIUS;
            let scale = 1.0 + rng.gen::<f32>() * 2.0;
            let texture_index = ((rng.gen::<f32>() * texture_layers as f32) as u32).min(texture_layers - 1);
            InstanceData {
                position: position.into(),
                rotation,
                scale,
                texture_index,
            }
        })
        .collect()
}

/// Wobble phase fed to the vertex shader
fn wobble(elapsed: f32) -> f32 {
    0.5 * (elapsed * 3.0).sin()
}

fn instance_attributes() -> [vk::VertexInputAttributeDescription; 4] {
    let attribute = |location, format, offset| vk::VertexInputAttributeDescription {
        location,
        binding: INSTANCE_BINDING,
        format,
        offset,
    };
    [
        attribute(4, vk::Format::R32G32B32_SFLOAT, 0),
        attribute(5, vk::Format::R32G32B32_SFLOAT, 12),
        attribute(6, vk::Format::R32_SFLOAT, 24),
        attribute(7, vk::Format::R32_SINT, 28),
    ]
}

fn rock_layout() -> VertexLayout {
    VertexLayout::new([
        VertexComponent::Position,
        VertexComponent::Normal,
        VertexComponent::Uv,
        VertexComponent::Color,
    ])
}

struct InstancingResources {
    rock: MeshBuffer,
    instances: Buffer,
    pipeline: GraphicsPipeline,
    pipeline_layout: PipelineLayout,
    descriptor_set: vk::DescriptorSet,
    _descriptor_pool: DescriptorPool,
    _set_layout: DescriptorSetLayout,
    uniforms: UniformBuffer<InstancingUniforms>,
    _rock_textures: Texture,
}

struct InstancingDemo {
    resources: Option<InstancingResources>,
    uniforms_written: bool,
}

impl InstancingDemo {
    fn new() -> Self {
        Self {
            resources: None,
            uniforms_written: false,
        }
    }

    fn resources(&self) -> Result<&InstancingResources, AppError> {
        self.resources
            .as_ref()
            .ok_or_else(|| AppError::Custom("instancing resources not loaded".to_string()))
    }
}

impl Demo for InstancingDemo {
    fn title(&self) -> &str {
        TITLE
    }

    fn initial_camera(&self, aspect: f32) -> Camera {
        let mut camera = Camera::new(aspect);
        camera.set_translation(Vector3::new(0.0, -12.0, 0.0));
        camera
    }

    fn load_assets(&mut self, gpu: &GpuContext<'_>, paths: &AssetPaths) -> Result<(), AppError> {
        let layout = rock_layout();
        let rock_data = MeshLoader::load(paths.asset(ROCK_MESH), &layout, ROCK_SCALE)?;
        let rock = MeshBuffer::upload(gpu.context, gpu.command_pool, &rock_data)?;
        let rock_textures = Texture::from_file(
            gpu.context,
            gpu.command_pool,
            paths.asset(ROCK_TEXTURES),
            TextureKind::Array {
                layers: ROCK_TEXTURE_LAYERS,
            },
        )?;

        let instance_data = generate_instances(&mut rand::thread_rng(), INSTANCE_COUNT, ROCK_TEXTURE_LAYERS);
        let instances = Buffer::device_local_with_data(
            gpu.context,
            gpu.command_pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&instance_data),
        )?;
        let uniforms = UniformBuffer::new(gpu.context, &InstancingUniforms::zeroed())?;

        let device = gpu.context.raw_device();
        let bindings = [
            layout_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
            layout_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
        ];
        let set_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;
        let descriptor_pool = DescriptorPool::new(device.clone(), &pool_sizes(&bindings, 1), 1)?;
        let descriptor_set = descriptor_pool.allocate(&set_layout)?;
        DescriptorWriter::new()
            .uniform_buffer(0, uniforms.descriptor())
            .combined_image_sampler(1, rock_textures.descriptor())
            .write(&device, descriptor_set);

        let pipeline_layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?;
        let (vertex, fragment) = common::load_shader_pair(gpu, paths, "instancing/instancing")?;
        let pipeline = PipelineBuilder::new()
            .vertex_input(binding_description(&layout, 0), attribute_descriptions(&layout, 0, 0))
            .vertex_input(
                vk::VertexInputBindingDescription {
                    binding: INSTANCE_BINDING,
                    stride: std::mem::size_of::<InstanceData>() as u32,
                    input_rate: vk::VertexInputRate::INSTANCE,
                },
                instance_attributes(),
            )
            .build(device, gpu.render_pass, pipeline_layout.handle(), &vertex, &fragment)?;

        log::info!("Prepared {} rock instances", instance_data.len());
        self.resources = Some(InstancingResources {
            rock,
            instances,
            pipeline,
            pipeline_layout,
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            uniforms,
            _rock_textures: rock_textures,
        });
        Ok(())
    }

    fn build_draw_commands(&self, recorder: &mut DrawRecorder, _image_index: usize) -> Result<(), AppError> {
        let resources = self.resources()?;
        recorder.set_full_viewport();
        recorder.bind_descriptor_sets(resources.pipeline_layout.handle(), &[resources.descriptor_set]);
        recorder.bind_pipeline(resources.pipeline.handle());
        recorder.bind_vertex_buffers(0, &[resources.rock.vertices.handle()], &[0]);
        recorder.bind_vertex_buffers(INSTANCE_BINDING, &[resources.instances.handle()], &[0]);
        recorder.bind_index_buffer(resources.rock.indices.handle());
        recorder.draw_indexed(resources.rock.index_count, INSTANCE_COUNT, 0, 0);
        Ok(())
    }

    fn update_frame_state(
        &mut self,
        frame: &FrameInfo<'_>,
        transfers: &mut TransferQueue,
    ) -> Result<SceneChange, AppError> {
        let (projection, view) = frame.camera_matrices();
        let uniforms = InstancingUniforms::new(projection, view, wobble(frame.elapsed));
        let resources = self.resources()?;
        // Time changes every frame, so there is never anything to skip
        if UniformWrite::for_frame(self.uniforms_written, true) == UniformWrite::Queued {
            transfers.queue_value(resources.uniforms.handle(), 0, &uniforms)?;
        } else {
            resources.uniforms.update(&uniforms)?;
            self.uniforms_written = true;
        }
        Ok(SceneChange::NONE)
    }

    fn describe_overlay(&self, text: &mut OverlayText) {
        text.add_text(format!("{} instances", INSTANCE_COUNT), 5.0, 85.0, TextAlign::Left);
    }

    fn cleanup(&mut self) {
        self.resources = None;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::run("instancing", InstancingDemo::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_instance_layout_matches_attributes() {
        assert_eq!(std::mem::size_of::<InstanceData>(), 32);
        let attributes = instance_attributes();
        assert_eq!(attributes.map(|a| a.location), [4, 5, 6, 7]);
        assert_eq!(attributes[3].format, vk::Format::R32_SINT);
        assert!(attributes.iter().all(|a| a.binding == INSTANCE_BINDING));
    }

    #[test]
    fn test_instances_stay_on_sphere_band() {
        let mut rng = StdRng::seed_from_u64(7);
        let instances = generate_instances(&mut rng, 512, ROCK_TEXTURE_LAYERS);
        assert_eq!(instances.len(), 512);
        for instance in &instances {
            let position = Vector3::from(instance.position);
            assert!(position.norm() <= FIELD_RADIUS + 1e-3);
            assert!(position.y.abs() <= FIELD_RADIUS / 1500.0 + 1e-6);
            assert!((1.0..=3.0).contains(&instance.scale));
            assert!(instance.texture_index < ROCK_TEXTURE_LAYERS);
            assert!(instance.rotation.iter().all(|r| (0.0..=PI).contains(r)));
        }
    }

    #[test]
    fn test_uniform_block_is_std140_sized() {
        assert_eq!(std::mem::size_of::<InstancingUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<InstancingUniforms>(), 144);
    }

    #[test]
    fn test_wobble_range() {
        assert_relative_eq!(wobble(0.0), 0.0);
        assert_relative_eq!(wobble(PI / 6.0), 0.5, epsilon = 1e-6);
        assert!((0..1000).all(|i| wobble(i as f32 * 0.01).abs() <= 0.5));
    }
}
