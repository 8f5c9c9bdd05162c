//! Indirect rendering
//!
//! Every part of the plants mesh gets one `VkDrawIndexedIndirectCommand`
//! drawing `OBJECT_INSTANCE_COUNT` instances, so a single multi-draw renders
//! the whole field. Devices without `multiDrawIndirect` fall back to one
//! indirect draw per command. Ground and sky sphere are plain indexed draws.

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

const TITLE: &str = "Vulkan Example - Indirect rendering";
const OBJECT_INSTANCE_COUNT: u32 = 512;
const PLANT_RADIUS: f32 = 25.0;
const INSTANCE_BINDING: u32 = 1;

const PLANTS_MESH: &str = "models/plants.obj";
const GROUND_MESH: &str = "models/plane_circle.obj";
const SKYSPHERE_MESH: &str = "models/skysphere.obj";
const PLANTS_SCALE: f32 = 0.0025;
const GROUND_SCALE: f32 = PLANT_RADIUS + 1.0;
const SKYSPHERE_SCALE: f32 = 512.0 / 10.0;

const PLANT_TEXTURES: &str = "textures/texturearray_plants.png";
const PLANT_TEXTURE_LAYERS: u32 = 8;
const GROUND_TEXTURE: &str = "textures/ground_dry.png";

/// Per-instance attributes at locations 4-7
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct InstanceData {
    position: [f32; 3],
    rotation: [f32; 3],
    scale: f32,
    texture_index: u32,
}

/// Same layout as `VkDrawIndexedIndirectCommand`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
struct IndirectCommand {
    index_count: u32,
    instance_count: u32,
    first_index: u32,
    vertex_offset: i32,
    first_instance: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct IndirectUniforms {
    projection: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
}

impl IndirectUniforms {
    fn new(projection: Matrix4<f32>, view: Matrix4<f32>) -> Self {
        Self {
            projection: projection.into(),
            view: view.into(),
        }
    }
}

/// One command per mesh part; part `m` owns instances `m * count .. (m + 1) * count`
fn indirect_commands(parts: &[MeshPart], instances_per_part: u32) -> Vec<IndirectCommand> {
    parts
        .iter()
        .zip(0u32..)
        .map(|(part, m)| IndirectCommand {
            index_count: part.index_count,
            instance_count: instances_per_part,
            first_index: part.index_base,
            vertex_offset: 0,
            first_instance: m * instances_per_part,
        })
        .collect()
}

fn object_count(commands: &[IndirectCommand]) -> u32 {
    commands.iter().map(|command| command.instance_count).sum()
}

/// Scatter plants over a disc on the ground plane; each block of
/// `instances_per_part` instances samples its own texture layer
fn generate_instances(rng: &mut impl Rng, object_count: u32, instances_per_part: u32) -> Vec<InstanceData> {
    (0..object_count)
        .map(|i| {
            let rotation = [0.0, 0.0, PI * rng.gen::<f32>()];
            let theta = 2.0 * PI * rng.gen::<f32>();
            let phi = (1.0 - 2.0 * rng.gen::<f32>()).acos();
            let position = Vector3::new(phi.sin() * theta.cos(), phi.cos(), 0.0) * PLANT_RADIUS;
            InstanceData {
                position: position.into(),
                rotation,
                scale: 1.0 + rng.gen::<f32>() * 2.0,
                texture_index: i / instances_per_part,
            }
        })
        .collect()
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

fn mesh_layout() -> VertexLayout {
    VertexLayout::new([
        VertexComponent::Position,
        VertexComponent::Normal,
        VertexComponent::Uv,
        VertexComponent::Color,
    ])
}

struct IndirectResources {
    plants: MeshBuffer,
    ground: MeshBuffer,
    skysphere: MeshBuffer,
    instances: Buffer,
    commands: Buffer,
    command_count: u32,
    plants_pipeline: GraphicsPipeline,
    ground_pipeline: GraphicsPipeline,
    skysphere_pipeline: GraphicsPipeline,
    pipeline_layout: PipelineLayout,
    descriptor_set: vk::DescriptorSet,
    _descriptor_pool: DescriptorPool,
    _set_layout: DescriptorSetLayout,
    uniforms: UniformBuffer<IndirectUniforms>,
    _plant_textures: Texture,
    _ground_texture: Texture,
}

struct IndirectDemo {
    resources: Option<IndirectResources>,
    object_count: u32,
    multi_draw_indirect: bool,
    uniforms_written: bool,
}

impl IndirectDemo {
    fn new() -> Self {
        Self {
            resources: None,
            object_count: 0,
            multi_draw_indirect: false,
            uniforms_written: false,
        }
    }

    fn resources(&self) -> Result<&IndirectResources, AppError> {
        self.resources
            .as_ref()
            .ok_or_else(|| AppError::Custom("indirect resources not loaded".to_string()))
    }
}

impl Demo for IndirectDemo {
    fn title(&self) -> &str {
        TITLE
    }

    fn initial_camera(&self, aspect: f32) -> Camera {
        let mut camera = Camera::new(aspect);
        camera.set_projection(60.0, aspect, 0.1, 512.0);
        camera.set_translation(Vector3::new(0.0, -(PLANT_RADIUS + 5.0), 4.0));
        camera.rotate_world_x(-0.2);
        camera.movement_speed = 0.25;
        camera
    }

    fn load_assets(&mut self, gpu: &GpuContext<'_>, paths: &AssetPaths) -> Result<(), AppError> {
        let layout = mesh_layout();
        let upload = |file: &str, scale: f32| -> Result<MeshBuffer, AppError> {
            let data = MeshLoader::load(paths.asset(file), &layout, scale)?;
            Ok(MeshBuffer::upload(gpu.context, gpu.command_pool, &data)?)
        };
        let plants = upload(PLANTS_MESH, PLANTS_SCALE)?;
        let ground = upload(GROUND_MESH, GROUND_SCALE)?;
        let skysphere = upload(SKYSPHERE_MESH, SKYSPHERE_SCALE)?;

        let plant_textures = Texture::from_file(
            gpu.context,
            gpu.command_pool,
            paths.asset(PLANT_TEXTURES),
            TextureKind::Array {
                layers: PLANT_TEXTURE_LAYERS,
            },
        )?;
        let ground_texture =
            Texture::from_file(gpu.context, gpu.command_pool, paths.asset(GROUND_TEXTURE), TextureKind::Flat)?;
        if plants.parts.len() > PLANT_TEXTURE_LAYERS as usize {
            log::warn!(
                "{} plant parts but only {} texture layers",
                plants.parts.len(),
                PLANT_TEXTURE_LAYERS
            );
        }

        let commands = indirect_commands(&plants.parts, OBJECT_INSTANCE_COUNT);
        let object_count = object_count(&commands);
        let command_buffer = Buffer::device_local_with_data(
            gpu.context,
            gpu.command_pool,
            vk::BufferUsageFlags::INDIRECT_BUFFER,
            bytemuck::cast_slice(&commands),
        )?;
        let instance_data = generate_instances(&mut rand::thread_rng(), object_count, OBJECT_INSTANCE_COUNT);
        let instances = Buffer::device_local_with_data(
            gpu.context,
            gpu.command_pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&instance_data),
        )?;
        let uniforms = UniformBuffer::new(gpu.context, &IndirectUniforms::zeroed())?;

        let device = gpu.context.raw_device();
        let bindings = [
            layout_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
            layout_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
            layout_binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
        ];
        let set_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;
        let descriptor_pool = DescriptorPool::new(device.clone(), &pool_sizes(&bindings, 1), 1)?;
        let descriptor_set = descriptor_pool.allocate(&set_layout)?;
        DescriptorWriter::new()
            .uniform_buffer(0, uniforms.descriptor())
            .combined_image_sampler(1, plant_textures.descriptor())
            .combined_image_sampler(2, ground_texture.descriptor())
            .write(&device, descriptor_set);

        let pipeline_layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?;
        let base = PipelineBuilder::new()
            .cull_mode(vk::CullModeFlags::NONE)
            .vertex_input(binding_description(&layout, 0), attribute_descriptions(&layout, 0, 0));

        let (vertex, fragment) = common::load_shader_pair(gpu, paths, "indirect/indirect")?;
        let plants_pipeline = base
            .clone()
            .vertex_input(
                vk::VertexInputBindingDescription {
                    binding: INSTANCE_BINDING,
                    stride: std::mem::size_of::<InstanceData>() as u32,
                    input_rate: vk::VertexInputRate::INSTANCE,
                },
                instance_attributes(),
            )
            .build(device.clone(), gpu.render_pass, pipeline_layout.handle(), &vertex, &fragment)?;

        let (vertex, fragment) = common::load_shader_pair(gpu, paths, "indirect/ground")?;
        let ground_pipeline = base.build(device.clone(), gpu.render_pass, pipeline_layout.handle(), &vertex, &fragment)?;

        let (vertex, fragment) = common::load_shader_pair(gpu, paths, "indirect/skysphere")?;
        let skysphere_pipeline = base.build(device, gpu.render_pass, pipeline_layout.handle(), &vertex, &fragment)?;

        self.multi_draw_indirect = gpu.supports_multi_draw_indirect();
        self.object_count = object_count;
        log::info!(
            "{} indirect commands, {} objects, multiDrawIndirect {}",
            commands.len(),
            object_count,
            if self.multi_draw_indirect { "enabled" } else { "unavailable" }
        );

        self.resources = Some(IndirectResources {
            plants,
            ground,
            skysphere,
            instances,
            commands: command_buffer,
            command_count: commands.len() as u32,
            plants_pipeline,
            ground_pipeline,
            skysphere_pipeline,
            pipeline_layout,
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            uniforms,
            _plant_textures: plant_textures,
            _ground_texture: ground_texture,
        });
        Ok(())
    }

    fn build_draw_commands(&self, recorder: &mut DrawRecorder, _image_index: usize) -> Result<(), AppError> {
        let resources = self.resources()?;
        recorder.set_full_viewport();
        recorder.bind_descriptor_sets(resources.pipeline_layout.handle(), &[resources.descriptor_set]);

        recorder.bind_pipeline(resources.plants_pipeline.handle());
        recorder.bind_vertex_buffers(0, &[resources.plants.vertices.handle()], &[0]);
        recorder.bind_vertex_buffers(INSTANCE_BINDING, &[resources.instances.handle()], &[0]);
        recorder.bind_index_buffer(resources.plants.indices.handle());
        if self.multi_draw_indirect {
            recorder.draw_indexed_indirect(resources.commands.handle(), 0, resources.command_count);
        } else {
            let stride = std::mem::size_of::<IndirectCommand>() as vk::DeviceSize;
            for index in 0..vk::DeviceSize::from(resources.command_count) {
                recorder.draw_indexed_indirect(resources.commands.handle(), index * stride, 1);
            }
        }

        for (pipeline, mesh) in [
            (&resources.ground_pipeline, &resources.ground),
            (&resources.skysphere_pipeline, &resources.skysphere),
        ] {
            recorder.bind_pipeline(pipeline.handle());
            recorder.bind_vertex_buffers(0, &[mesh.vertices.handle()], &[0]);
            recorder.bind_index_buffer(mesh.indices.handle());
            recorder.draw_indexed(mesh.index_count, 1, 0, 0);
        }
        Ok(())
    }

    fn update_frame_state(
        &mut self,
        frame: &FrameInfo<'_>,
        transfers: &mut TransferQueue,
    ) -> Result<SceneChange, AppError> {
        let write = UniformWrite::for_frame(self.uniforms_written, frame.camera_moved);
        if write == UniformWrite::Skip {
            return Ok(SceneChange::NONE);
        }

        let (projection, view) = frame.camera_matrices();
        let uniforms = IndirectUniforms::new(projection, view);
        let resources = self.resources()?;
        if write == UniformWrite::Queued {
            transfers.queue_value(resources.uniforms.handle(), 0, &uniforms)?;
        } else {
            resources.uniforms.update(&uniforms)?;
            self.uniforms_written = true;
        }
        Ok(SceneChange::NONE)
    }

    fn describe_overlay(&self, text: &mut OverlayText) {
        text.add_text(format!("{} objects", self.object_count), 5.0, 85.0, TextAlign::Left);
        if !self.multi_draw_indirect {
            text.add_text("multiDrawIndirect not supported", 5.0, 105.0, TextAlign::Left);
        }
    }

    fn cleanup(&mut self) {
        self.resources = None;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::run("indirect", IndirectDemo::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn parts() -> Vec<MeshPart> {
        vec![
            MeshPart {
                index_base: 0,
                index_count: 36,
                vertex_count: 24,
            },
            MeshPart {
                index_base: 36,
                index_count: 12,
                vertex_count: 8,
            },
            MeshPart {
                index_base: 48,
                index_count: 300,
                vertex_count: 120,
            },
        ]
    }

    #[test]
    fn test_command_layout_matches_vulkan() {
        assert_eq!(
            std::mem::size_of::<IndirectCommand>(),
            std::mem::size_of::<vk::DrawIndexedIndirectCommand>()
        );
        assert_eq!(std::mem::size_of::<InstanceData>(), 32);
    }

    #[test]
    fn test_one_command_per_part() {
        let commands = indirect_commands(&parts(), OBJECT_INSTANCE_COUNT);
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[1].first_index, 36);
        assert_eq!(commands[1].index_count, 12);
        assert_eq!(commands[2].first_instance, 2 * OBJECT_INSTANCE_COUNT);
        assert!(commands.iter().all(|c| c.instance_count == OBJECT_INSTANCE_COUNT && c.vertex_offset == 0));
        assert_eq!(object_count(&commands), 3 * OBJECT_INSTANCE_COUNT);
    }

    #[test]
    fn test_no_parts_no_objects() {
        let commands = indirect_commands(&[], OBJECT_INSTANCE_COUNT);
        assert!(commands.is_empty());
        assert_eq!(object_count(&commands), 0);
    }

    #[test]
    fn test_instances_cover_disc_with_layer_per_part() {
        let mut rng = StdRng::seed_from_u64(42);
        let instances = generate_instances(&mut rng, 3 * 16, 16);
        assert_eq!(instances.len(), 48);
        for (i, instance) in instances.iter().enumerate() {
            let position = Vector3::from(instance.position);
            assert!(position.norm() <= PLANT_RADIUS + 1e-3);
            assert_eq!(position.z, 0.0);
            assert_eq!(instance.texture_index, i as u32 / 16);
            assert_eq!(instance.rotation[0], 0.0);
            assert!((1.0..=3.0).contains(&instance.scale));
        }
    }

    #[test]
    fn test_overlay_reports_fallback() {
        let mut demo = IndirectDemo::new();
        demo.object_count = 1536;
        let mut text = OverlayText::new();
        demo.describe_overlay(&mut text);
        assert_eq!(text.lines().len(), 2);
        assert_eq!(text.lines()[0].text, "1536 objects");

        demo.multi_draw_indirect = true;
        let mut text = OverlayText::new();
        demo.describe_overlay(&mut text);
        assert_eq!(text.lines().len(), 1);
    }
}
