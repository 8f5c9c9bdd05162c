//! Demo scene: a skybox, logos, a background and a set of models
//!
//! Four meshes share one uniform buffer and one cubemap but use three
//! pipelines. The skybox is drawn first with front-face culling and without
//! depth writes so everything else lands on top of it.

mod common;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use common::UniformWrite;
use demo_engine::prelude::*;
use demo_engine::render::vulkan::descriptor::{layout_binding, pool_sizes};
use demo_engine::render::vulkan::vertex_layout::{attribute_descriptions, binding_description};
use nalgebra::{Matrix4, Vector3, Vector4};

const TITLE: &str = "Vulkan Demo Scene";
const CUBEMAP: &str = "textures/cubemap_vulkan.png";

/// Meshes in draw order; the skybox comes first because it does not write depth
const SCENE_MESHES: [(&str, ScenePipeline); 4] = [
    ("models/cube.obj", ScenePipeline::Skybox),
    ("models/vulkanscenelogos.obj", ScenePipeline::Logos),
    ("models/vulkanscenebackground.obj", ScenePipeline::Models),
    ("models/vulkanscenemodels.obj", ScenePipeline::Models),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScenePipeline {
    Models,
    Logos,
    Skybox,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SceneUniforms {
    projection: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    light_position: [f32; 4],
}

impl SceneUniforms {
    fn new(projection: Matrix4<f32>, view: Matrix4<f32>, light_position: Vector4<f32>) -> Self {
        let model = Matrix4::identity();
        let normal = (view * model)
            .try_inverse()
            .map_or_else(Matrix4::identity, |inverse| inverse.transpose());
        Self {
            projection: projection.into(),
            model: model.into(),
            normal: normal.into(),
            view: view.into(),
            light_position: light_position.into(),
        }
    }
}

fn scene_layout() -> VertexLayout {
    VertexLayout::new([
        VertexComponent::Position,
        VertexComponent::Normal,
        VertexComponent::Uv,
        VertexComponent::Color,
    ])
}

struct SceneMesh {
    buffer: MeshBuffer,
    pipeline: ScenePipeline,
}

struct SceneResources {
    meshes: Vec<SceneMesh>,
    models_pipeline: GraphicsPipeline,
    logos_pipeline: GraphicsPipeline,
    skybox_pipeline: GraphicsPipeline,
    pipeline_layout: PipelineLayout,
    descriptor_set: vk::DescriptorSet,
    _descriptor_pool: DescriptorPool,
    _set_layout: DescriptorSetLayout,
    uniforms: UniformBuffer<SceneUniforms>,
    _cubemap: Texture,
}

impl SceneResources {
    fn pipeline(&self, kind: ScenePipeline) -> vk::Pipeline {
        match kind {
            ScenePipeline::Models => self.models_pipeline.handle(),
            ScenePipeline::Logos => self.logos_pipeline.handle(),
            ScenePipeline::Skybox => self.skybox_pipeline.handle(),
        }
    }
}

struct SceneDemo {
    resources: Option<SceneResources>,
    light_position: Vector4<f32>,
    camera_translation: Vector3<f32>,
    camera_rotation: [f32; 4],
    uniforms_written: bool,
}

impl SceneDemo {
    fn new() -> Self {
        Self {
            resources: None,
            light_position: Vector4::new(1.0, 2.0, 0.0, 0.0),
            camera_translation: Vector3::zeros(),
            camera_rotation: [1.0, 0.0, 0.0, 0.0],
            uniforms_written: false,
        }
    }

    fn resources(&self) -> Result<&SceneResources, AppError> {
        self.resources
            .as_ref()
            .ok_or_else(|| AppError::Custom("scene resources not loaded".to_string()))
    }
}

impl Demo for SceneDemo {
    fn title(&self) -> &str {
        TITLE
    }

    fn initial_camera(&self, aspect: f32) -> Camera {
        let mut camera = Camera::new(aspect);
        camera.set_translation(Vector3::new(-1.0, -1.0, -3.0));
        camera
    }

    fn load_assets(&mut self, gpu: &GpuContext<'_>, paths: &AssetPaths) -> Result<(), AppError> {
        let layout = scene_layout();
        let meshes = SCENE_MESHES
            .iter()
            .map(|&(file, pipeline)| -> Result<SceneMesh, AppError> {
                let data = MeshLoader::load(paths.asset(file), &layout, 1.0)?;
                let buffer = MeshBuffer::upload(gpu.context, gpu.command_pool, &data)?;
                Ok(SceneMesh { buffer, pipeline })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let cubemap = Texture::from_file(gpu.context, gpu.command_pool, paths.asset(CUBEMAP), TextureKind::Cube)?;
        let uniforms = UniformBuffer::new(gpu.context, &SceneUniforms::zeroed())?;

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
            .combined_image_sampler(1, cubemap.descriptor())
            .write(&device, descriptor_set);

        let pipeline_layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?;
        let base = PipelineBuilder::new()
            .vertex_input(binding_description(&layout, 0), attribute_descriptions(&layout, 0, 0));

        let (vertex, fragment) = common::load_shader_pair(gpu, paths, "scene/mesh")?;
        let models_pipeline = base.build(device.clone(), gpu.render_pass, pipeline_layout.handle(), &vertex, &fragment)?;

        let (vertex, fragment) = common::load_shader_pair(gpu, paths, "scene/logo")?;
        let logos_pipeline = base.build(device.clone(), gpu.render_pass, pipeline_layout.handle(), &vertex, &fragment)?;

        let (vertex, fragment) = common::load_shader_pair(gpu, paths, "scene/skybox")?;
        let skybox_pipeline = base
            .clone()
            .cull_mode(vk::CullModeFlags::FRONT)
            .depth(true, false)
            .build(device, gpu.render_pass, pipeline_layout.handle(), &vertex, &fragment)?;

        log::info!("Loaded {} scene meshes", meshes.len());
        self.resources = Some(SceneResources {
            meshes,
            models_pipeline,
            logos_pipeline,
            skybox_pipeline,
            pipeline_layout,
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            uniforms,
            _cubemap: cubemap,
        });
        Ok(())
    }

    fn build_draw_commands(&self, recorder: &mut DrawRecorder, _image_index: usize) -> Result<(), AppError> {
        let resources = self.resources()?;
        recorder.set_full_viewport();
        recorder.bind_descriptor_sets(resources.pipeline_layout.handle(), &[resources.descriptor_set]);
        for mesh in &resources.meshes {
            recorder.bind_pipeline(resources.pipeline(mesh.pipeline));
            recorder.bind_vertex_buffers(0, &[mesh.buffer.vertices.handle()], &[0]);
            recorder.bind_index_buffer(mesh.buffer.indices.handle());
            recorder.draw_indexed(mesh.buffer.index_count, 1, 0, 0);
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
        let uniforms = SceneUniforms::new(projection, view, self.light_position);
        let resources = self.resources()?;
        if write == UniformWrite::Queued {
            transfers.queue_value(resources.uniforms.handle(), 0, &uniforms)?;
        } else {
            resources.uniforms.update(&uniforms)?;
            self.uniforms_written = true;
        }

        let rotation = frame.camera.rotation.quaternion();
        self.camera_rotation = [rotation.w, rotation.i, rotation.j, rotation.k];
        self.camera_translation = frame.camera.translation;
        Ok(SceneChange::OVERLAY)
    }

    fn describe_overlay(&self, text: &mut OverlayText) {
        let [w, x, y, z] = self.camera_rotation;
        text.add_text("camera stats:", 5.0, 70.0, TextAlign::Left);
        for (row, (label, value)) in [
            ("rotation(q) w", w),
            ("rotation(q) x", x),
            ("rotation(q) y", y),
            ("rotation(q) z", z),
            ("pos x", self.camera_translation.x),
            ("pos y", self.camera_translation.y),
            ("pos z", self.camera_translation.z),
        ]
        .into_iter()
        .enumerate()
        {
            text.add_text(format!("{}: {:.6}", label, value), 5.0, 90.0 + 20.0 * row as f32, TextAlign::Left);
        }
    }

    fn cleanup(&mut self) {
        self.resources = None;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::run("scene", SceneDemo::new())
}
