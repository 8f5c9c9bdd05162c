//! Text overlay drawn on top of the scene
//!
//! Text is laid out on the CPU into a host-visible vertex buffer and drawn
//! from the overlay secondary command buffers with one non-indexed draw.
//! Callers refresh it with `begin_text_update` / `add_text` /
//! `end_text_update` and must make sure the queue is idle before ending an
//! update, since in-flight frames read the same vertex buffer.

use ash::vk;
use std::path::Path;
use crate::assets::{AssetError, AssetPaths};
use crate::render::frame::{CleanupAction, Recycler};
use crate::render::text::{layout_text, FontAtlas, OverlayText, TextAlign, TextVertex};
use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::commands::{CommandPool, DrawRecorder};
use crate::render::vulkan::context::{VulkanContext, VulkanResult};
use crate::render::vulkan::descriptor::{
    layout_binding, pool_sizes, DescriptorPool, DescriptorSetLayout, DescriptorWriter, PipelineLayout,
};
use crate::render::vulkan::pipeline::{GraphicsPipeline, PipelineBuilder};
use crate::render::vulkan::shader::ShaderModule;
use crate::render::vulkan::texture::{Texture, TextureData, TextureKind};

/// Initial vertex capacity, in characters
const INITIAL_CHAR_CAPACITY: usize = 2048;
const VERTICES_PER_CHAR: usize = 6;

/// GPU resources and current contents of the text overlay
pub struct TextOverlay {
    atlas: FontAtlas,
    text: OverlayText,
    vertex_buffer: Buffer,
    capacity: usize,
    vertex_count: u32,
    pipeline: GraphicsPipeline,
    pipeline_layout: PipelineLayout,
    descriptor_set: vk::DescriptorSet,
    _descriptor_pool: DescriptorPool,
    _set_layout: DescriptorSetLayout,
    _font_texture: Texture,
}

impl TextOverlay {
    /// Rasterize the font and build the overlay pipeline for `render_pass`
    pub fn new(
        context: &VulkanContext,
        pool: &CommandPool,
        render_pass: vk::RenderPass,
        paths: &AssetPaths,
        font: impl AsRef<Path>,
        font_size: f32,
    ) -> Result<Self, AssetError> {
        let font_path = paths.asset(font);
        let font_data = std::fs::read(&font_path)
            .map_err(|e| AssetError::Font(format!("{}: {}", font_path.display(), e)))?;
        let atlas = FontAtlas::new(&font_data, font_size)?;

        let font_texture = Texture::from_data(
            context,
            pool,
            &TextureData {
                width: atlas.width(),
                layer_height: atlas.height(),
                kind: TextureKind::Flat,
                pixels: atlas.pixels().to_vec(),
                format: vk::Format::R8_UNORM,
            },
        )?;

        let device = context.raw_device();
        let bindings = [layout_binding(
            0,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
        )];
        let set_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;
        let descriptor_pool = DescriptorPool::new(device.clone(), &pool_sizes(&bindings, 1), 1)?;
        let descriptor_set = descriptor_pool.allocate(&set_layout)?;
        DescriptorWriter::new()
            .combined_image_sampler(0, font_texture.descriptor())
            .write(&device, descriptor_set);

        let pipeline_layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?;
        let vertex_shader = ShaderModule::from_file(
            device.clone(),
            paths.shader("overlay/text.vert.spv"),
            vk::ShaderStageFlags::VERTEX,
        )?;
        let fragment_shader = ShaderModule::from_file(
            device.clone(),
            paths.shader("overlay/text.frag.spv"),
            vk::ShaderStageFlags::FRAGMENT,
        )?;
        let pipeline = PipelineBuilder::new()
            .vertex_input(
                vk::VertexInputBindingDescription {
                    binding: 0,
                    stride: std::mem::size_of::<TextVertex>() as u32,
                    input_rate: vk::VertexInputRate::VERTEX,
                },
                [
                    vk::VertexInputAttributeDescription {
                        location: 0,
                        binding: 0,
                        format: vk::Format::R32G32_SFLOAT,
                        offset: 0,
                    },
                    vk::VertexInputAttributeDescription {
                        location: 1,
                        binding: 0,
                        format: vk::Format::R32G32_SFLOAT,
                        offset: 8,
                    },
                ],
            )
            .cull_mode(vk::CullModeFlags::NONE)
            .depth(false, false)
            .alpha_blend(true)
            .build(
                device.clone(),
                render_pass,
                pipeline_layout.handle(),
                &vertex_shader,
                &fragment_shader,
            )?;

        let capacity = INITIAL_CHAR_CAPACITY * VERTICES_PER_CHAR;
        let vertex_buffer = Self::create_vertex_buffer(context, capacity)?;

        Ok(Self {
            atlas,
            text: OverlayText::new(),
            vertex_buffer,
            capacity,
            vertex_count: 0,
            pipeline,
            pipeline_layout,
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            _font_texture: font_texture,
        })
    }

    fn create_vertex_buffer(context: &VulkanContext, vertices: usize) -> VulkanResult<Buffer> {
        Buffer::new(
            context,
            (vertices * std::mem::size_of::<TextVertex>()) as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Discard the previous contents
    pub fn begin_text_update(&mut self) {
        self.text.clear();
    }

    /// Queue a line at window pixel position `(x, y)`
    pub fn add_text(&mut self, text: impl Into<String>, x: f32, y: f32, align: TextAlign) {
        self.text.add_text(text, x, y, align);
    }

    /// Mutable access to the queued lines, for demos describing their overlay
    pub fn text_mut(&mut self) -> &mut OverlayText {
        &mut self.text
    }

    /// Lay out the queued lines and write them to the vertex buffer
    ///
    /// Grows the buffer when the text no longer fits; the old buffer is handed
    /// to `recycler` because recorded overlay commands may still reference it.
    pub fn end_text_update(
        &mut self,
        context: &VulkanContext,
        recycler: &mut Recycler,
        viewport: (u32, u32),
    ) -> VulkanResult<()> {
        let vertices = layout_text(&self.atlas, &self.text, viewport);

        if vertices.len() > self.capacity {
            let capacity = vertices.len().next_power_of_two();
            let replacement = Self::create_vertex_buffer(context, capacity)?;
            let (buffer, memory) = std::mem::replace(&mut self.vertex_buffer, replacement).into_raw();
            recycler.discard(CleanupAction::DestroyBuffer { buffer, memory });
            log::debug!("Grew overlay vertex buffer to {} vertices", capacity);
            self.capacity = capacity;
        }

        self.vertex_buffer.write_data(&vertices)?;
        self.vertex_count = vertices.len() as u32;
        Ok(())
    }

    /// Record the overlay draw into one image's overlay secondary buffer
    pub fn record(&self, recorder: &mut DrawRecorder) {
        recorder.set_full_viewport();
        if self.vertex_count == 0 {
            return;
        }
        recorder.bind_pipeline(self.pipeline.handle());
        recorder.bind_descriptor_sets(self.pipeline_layout.handle(), &[self.descriptor_set]);
        recorder.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        recorder.draw(self.vertex_count, 1, 0, 0);
    }
}
