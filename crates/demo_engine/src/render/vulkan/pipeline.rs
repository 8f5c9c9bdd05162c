//! Graphics pipeline creation
//!
//! Every pipeline targets subpass 0 of the forward render pass and leaves
//! viewport and scissor dynamic, so pipelines survive a resize untouched.

use ash::{vk, Device};
use crate::render::vulkan::context::{VulkanError, VulkanResult};
use crate::render::vulkan::shader::ShaderModule;

/// Fixed-function state that differs between the demo pipelines
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    depth_test: bool,
    depth_write: bool,
    alpha_blend: bool,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
            attributes: Vec::new(),
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_test: true,
            depth_write: true,
            alpha_blend: false,
        }
    }
}

impl PipelineBuilder {
    /// Opaque, depth-tested, back-face culled triangles
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex buffer binding and its attributes
    pub fn vertex_input(
        mut self,
        binding: vk::VertexInputBindingDescription,
        attributes: impl IntoIterator<Item = vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.bindings.push(binding);
        self.attributes.extend(attributes);
        self
    }

    /// Face culling mode
    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    /// Winding considered front-facing
    pub fn front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    /// Depth test and write enables
    pub fn depth(mut self, test: bool, write: bool) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self
    }

    /// Standard source-alpha blending
    pub fn alpha_blend(mut self, enabled: bool) -> Self {
        self.alpha_blend = enabled;
        self
    }

    /// Total attribute count across bindings
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    fn blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let builder = vk::PipelineColorBlendAttachmentState::builder().color_write_mask(vk::ColorComponentFlags::RGBA);
        if self.alpha_blend {
            builder
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
                .build()
        } else {
            builder.blend_enable(false).build()
        }
    }

    /// Create the pipeline
    pub fn build(
        &self,
        device: Device,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
    ) -> VulkanResult<GraphicsPipeline> {
        let stages = [vertex_shader.stage_info(), fragment_shader.stage_info()];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.bindings)
            .vertex_attribute_descriptions(&self.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachments = [self.blend_attachment()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, err)| VulkanError::Api(err))?
        };

        let pipeline = pipelines.into_iter().next().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "pipeline creation returned no pipeline".to_string(),
        })?;

        Ok(GraphicsPipeline { device, pipeline })
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_are_opaque_and_culled() {
        let builder = PipelineBuilder::new();
        assert_eq!(builder.cull_mode, vk::CullModeFlags::BACK);
        assert!(builder.depth_test && builder.depth_write);
        assert_eq!(builder.blend_attachment().blend_enable, vk::FALSE);
    }

    #[test]
    fn test_builder_skybox_settings() {
        let builder = PipelineBuilder::new()
            .cull_mode(vk::CullModeFlags::FRONT)
            .depth(true, false)
            .alpha_blend(true);
        assert_eq!(builder.cull_mode, vk::CullModeFlags::FRONT);
        assert!(!builder.depth_write);
        assert_eq!(builder.blend_attachment().src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
    }

    #[test]
    fn test_vertex_input_accumulates_bindings() {
        let binding = vk::VertexInputBindingDescription {
            binding: 1,
            stride: 32,
            input_rate: vk::VertexInputRate::INSTANCE,
        };
        let attribute = vk::VertexInputAttributeDescription {
            location: 4,
            binding: 1,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        };
        let builder = PipelineBuilder::new().vertex_input(binding, [attribute, attribute]);
        assert_eq!(builder.bindings.len(), 1);
        assert_eq!(builder.attribute_count(), 2);
    }
}
