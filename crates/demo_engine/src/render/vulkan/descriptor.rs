//! Descriptor set layouts, pools, writes and pipeline layouts

use ash::{vk, Device};
use crate::render::vulkan::context::{VulkanError, VulkanResult};

/// Layout binding for a single descriptor
pub fn layout_binding(
    binding: u32,
    descriptor_type: vk::DescriptorType,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding {
    vk::DescriptorSetLayoutBinding {
        binding,
        descriptor_type,
        descriptor_count: 1,
        stage_flags: stages,
        p_immutable_samplers: std::ptr::null(),
    }
}

/// Pool sizes covering every binding of `bindings`, `sets` times over
pub fn pool_sizes(bindings: &[vk::DescriptorSetLayoutBinding], sets: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for binding in bindings {
        let count = binding.descriptor_count * sets;
        match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
            Some(size) => size.descriptor_count += count,
            None => sizes.push(vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: count,
            }),
        }
    }
    sizes
}

/// Descriptor set layout wrapper with RAII cleanup
pub struct DescriptorSetLayout {
    device: Device,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Create a layout from its bindings
    pub fn new(device: Device, bindings: &[vk::DescriptorSetLayoutBinding]) -> VulkanResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
        let layout = unsafe {
            device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, layout })
    }

    /// Get the layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool wrapper; sets are freed with the pool
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool for up to `max_sets` sets
    pub fn new(device: Device, sizes: &[vk::DescriptorPoolSize], max_sets: u32) -> VulkanResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(sizes)
            .max_sets(max_sets);
        let pool = unsafe {
            device
                .create_descriptor_pool(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, pool })
    }

    /// Allocate one set of `layout`
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        let sets = unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::Api)?
        };
        sets.into_iter().next().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "descriptor pool returned no set".to_string(),
        })
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

enum WriteInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

/// Collects descriptor writes for one set and applies them together
#[derive(Default)]
pub struct DescriptorWriter {
    writes: Vec<(u32, vk::DescriptorType, WriteInfo)>,
}

impl DescriptorWriter {
    /// Start an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a uniform buffer at `binding`
    pub fn uniform_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        self.writes
            .push((binding, vk::DescriptorType::UNIFORM_BUFFER, WriteInfo::Buffer(info)));
        self
    }

    /// Bind a combined image sampler at `binding`
    pub fn combined_image_sampler(mut self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        self.writes.push((
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            WriteInfo::Image(info),
        ));
        self
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether no writes are queued
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply every queued write to `set`
    pub fn write(&self, device: &Device, set: vk::DescriptorSet) {
        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|(binding, ty, info)| {
                let write = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty);
                match info {
                    WriteInfo::Buffer(buffer) => write.buffer_info(std::slice::from_ref(buffer)).build(),
                    WriteInfo::Image(image) => write.image_info(std::slice::from_ref(image)).build(),
                }
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}

/// Pipeline layout wrapper with RAII cleanup
pub struct PipelineLayout {
    device: Device,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Create a layout from descriptor set layouts and push constant ranges
    pub fn new(
        device: Device,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let layout = unsafe {
            device
                .create_pipeline_layout(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, layout })
    }

    /// Get the layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_sizes_merge_types() {
        let bindings = [
            layout_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
            layout_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
            layout_binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
        ];
        let sizes = pool_sizes(&bindings, 2);

        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].descriptor_count, 2);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 4);
    }

    #[test]
    fn test_writer_collects_writes() {
        let writer = DescriptorWriter::new()
            .uniform_buffer(0, vk::DescriptorBufferInfo::default())
            .combined_image_sampler(1, vk::DescriptorImageInfo::default());
        assert_eq!(writer.len(), 2);
        assert!(!writer.is_empty());
        assert!(DescriptorWriter::new().is_empty());
    }
}
