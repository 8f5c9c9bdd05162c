//! Sampled textures: 2D, 2D array and cubemap
//!
//! Every variant is decoded from a single image file. Array layers and cube
//! faces are stacked vertically in that image, top to bottom, so a cubemap
//! source is one face wide and six faces tall (+X, -X, +Y, -Y, +Z, -Z).

use ash::{vk, Device};
use std::path::Path;
use crate::assets::AssetError;
use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::context::{VulkanContext, VulkanError, VulkanResult};

/// How the layers of a source image are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// Single 2D image
    Flat,
    /// `layers` equally tall images stacked vertically
    Array {
        /// Number of layers in the source image
        layers: u32,
    },
    /// Six faces stacked vertically
    Cube,
}

impl TextureKind {
    /// Number of array layers this kind produces
    pub fn layer_count(self) -> u32 {
        match self {
            TextureKind::Flat => 1,
            TextureKind::Array { layers } => layers,
            TextureKind::Cube => 6,
        }
    }

    fn view_type(self) -> vk::ImageViewType {
        match self {
            TextureKind::Flat => vk::ImageViewType::TYPE_2D,
            TextureKind::Array { .. } => vk::ImageViewType::TYPE_2D_ARRAY,
            TextureKind::Cube => vk::ImageViewType::CUBE,
        }
    }

    fn create_flags(self) -> vk::ImageCreateFlags {
        match self {
            TextureKind::Cube => vk::ImageCreateFlags::CUBE_COMPATIBLE,
            _ => vk::ImageCreateFlags::empty(),
        }
    }
}

/// Decoded pixels ready for upload
#[derive(Debug, Clone)]
pub struct TextureData {
    /// Width of each layer in texels
    pub width: u32,
    /// Height of each layer in texels
    pub layer_height: u32,
    /// Layer interpretation
    pub kind: TextureKind,
    /// Tightly packed texels for all layers, layer 0 first
    pub pixels: Vec<u8>,
    /// Texel format of `pixels`
    pub format: vk::Format,
}

impl TextureData {
    /// Decode an image file as RGBA8 and split it according to `kind`
    pub fn load<P: AsRef<Path>>(path: P, kind: TextureKind) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .map_err(|source| {
                let err = AssetError::Image {
                    path: path.display().to_string(),
                    source,
                };
                log::error!("{}", err);
                err
            })?
            .into_rgba8();

        let (width, height) = decoded.dimensions();
        let layer_height = layer_height(height, kind.layer_count()).map_err(|err| {
            log::error!("{}: {}", path.display(), err);
            err
        })?;

        log::debug!(
            "Decoded {} ({}x{}, {} layer(s))",
            path.display(),
            width,
            layer_height,
            kind.layer_count()
        );

        Ok(Self {
            width,
            layer_height,
            kind,
            pixels: decoded.into_raw(),
            format: vk::Format::R8G8B8A8_UNORM,
        })
    }

    /// Bytes per texel of `format`
    fn texel_size(&self) -> u64 {
        match self.format {
            vk::Format::R8_UNORM => 1,
            _ => 4,
        }
    }
}

/// Height of one layer when `height` texels hold `layers` stacked layers
pub fn layer_height(height: u32, layers: u32) -> Result<u32, AssetError> {
    if layers == 0 || height == 0 || height % layers != 0 {
        return Err(AssetError::Layout(format!(
            "image height {} cannot hold {} equal layers",
            height, layers
        )));
    }
    Ok(height / layers)
}

/// Copy regions for vertically stacked layers in a tightly packed buffer
pub fn layer_regions(width: u32, layer_height: u32, layers: u32, texel_size: u64) -> Vec<vk::BufferImageCopy> {
    let layer_bytes = u64::from(width) * u64::from(layer_height) * texel_size;
    (0..layers)
        .map(|layer| vk::BufferImageCopy {
            buffer_offset: layer_bytes * u64::from(layer),
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: layer,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width,
                height: layer_height,
                depth: 1,
            },
        })
        .collect()
}

/// Sampled image with view and sampler
pub struct Texture {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
    extent: vk::Extent2D,
    kind: TextureKind,
}

impl Texture {
    /// Load and upload a texture file
    pub fn from_file<P: AsRef<Path>>(
        context: &VulkanContext,
        pool: &CommandPool,
        path: P,
        kind: TextureKind,
    ) -> Result<Self, AssetError> {
        let data = TextureData::load(path, kind)?;
        Ok(Self::from_data(context, pool, &data)?)
    }

    /// Upload already decoded texels through a staging buffer
    pub fn from_data(context: &VulkanContext, pool: &CommandPool, data: &TextureData) -> VulkanResult<Self> {
        let device = context.raw_device();
        let layers = data.kind.layer_count();
        let expected = u64::from(data.width) * u64::from(data.layer_height) * u64::from(layers) * data.texel_size();
        if data.pixels.len() as u64 != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!("texture data is {} bytes, expected {}", data.pixels.len(), expected),
            });
        }

        let image_create_info = vk::ImageCreateInfo::builder()
            .flags(data.kind.create_flags())
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: data.width,
                height: data.layer_height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(layers)
            .format(data.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { device.create_image(&image_create_info, None).map_err(VulkanError::Api)? };

        let memory_requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = match context
            .physical_device()
            .find_memory_type(memory_requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)
        {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(memory_requirements.size)
            .memory_type_index(memory_type_index);
        let memory = unsafe { device.allocate_memory(&alloc_info, None).map_err(VulkanError::Api)? };
        unsafe {
            device.bind_image_memory(image, memory, 0).map_err(VulkanError::Api)?;
        }

        // Owns the handles from here on so early returns clean up
        let mut texture = Self {
            device: device.clone(),
            image,
            memory,
            image_view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            extent: vk::Extent2D {
                width: data.width,
                height: data.layer_height,
            },
            kind: data.kind,
        };

        let staging = Buffer::host_visible_with_data(context, vk::BufferUsageFlags::TRANSFER_SRC, &data.pixels)?;
        let regions = layer_regions(data.width, data.layer_height, layers, data.texel_size());
        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: layers,
        };

        pool.submit_one_time(context.graphics_queue(), |device, cmd| unsafe {
            let to_transfer = vk::ImageMemoryBarrier::builder()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .build();
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );

            device.cmd_copy_buffer_to_image(
                cmd,
                staging.handle(),
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            );

            let to_shader = vk::ImageMemoryBarrier::builder()
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .build();
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_shader],
            );
        })?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(data.kind.view_type())
            .format(data.format)
            .subresource_range(range);
        texture.image_view = unsafe { device.create_image_view(&view_info, None).map_err(VulkanError::Api)? };

        let anisotropy = context.device().enabled_features.sampler_anisotropy == vk::TRUE;
        let address_mode = match data.kind {
            TextureKind::Cube => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            _ => vk::SamplerAddressMode::REPEAT,
        };
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy { 8.0 } else { 1.0 })
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::NEVER)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .max_lod(0.0);
        texture.sampler = unsafe { device.create_sampler(&sampler_info, None).map_err(VulkanError::Api)? };

        log::debug!(
            "Uploaded {:?} texture {}x{}",
            data.kind,
            data.width,
            data.layer_height
        );
        Ok(texture)
    }

    /// Descriptor for a combined image sampler binding
    pub fn descriptor(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.image_view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Size of one layer
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Layer interpretation
    pub fn kind(&self) -> TextureKind {
        self.kind
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                self.device.destroy_sampler(self.sampler, None);
            }
            if self.image_view != vk::ImageView::null() {
                self.device.destroy_image_view(self.image_view, None);
            }
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_height_splits_evenly() {
        assert_eq!(layer_height(1536, 6).unwrap(), 256);
        assert_eq!(layer_height(512, 1).unwrap(), 512);
    }

    #[test]
    fn test_layer_height_rejects_uneven_stack() {
        assert!(matches!(layer_height(100, 6), Err(AssetError::Layout(_))));
        assert!(matches!(layer_height(100, 0), Err(AssetError::Layout(_))));
    }

    #[test]
    fn test_layer_regions_offsets_follow_stack_order() {
        let regions = layer_regions(4, 2, 3, 4);
        assert_eq!(regions.len(), 3);
        for (layer, region) in regions.iter().enumerate() {
            assert_eq!(region.buffer_offset, 32 * layer as u64);
            assert_eq!(region.image_subresource.base_array_layer, layer as u32);
            assert_eq!(region.image_extent.height, 2);
        }
    }

    #[test]
    fn test_kind_layer_counts() {
        assert_eq!(TextureKind::Flat.layer_count(), 1);
        assert_eq!(TextureKind::Cube.layer_count(), 6);
        assert_eq!(TextureKind::Array { layers: 5 }.layer_count(), 5);
        assert_eq!(TextureKind::Cube.view_type(), vk::ImageViewType::CUBE);
    }
}
