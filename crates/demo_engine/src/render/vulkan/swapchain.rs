//! Vulkan swapchain management
//!
//! Handles swapchain creation, recreation, acquire and present.

use ash::{vk, Device};
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use crate::render::vulkan::context::{PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanResult};

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for the context's surface
    pub fn create(context: &VulkanContext, size: (u32, u32), vsync: bool) -> VulkanResult<Self> {
        Self::build(context, size, vsync, vk::SwapchainKHR::null())
    }

    /// Build a replacement swapchain, handing over `self` as the old one
    ///
    /// The caller must make sure the device is idle.
    pub fn recreate(&self, context: &VulkanContext, size: (u32, u32), vsync: bool) -> VulkanResult<Self> {
        Self::build(context, size, vsync, self.swapchain)
    }

    fn build(
        context: &VulkanContext,
        size: (u32, u32),
        vsync: bool,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let swapchain_loader = context.swapchain_loader().clone();
        let support = SurfaceSupport::query(context.surface_loader(), context.physical_device(), context.surface())?;

        let format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, vsync)?;
        let extent = choose_extent(&support.capabilities, size);
        let image_count = choose_image_count(&support.capabilities);

        let pre_transform = if support
            .capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            support.capabilities.current_transform
        };

        let families = context.queue_families();
        let family_indices = [families.graphics, families.present];
        let mut swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);
        if !families.is_shared() {
            swapchain_create_info = swapchain_create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices);
        }

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        let image_views = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                unsafe { device.create_image_view(&create_info, None) }
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(VulkanError::Api)?;

        log::info!(
            "Swapchain {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format,
            extent,
        })
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Acquire the next image of `swapchain`, signalling `semaphore` once it is usable
pub(crate) fn acquire_image(
    loader: &SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    semaphore: vk::Semaphore,
) -> VulkanResult<u32> {
    acquired(unsafe { loader.acquire_next_image(swapchain, u64::MAX, semaphore, vk::Fence::null()) })
}

/// A suboptimal swapchain is still used; only out-of-date forces a rebuild
fn acquired(result: ash::prelude::VkResult<(u32, bool)>) -> VulkanResult<u32> {
    match result {
        Ok((index, suboptimal)) => {
            if suboptimal {
                log::debug!("Acquired image {} from a suboptimal swapchain", index);
            }
            Ok(index)
        }
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(VulkanError::SwapchainOutOfDate),
        Err(e) => Err(VulkanError::Api(e)),
    }
}

/// Present `image_index` on `queue` after `wait_semaphore`
pub(crate) fn present_image(
    loader: &SwapchainLoader,
    queue: vk::Queue,
    swapchain: vk::SwapchainKHR,
    image_index: u32,
    wait_semaphore: vk::Semaphore,
) -> VulkanResult<()> {
    let swapchains = [swapchain];
    let indices = [image_index];
    let waits = [wait_semaphore];
    let present_info = vk::PresentInfoKHR::builder()
        .wait_semaphores(&waits)
        .swapchains(&swapchains)
        .image_indices(&indices);

    presented(unsafe { loader.queue_present(queue, &present_info) })
}

fn presented(result: ash::prelude::VkResult<bool>) -> VulkanResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(VulkanError::SwapchainOutOfDate),
        Err(e) => Err(VulkanError::Api(e)),
    }
}

/// Surface properties relevant to swapchain creation
struct SurfaceSupport {
    capabilities: vk::SurfaceCapabilitiesKHR,
    formats: Vec<vk::SurfaceFormatKHR>,
    present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    fn query(loader: &Surface, physical_device: &PhysicalDeviceInfo, surface: vk::SurfaceKHR) -> VulkanResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device.device, surface)
                    .map_err(VulkanError::Api)?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device.device, surface)
                    .map_err(VulkanError::Api)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device.device, surface)
                    .map_err(VulkanError::Api)?,
            })
        }
    }
}

/// Prefer BGRA8 sRGB; a single `UNDEFINED` entry means anything goes
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    let first = formats
        .first()
        .copied()
        .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))?;

    if formats.len() == 1 && first.format == vk::Format::UNDEFINED {
        return Ok(vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: first.color_space,
        });
    }

    Ok(formats
        .iter()
        .copied()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .unwrap_or(first))
}

/// FIFO under vsync; otherwise the lowest-latency mode available
fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> VulkanResult<vk::PresentModeKHR> {
    if modes.is_empty() {
        return Err(VulkanError::InitializationFailed(
            "Surface reports no present modes".to_string(),
        ));
    }
    if vsync {
        return Ok(vk::PresentModeKHR::FIFO);
    }
    Ok([vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO))
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: size.0.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: size.1.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_surface_format_selection() {
        assert!(choose_surface_format(&[]).is_err());

        let chosen = choose_surface_format(&[format(vk::Format::UNDEFINED)]).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);

        let chosen = choose_surface_format(&[
            format(vk::Format::R8G8B8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
        ])
        .unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);

        let chosen = choose_surface_format(&[format(vk::Format::R8G8B8A8_UNORM)]).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_present_mode_selection() {
        assert!(choose_present_mode(&[], true).is_err());

        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&all, true).unwrap(), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&all, false).unwrap(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE], false).unwrap(),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], false).unwrap(),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_and_image_count() {
        let mut capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 1920, height: 1080 },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, (4000, 600));
        assert_eq!((extent.width, extent.height), (1920, 600));
        assert_eq!(choose_image_count(&capabilities), 3);

        capabilities.max_image_count = 2;
        assert_eq!(choose_image_count(&capabilities), 2);

        capabilities.current_extent = vk::Extent2D { width: 800, height: 600 };
        let extent = choose_extent(&capabilities, (4000, 4000));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_only_out_of_date_requests_rebuild() {
        assert_eq!(acquired(Ok((2, true))).unwrap(), 2);
        assert!(matches!(
            acquired(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Err(VulkanError::SwapchainOutOfDate)
        ));
        assert!(matches!(
            acquired(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))
        ));

        assert!(presented(Ok(true)).is_ok());
        assert!(matches!(
            presented(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Err(VulkanError::SwapchainOutOfDate)
        ));
    }
}
