//! Vulkan instance, device and surface
//!
//! Owns everything that lives for the whole run of a demo. The swapchain and
//! its dependents are rebuilt on resize and live in `Renderer` instead.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;
use ash::{Device, Entry, Instance};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use thiserror::Error;
use crate::render::vulkan::window::Window;

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };
const ENGINE_NAME: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"demo_engine\0") };

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// A Vulkan call returned an error code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// The swapchain no longer matches the surface and must be rebuilt
    #[error("Swapchain out of date")]
    SwapchainOutOfDate,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Why the operation was rejected
        reason: String,
    },

    /// Instance, surface or device setup failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No memory type satisfies an allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Instance plus the optional validation messenger
struct InstanceHandles {
    entry: Entry,
    instance: Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl InstanceHandles {
    fn new(window: &Window, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {}", e)))?;

        let validation = enable_validation && validation_layer_available(&entry);
        if enable_validation && !validation {
            log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }

        let window_extensions = window
            .get_required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(format!("Window extensions: {}", e)))?
            .into_iter()
            .map(|name| {
                CString::new(name)
                    .map_err(|e| VulkanError::InitializationFailed(format!("Bad extension name: {}", e)))
            })
            .collect::<VulkanResult<Vec<_>>>()?;
        let mut extensions: Vec<*const c_char> = window_extensions.iter().map(|name| name.as_ptr()).collect();
        let mut layers: Vec<*const c_char> = Vec::new();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let app_name = CString::new(app_name)
            .map_err(|e| VulkanError::InitializationFailed(format!("Bad application name: {}", e)))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);
        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&create_info, None).map_err(VulkanError::Api)? };

        let debug_utils = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(log_validation_message));
            let messenger = unsafe {
                debug_utils
                    .create_debug_utils_messenger(&messenger_info, None)
                    .map_err(VulkanError::Api)?
            };
            log::info!("Validation layer enabled");
            Some((debug_utils, messenger))
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }
}

impl Drop for InstanceHandles {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn validation_layer_available(entry: &Entry) -> bool {
    entry
        .enumerate_instance_layer_properties()
        .map(|layers| {
            layers
                .iter()
                .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER)
        })
        .unwrap_or(false)
}

/// Routes validation messages into `log`
unsafe extern "system" fn log_validation_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan] {:?} - {}", message_type, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan] {:?} - {}", message_type, message),
        _ => log::debug!("[Vulkan] {:?} - {}", message_type, message),
    }
    vk::FALSE
}

/// Graphics and present queue family indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Family used for drawing and transfers
    pub graphics: u32,
    /// Family used for presentation
    pub present: u32,
}

impl QueueFamilies {
    /// Pick families, preferring one that can both draw and present
    pub fn pick(
        families: &[vk::QueueFamilyProperties],
        mut can_present: impl FnMut(u32) -> VulkanResult<bool>,
    ) -> VulkanResult<Option<Self>> {
        let mut graphics = None;
        let mut present = None;
        for (index, family) in (0u32..).zip(families) {
            let draws = family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let presents = can_present(index)?;
            if draws && presents {
                return Ok(Some(Self {
                    graphics: index,
                    present: index,
                }));
            }
            if draws {
                graphics.get_or_insert(index);
            }
            if presents {
                present.get_or_insert(index);
            }
        }
        Ok(graphics.zip(present).map(|(graphics, present)| Self { graphics, present }))
    }

    /// Whether drawing and presentation share a family
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// Discrete GPUs first, then integrated, then anything else
fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
        _ => 0,
    }
}

/// Optional features the demos use, enabled only where the device has them
fn demo_features(available: &vk::PhysicalDeviceFeatures) -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures {
        sampler_anisotropy: available.sampler_anisotropy,
        multi_draw_indirect: available.multi_draw_indirect,
        draw_indirect_first_instance: available.draw_indirect_first_instance,
        ..Default::default()
    }
}

/// The selected GPU and what it offers
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue families used for drawing and presenting
    pub queue_families: QueueFamilies,
}

impl PhysicalDeviceInfo {
    /// Best-ranked device that can draw to `surface` and has a swapchain
    fn select(instance: &Instance, surface: vk::SurfaceKHR, surface_loader: &Surface) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };

        let mut best: Option<Self> = None;
        for device in devices {
            let Some(candidate) = Self::inspect(instance, device, surface, surface_loader)? else {
                continue;
            };
            let rank = device_type_rank(candidate.properties.device_type);
            if best
                .as_ref()
                .map_or(true, |current| rank > device_type_rank(current.properties.device_type))
            {
                best = Some(candidate);
            }
        }

        let selected = best.ok_or_else(|| VulkanError::InitializationFailed("No suitable GPU found".to_string()))?;
        log::info!(
            "Selected GPU: {} ({:?}), multiDrawIndirect {}",
            selected.name(),
            selected.properties.device_type,
            selected.features.multi_draw_indirect == vk::TRUE
        );
        Ok(selected)
    }

    /// `None` when the device cannot run the demos
    fn inspect(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Option<Self>> {
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let queue_families = QueueFamilies::pick(&families, |index| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .map_err(VulkanError::Api)
        })?;
        let Some(queue_families) = queue_families else {
            return Ok(None);
        };

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let has_swapchain = extensions
            .iter()
            .any(|extension| unsafe { CStr::from_ptr(extension.extension_name.as_ptr()) } == SwapchainLoader::name());
        if !has_swapchain {
            return Ok(None);
        }

        let info = unsafe {
            Self {
                device,
                properties: instance.get_physical_device_properties(device),
                features: instance.get_physical_device_features(device),
                memory_properties: instance.get_physical_device_memory_properties(device),
                queue_families,
            }
        };
        log::debug!("Candidate GPU: {}", info.name());
        Ok(Some(info))
    }

    /// Driver-reported device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Index of a memory type allowed by `type_filter` with all of `properties`
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        find_memory_type(&self.memory_properties, type_filter, properties)
    }
}

/// Index of a memory type allowed by `type_filter` with all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    memory_properties.memory_types[..memory_properties.memory_type_count as usize]
        .iter()
        .zip(0u32..)
        .find(|&(memory_type, index)| type_filter & (1u32 << index) != 0 && memory_type.property_flags.contains(properties))
        .map(|(_, index)| index)
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Logical device, its queues and the features it was created with
pub struct LogicalDevice {
    /// Device function table
    pub device: Device,
    /// Queue for drawing and transfers
    pub graphics_queue: vk::Queue,
    /// Queue for presentation; equal to `graphics_queue` on most hardware
    pub present_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
    /// Features enabled at creation
    pub enabled_features: vk::PhysicalDeviceFeatures,
}

impl LogicalDevice {
    fn new(instance: &Instance, physical: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let families = physical.queue_families;
        let priorities = [1.0];
        let mut queue_infos = vec![vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(families.graphics)
            .queue_priorities(&priorities)
            .build()];
        if !families.is_shared() {
            queue_infos.push(
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(families.present)
                    .queue_priorities(&priorities)
                    .build(),
            );
        }

        let extensions = [SwapchainLoader::name().as_ptr()];
        let enabled_features = demo_features(&physical.features);
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&enabled_features);
        let device = unsafe {
            instance
                .create_device(physical.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let (graphics_queue, present_queue) = unsafe {
            (
                device.get_device_queue(families.graphics, 0),
                device.get_device_queue(families.present, 0),
            )
        };
        let swapchain_loader = SwapchainLoader::new(instance, &device);
        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
            enabled_features,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Instance, surface and device for one window
///
/// Field order matters for drop: the surface is destroyed explicitly, then
/// the device, then the instance.
pub struct VulkanContext {
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    physical_device: PhysicalDeviceInfo,
    device: LogicalDevice,
    instance: InstanceHandles,
}

impl VulkanContext {
    /// Create instance, surface and device for `window`
    pub fn new(window: &mut Window, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let instance = InstanceHandles::new(window, app_name, enable_validation)?;
        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {}", e)))?;

        let physical_device = PhysicalDeviceInfo::select(&instance.instance, surface, &surface_loader)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device)?;

        Ok(Self {
            surface,
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Window surface
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Surface extension loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Selected physical device
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Logical device
    pub fn device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Cloned device function table, for RAII wrappers
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Swapchain extension loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Graphics queue family index
    pub fn graphics_queue_family(&self) -> u32 {
        self.physical_device.queue_families.graphics
    }

    /// Graphics and present queue families
    pub fn queue_families(&self) -> QueueFamilies {
        self.physical_device.queue_families
    }

    /// Whether `multiDrawIndirect` was enabled on the device
    pub fn supports_multi_draw_indirect(&self) -> bool {
        self.device.enabled_features.multi_draw_indirect == vk::TRUE
    }

    /// Wait for all queues to go idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
