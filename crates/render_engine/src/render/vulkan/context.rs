//! Explicit Vulkan device initialization
//!
//! [`DeviceContext`] owns the instance, surface, physical device selection
//! and logical device, and is passed by reference into the allocator,
//! renderer and resource constructors. Initialization and teardown are
//! explicit; there is no process-wide graphics singleton.

use std::ffi::{CStr, CString};

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::{vk, Device, Entry, Instance};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::core::config::RendererConfig;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities extension (debug builds)
    #[cfg(debug_assertions)]
    pub debug_utils: Option<DebugUtils>,
    /// Debug messenger handle (debug builds)
    #[cfg(debug_assertions)]
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance with the surface extensions required by
    /// the windowing system
    pub fn new(
        display: RawDisplayHandle,
        app_name: &str,
        enable_validation: bool,
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e:?}"))
        })?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("app name contains NUL".into()))?;
        let engine_name_cstr = CString::new("render_engine")
            .map_err(|_| VulkanError::InitializationFailed("engine name contains NUL".into()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = ash_window::enumerate_required_extensions(display)
            .map_err(VulkanError::Api)?;

        #[allow(unused_mut)] // Mutable in debug builds for adding debug extensions
        let mut extensions: Vec<*const i8> = required_extensions.to_vec();

        #[cfg(debug_assertions)]
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if cfg!(debug_assertions) && enable_validation {
            vec![CString::new("VK_LAYER_KHRONOS_validation").map_err(|_| {
                VulkanError::InitializationFailed("invalid layer name".into())
            })?]
        } else {
            vec![]
        };
        let layer_names_ptrs: Vec<*const i8> =
            layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names_ptrs);

        let instance = unsafe {
            entry.create_instance(&create_info, None).map_err(VulkanError::Api)?
        };
        log::info!("Vulkan: instance created");

        #[cfg(debug_assertions)]
        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let debug_messenger = Self::setup_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(debug_messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let (Some(debug_utils), Some(debug_messenger)) =
                (&self.debug_utils, &self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(*debug_messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types exposed by the device
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select a suitable physical device for rendering
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance.enumerate_physical_devices().map_err(VulkanError::Api)?
        };

        for device in devices {
            if let Ok(info) = Self::evaluate_device(instance, device, surface, surface_loader) {
                log::info!("Selected GPU: {}", unsafe {
                    CStr::from_ptr(info.properties.device_name.as_ptr()).to_string_lossy()
                });
                return Ok(info);
            }
        }

        Err(VulkanError::InitializationFailed("No suitable GPU found".to_string()))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;

        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };
            if present_support && present_family.is_none() {
                present_family = Some(index);
            }

            if graphics_family.is_some() && present_family.is_some() {
                break;
            }
        }

        let graphics_family = graphics_family.ok_or_else(|| {
            VulkanError::InitializationFailed("No graphics queue family found".to_string())
        })?;
        let present_family = present_family.ok_or_else(|| {
            VulkanError::InitializationFailed("No present queue family found".to_string())
        })?;

        // The swapchain extension is the only hard device requirement.
        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let has_swapchain = extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Err(VulkanError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ));
        }

        Ok(Self {
            device,
            properties,
            memory_properties,
            graphics_family,
            present_family,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create a new logical device with graphics and present queues
    pub fn new(instance: &Instance, physical: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let unique_families: std::collections::HashSet<u32> =
            [physical.graphics_family, physical.present_family].into_iter().collect();

        // Must outlive the built create infos, which hold a raw pointer to it.
        let queue_priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];
        let device_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };
        log::info!("Vulkan: logical device created");

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self { device, graphics_queue, present_queue, swapchain_loader })
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

/// Owns the core Vulkan objects every other component borrows
///
/// Declaration order matters: fields drop bottom-up, so the surface and
/// device go before the instance.
pub struct DeviceContext {
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    physical_device: PhysicalDeviceInfo,
    device: LogicalDevice,
    instance: VulkanInstance,
}

impl DeviceContext {
    /// Initialize Vulkan for the given window handles
    pub fn new(
        display: RawDisplayHandle,
        window: RawWindowHandle,
        config: &RendererConfig,
    ) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(display, &config.app_name, config.enable_validation)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = unsafe {
            ash_window::create_surface(&instance.entry, &instance.instance, display, window, None)
                .map_err(VulkanError::Api)?
        };
        log::info!("Vulkan: surface created");

        let physical_device =
            PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &surface_loader)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device)?;

        Ok(Self { surface, surface_loader, physical_device, device, instance })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the surface handle
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the surface loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get a clone of the device handle (cheap; `ash::Device` is internally
    /// reference counted)
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Get the swapchain loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Get the graphics queue family index
    pub fn graphics_queue_family(&self) -> u32 {
        self.physical_device.graphics_family
    }

    /// Memory heaps and types of the selected physical device
    pub fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.physical_device.memory_properties
    }

    /// Block until all submitted GPU work has retired
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
        log::info!("Vulkan: surface destroyed");
        // device and instance drop in reverse declaration order.
    }
}
