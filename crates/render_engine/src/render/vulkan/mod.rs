//! Vulkan rendering backend
//!
//! Low-level Vulkan implementation: explicit device initialization, the
//! device memory sub-allocator, swapchain lifecycle and the frame-in-flight
//! protocol. All wrappers follow RAII; handles are destroyed in reverse
//! creation order.

use ash::vk;

pub mod buffer;
pub mod commands;
pub mod context;
pub mod memory;
pub mod renderer;
pub mod swapchain;
pub mod sync;

pub use buffer::Buffer;
pub use commands::CommandPool;
pub use context::{DeviceContext, LogicalDevice, PhysicalDeviceInfo, VulkanInstance};
pub use renderer::Renderer;
pub use swapchain::Swapchain;
pub use sync::{Fence, FrameSync, Semaphore};

/// Errors from the Vulkan backend
#[derive(Debug, thiserror::Error)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Device memory allocation failed
    #[error("Out of device memory: {requested} bytes")]
    OutOfMemory {
        /// Number of bytes that were requested
        requested: u64,
    },

    /// No memory type satisfies the requested property flags
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
