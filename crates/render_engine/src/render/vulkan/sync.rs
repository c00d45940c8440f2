//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for semaphores and fences, plus the [`FrameSync`] bundle
//! each frame slot carries: an image-acquired semaphore, a work-finished
//! semaphore and a CPU-wait fence. Semaphores order GPU operations without
//! CPU involvement; the fence lets the CPU wait for a slot's submitted work
//! to retire before reusing its command buffer.

use ash::{vk, Device};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive with automatic resource management
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device.create_semaphore(&create_info, None).map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally already signaled
    ///
    /// Frame slot fences start signaled so the first wait on a never
    /// submitted slot returns immediately.
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device.create_fence(&create_info, None).map_err(VulkanError::Api)?
        };

        Ok(Self { device, fence })
    }

    /// Wait for the fence to signal
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Reset the fence to unsignaled
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects for one in-flight frame slot
pub struct FrameSync {
    /// Signaled when the acquired swapchain image becomes usable
    pub image_available: Semaphore,
    /// Signaled when the slot's submitted GPU work completes
    pub render_finished: Semaphore,
    /// CPU-side completion signal for the slot's submission
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects
    pub fn new(device: Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self { image_available, render_finished, in_flight })
    }
}
