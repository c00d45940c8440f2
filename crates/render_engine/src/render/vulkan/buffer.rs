//! Device buffers backed by the sub-allocator
//!
//! The shape every allocator consumer follows: create the Vulkan resource,
//! take a [`MemoryBlock`](crate::render::vulkan::memory::MemoryBlock) for
//! its memory requirements, bind at the block offset, return the block on
//! drop. Host-visible buffers write through the chunk's persistent mapping;
//! no map/unmap per upload.

use ash::{vk, Device};

use crate::render::vulkan::memory::{MemoryBlock, SharedAllocator};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// A `vk::Buffer` bound to a sub-allocated memory block
pub struct Buffer {
    device: Device,
    allocator: SharedAllocator,
    buffer: vk::Buffer,
    block: MemoryBlock,
}

impl Buffer {
    /// Create a buffer and back it with allocator memory matching
    /// `properties`
    pub fn new(
        device: Device,
        allocator: SharedAllocator,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let block = {
            let mut alloc = allocator.borrow_mut();
            let result = alloc
                .find_memory_type(requirements.memory_type_bits, properties)
                .and_then(|memory_type| {
                    alloc.allocate(requirements.size, requirements.alignment, memory_type)
                });
            match result {
                Ok(block) => block,
                Err(e) => {
                    unsafe { device.destroy_buffer(buffer, None) };
                    return Err(e);
                }
            }
        };

        unsafe {
            if let Err(e) = device.bind_buffer_memory(buffer, block.memory, block.offset) {
                device.destroy_buffer(buffer, None);
                allocator.borrow_mut().deallocate(&block);
                return Err(VulkanError::Api(e));
            }
        }

        Ok(Self { device, allocator, buffer, block })
    }

    /// Copy `data` into the buffer through its persistent mapping
    ///
    /// Fails when the backing memory type is not host-visible or the data
    /// does not fit in the allocated block.
    pub fn write_data<T: bytemuck::Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);

        let Some(map) = self.block.map else {
            return Err(VulkanError::InvalidOperation {
                reason: "buffer memory is not host-visible".to_string(),
            });
        };
        if bytes.len() as vk::DeviceSize > self.block.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "write of {} bytes exceeds buffer block of {} bytes",
                    bytes.len(),
                    self.block.size
                ),
            });
        }

        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), map, bytes.len());
        }
        Ok(())
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes of the backing block
    pub fn size(&self) -> vk::DeviceSize {
        self.block.size
    }

    /// The backing memory block
    pub fn block(&self) -> &MemoryBlock {
        &self.block
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
        self.allocator.borrow_mut().deallocate(&self.block);
    }
}
