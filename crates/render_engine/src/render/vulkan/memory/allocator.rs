//! Chunk-pooling device memory allocator

use ash::{vk, Device};
use super::{MemoryBlock, MemoryChunk};
use crate::render::vulkan::context::DeviceContext;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Size in bytes of a freshly created chunk, unless the request is larger
pub const DEFAULT_CHUNK_SIZE: vk::DeviceSize = 4096;

/// Sub-allocator over driver memory chunks
///
/// Serves every device memory request of the backend. Chunks are created
/// lazily per memory-type index the first time no existing chunk can
/// satisfy a request, and live until the allocator is dropped. The
/// allocator is the sole owner of chunk and block state; nothing else may
/// free device memory.
///
/// Not thread-safe: callers must serialize access, matching the single CPU
/// thread that drives recording and submission.
pub struct DeviceAllocator {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    chunks: Vec<MemoryChunk>,
    chunk_size: vk::DeviceSize,
}

impl DeviceAllocator {
    /// Create an allocator attached to `context`'s device
    pub fn new(context: &DeviceContext) -> Self {
        Self::with_chunk_size(context, DEFAULT_CHUNK_SIZE)
    }

    /// Create an allocator with a custom default chunk size
    pub fn with_chunk_size(context: &DeviceContext, chunk_size: vk::DeviceSize) -> Self {
        Self {
            device: context.raw_device(),
            memory_properties: context.memory_properties(),
            chunks: Vec::new(),
            chunk_size,
        }
    }

    /// Allocate a block of `size` bytes aligned to `alignment` from memory
    /// type `memory_type_index`
    ///
    /// Existing chunks of that type are tried in creation order; on miss a
    /// new chunk of `max(default_chunk_size, size + alignment)` is created,
    /// from which the allocation always succeeds. Fails only when the
    /// driver rejects the chunk allocation (true out-of-memory).
    pub fn allocate(
        &mut self,
        size: vk::DeviceSize,
        alignment: vk::DeviceSize,
        memory_type_index: u32,
    ) -> VulkanResult<MemoryBlock> {
        for chunk in &mut self.chunks {
            if chunk.memory_type_index() != memory_type_index {
                continue;
            }
            if let Some(block) = chunk.allocate(size, alignment) {
                return Ok(block);
            }
        }

        let chunk = MemoryChunk::new(
            &self.device,
            &self.memory_properties,
            chunk_size_for(self.chunk_size, size, alignment),
            memory_type_index,
        )?;
        self.chunks.push(chunk);

        match self.chunks.last_mut().and_then(|c| c.allocate(size, alignment)) {
            Some(block) => Ok(block),
            None => {
                // The fresh chunk is sized to fit; reaching this means the
                // sizing rule was violated.
                log::error!("Device allocator: could not allocate a memory block");
                Err(VulkanError::OutOfMemory { requested: size })
            }
        }
    }

    /// Return `block` to its owning chunk
    ///
    /// # Panics
    ///
    /// Panics when no tracked chunk owns `block`, or when the owning chunk
    /// has no live block matching it (double free). Both indicate memory
    /// corruption and must not be silently ignored.
    pub fn deallocate(&mut self, block: &MemoryBlock) {
        for chunk in &mut self.chunks {
            if !chunk.owns(block) {
                continue;
            }
            if chunk.deallocate(block) {
                return;
            }
            log::error!(
                "Device allocator: double free of block at offset {} ({} bytes)",
                block.offset,
                block.size
            );
            panic!("device allocator: double free");
        }
        log::error!(
            "Device allocator: unable to free a block; could not find its chunk"
        );
        panic!("device allocator: block owned by no tracked chunk");
    }

    /// Find a memory type index matching `type_filter` with all of
    /// `properties` set
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<u32> {
        for i in 0..self.memory_properties.memory_type_count {
            let supported = type_filter & (1 << i) != 0;
            let has_properties = self.memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties);
            if supported && has_properties {
                return Ok(i);
            }
        }
        Err(VulkanError::NoSuitableMemoryType)
    }

    /// Number of chunks currently held
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl Drop for DeviceAllocator {
    fn drop(&mut self) {
        for chunk in &mut self.chunks {
            chunk.destroy(&self.device);
        }
        log::debug!("Device allocator: destroyed {} chunk(s)", self.chunks.len());
        self.chunks.clear();
    }
}

/// Sizing rule for a fresh chunk: the default size, or `size + alignment`
/// when the request is larger, so the in-chunk allocation cannot fail on
/// padding
fn chunk_size_for(
    default: vk::DeviceSize,
    size: vk::DeviceSize,
    alignment: vk::DeviceSize,
) -> vk::DeviceSize {
    default.max(size + alignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_requests_use_default_chunk_size() {
        assert_eq!(chunk_size_for(DEFAULT_CHUNK_SIZE, 256, 16), 4096);
        assert_eq!(chunk_size_for(DEFAULT_CHUNK_SIZE, 4080, 16), 4096);
    }

    #[test]
    fn test_oversized_request_gets_dedicated_chunk() {
        // Larger than any existing chunk's free run: the new chunk must be
        // at least size + alignment so alignment padding cannot starve it.
        assert_eq!(chunk_size_for(DEFAULT_CHUNK_SIZE, 4096, 16), 4112);
        assert_eq!(chunk_size_for(DEFAULT_CHUNK_SIZE, 1 << 20, 256), (1 << 20) + 256);
    }

    #[test]
    fn test_oversized_chunk_always_fits_its_request() {
        for (size, alignment) in [(4096, 16), (5000, 64), (1 << 20, 4096)] {
            let mut chunk = MemoryChunk::from_parts(
                vk::DeviceMemory::null(),
                chunk_size_for(DEFAULT_CHUNK_SIZE, size, alignment),
                0,
                None,
            );
            assert!(chunk.allocate(size, alignment).is_some());
        }
    }
}
