//! One driver allocation, partitioned into blocks

use ash::{vk, Device};
use super::MemoryBlock;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// One `vkAllocateMemory` allocation for a fixed memory-type index
///
/// The chunk's blocks are kept in strictly ascending offset order and always
/// form a gap-free partition of `[0, total_size)`. Chunks are created lazily
/// by the allocator and live until the allocator is torn down; they are
/// never shrunk or freed individually.
///
/// Host-visible chunks are persistently mapped at creation; blocks carved
/// from them carry the mapping pointer adjusted to their offset.
pub struct MemoryChunk {
    memory: vk::DeviceMemory,
    total_size: vk::DeviceSize,
    memory_type_index: u32,
    map_base: Option<*mut u8>,
    blocks: Vec<MemoryBlock>,
}

impl MemoryChunk {
    /// Allocate a new chunk from the driver
    ///
    /// Maps the full range persistently when the memory type is
    /// host-visible. Driver rejection is true out-of-memory and is reported
    /// as such.
    pub(crate) fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> VulkanResult<Self> {
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { device.allocate_memory(&alloc_info, None) }.map_err(|e| {
            log::error!(
                "Memory chunk: driver rejected a {} byte allocation for memory type {}: {:?}",
                size,
                memory_type_index,
                e
            );
            match e {
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                    VulkanError::OutOfMemory { requested: size }
                }
                other => VulkanError::Api(other),
            }
        })?;

        let host_visible = memory_properties.memory_types[memory_type_index as usize]
            .property_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE);

        let map_base = if host_visible {
            let ptr = unsafe {
                device.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                    .map_err(VulkanError::Api)?
            };
            Some(ptr.cast::<u8>())
        } else {
            None
        };

        log::debug!(
            "Memory chunk: created {} bytes for memory type {} (host visible: {})",
            size,
            memory_type_index,
            host_visible
        );

        Ok(Self::from_parts(memory, size, memory_type_index, map_base))
    }

    /// Build a chunk over an existing allocation, starting as one free block
    pub(crate) fn from_parts(
        memory: vk::DeviceMemory,
        total_size: vk::DeviceSize,
        memory_type_index: u32,
        map_base: Option<*mut u8>,
    ) -> Self {
        let blocks = vec![MemoryBlock {
            memory,
            offset: 0,
            size: total_size,
            map: None,
            free: true,
        }];
        Self { memory, total_size, memory_type_index, map_base, blocks }
    }

    /// First-fit allocation with alignment padding
    ///
    /// Walks blocks in offset order and commits to the first free block that
    /// can hold `size` bytes at an aligned offset. Padding before the
    /// aligned offset is kept in the list as its own small free block, so
    /// the partition invariant holds exactly; leftover space after the
    /// allocation is split off the same way. Returns `None` when no free
    /// block fits.
    pub(crate) fn allocate(
        &mut self,
        size: vk::DeviceSize,
        alignment: vk::DeviceSize,
    ) -> Option<MemoryBlock> {
        debug_assert!(size > 0 && alignment > 0);

        let mut i = 0;
        while i < self.blocks.len() {
            let block = self.blocks[i];
            if !block.free {
                i += 1;
                continue;
            }

            let pad = if block.offset % alignment == 0 {
                0
            } else {
                alignment - block.offset % alignment
            };
            if pad + size > block.size {
                i += 1;
                continue;
            }

            if pad > 0 {
                // The misaligned head stays free; the tail becomes the
                // allocation candidate.
                let tail = MemoryBlock {
                    memory: self.memory,
                    offset: block.offset + pad,
                    size: block.size - pad,
                    map: None,
                    free: true,
                };
                self.blocks[i].size = pad;
                self.blocks.insert(i + 1, tail);
                i += 1;
            }

            let aligned_offset = self.blocks[i].offset;
            // Mapping covers the whole chunk; the offset stays in range by
            // the partition invariant.
            let map = self
                .map_base
                .map(|base| unsafe { base.add(aligned_offset as usize) });

            let leftover = self.blocks[i].size - size;
            self.blocks[i].size = size;
            self.blocks[i].free = false;
            self.blocks[i].map = map;

            if leftover > 0 {
                let remainder = MemoryBlock {
                    memory: self.memory,
                    offset: self.blocks[i].offset + size,
                    size: leftover,
                    map: None,
                    free: true,
                };
                self.blocks.insert(i + 1, remainder);
            }

            return Some(self.blocks[i]);
        }
        None
    }

    /// Return a block to the chunk and coalesce adjacent free blocks
    ///
    /// Returns `false` when no live block matches `block` (wrong chunk, or
    /// the block was already freed). Merging repeats until a full pass over
    /// the list produces no merge, which bounds fragmentation to the
    /// pattern of outstanding allocations.
    pub(crate) fn deallocate(&mut self, block: &MemoryBlock) -> bool {
        let Some(idx) = self
            .blocks
            .iter()
            .position(|b| !b.free && b.offset == block.offset && b.size == block.size)
        else {
            return false;
        };

        self.blocks[idx].free = true;
        self.blocks[idx].map = None;

        loop {
            let mut merged = false;
            let mut i = 0;
            while i + 1 < self.blocks.len() {
                if self.blocks[i].free && self.blocks[i + 1].free {
                    debug_assert_eq!(
                        self.blocks[i + 1].offset,
                        self.blocks[i].offset + self.blocks[i].size
                    );
                    self.blocks[i].size += self.blocks[i + 1].size;
                    self.blocks.remove(i + 1);
                    merged = true;
                } else {
                    i += 1;
                }
            }
            if !merged {
                break;
            }
        }
        true
    }

    /// Whether `block` was carved from this chunk
    pub(crate) fn owns(&self, block: &MemoryBlock) -> bool {
        block.memory == self.memory
    }

    /// Release the driver allocation; called by the allocator on teardown
    pub(crate) fn destroy(&mut self, device: &Device) {
        let live = self.blocks.iter().filter(|b| !b.free).count();
        if live > 0 {
            log::warn!(
                "Memory chunk: destroying with {} block(s) still allocated",
                live
            );
        }
        unsafe {
            // vkFreeMemory implicitly unmaps.
            device.free_memory(self.memory, None);
        }
        self.blocks.clear();
        self.memory = vk::DeviceMemory::null();
    }

    /// Memory type index this chunk was allocated for
    pub(crate) fn memory_type_index(&self) -> u32 {
        self.memory_type_index
    }

    /// Full extent of the backing allocation in bytes
    pub fn total_size(&self) -> vk::DeviceSize {
        self.total_size
    }

    #[cfg(test)]
    pub(crate) fn blocks(&self) -> &[MemoryBlock] {
        &self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(size: vk::DeviceSize) -> MemoryChunk {
        MemoryChunk::from_parts(vk::DeviceMemory::null(), size, 0, None)
    }

    /// Blocks must partition [0, total_size) in ascending order with no
    /// gaps or overlaps.
    fn assert_partition(chunk: &MemoryChunk) {
        let mut expected_offset = 0;
        for block in chunk.blocks() {
            assert_eq!(block.offset, expected_offset, "gap or overlap in block list");
            expected_offset += block.size;
        }
        assert_eq!(expected_offset, chunk.total_size());
    }

    #[test]
    fn test_concrete_allocation_trace() {
        // 4096-byte chunk: Allocate(256, 16) lands at offset 0 and leaves a
        // 3840-byte free remainder; freeing it restores one 4096-byte block.
        let mut chunk = chunk(4096);

        let block = chunk.allocate(256, 16).unwrap();
        assert_eq!(block.offset, 0);
        assert_eq!(block.size, 256);
        assert_eq!(chunk.blocks().len(), 2);
        assert_eq!(chunk.blocks()[1].offset, 256);
        assert_eq!(chunk.blocks()[1].size, 3840);
        assert!(chunk.blocks()[1].free);
        assert_partition(&chunk);

        assert!(chunk.deallocate(&block));
        assert_eq!(chunk.blocks().len(), 1);
        assert_eq!(chunk.blocks()[0].size, 4096);
        assert!(chunk.blocks()[0].free);
        assert_partition(&chunk);
    }

    #[test]
    fn test_alignment_invariant() {
        let mut chunk = chunk(4096);
        // Misalign the free space with a 10-byte allocation first.
        let first = chunk.allocate(10, 1).unwrap();
        assert_eq!(first.offset, 0);

        for alignment in [2, 16, 64, 256] {
            let block = chunk.allocate(32, alignment).unwrap();
            assert_eq!(block.offset % alignment, 0);
            assert_partition(&chunk);
        }
    }

    #[test]
    fn test_padding_slack_tracked_as_free_block() {
        let mut chunk = chunk(4096);
        let first = chunk.allocate(10, 1).unwrap();
        let second = chunk.allocate(100, 64).unwrap();

        // 10..64 is alignment slack and must survive as a free block.
        assert_eq!(second.offset, 64);
        let slack = chunk.blocks()[1];
        assert!(slack.free);
        assert_eq!(slack.offset, 10);
        assert_eq!(slack.size, 54);
        assert_partition(&chunk);

        // Freeing both coalesces slack, blocks and remainder back into one.
        assert!(chunk.deallocate(&first));
        assert!(chunk.deallocate(&second));
        assert_eq!(chunk.blocks().len(), 1);
        assert_partition(&chunk);
    }

    #[test]
    fn test_non_overlap_under_churn() {
        let mut chunk = chunk(4096);
        let a = chunk.allocate(100, 4).unwrap();
        let b = chunk.allocate(200, 32).unwrap();
        let c = chunk.allocate(50, 8).unwrap();
        assert_partition(&chunk);

        assert!(chunk.deallocate(&b));
        assert_partition(&chunk);

        // The hole left by b is reused first-fit.
        let d = chunk.allocate(150, 32).unwrap();
        assert_eq!(d.offset, b.offset);
        assert_partition(&chunk);

        for block in [a, c, d] {
            assert!(chunk.deallocate(&block));
        }
        assert_eq!(chunk.blocks().len(), 1);
        assert_partition(&chunk);
    }

    #[test]
    fn test_reuse_restores_initial_state() {
        let mut chunk = chunk(4096);
        let first = chunk.allocate(512, 16).unwrap();
        assert!(chunk.deallocate(&first));

        let second = chunk.allocate(512, 16).unwrap();
        assert_eq!(second.offset, first.offset);

        assert!(chunk.deallocate(&second));
        assert_eq!(chunk.blocks().len(), 1);
        assert!(chunk.blocks()[0].free);
        assert_eq!(chunk.blocks()[0].size, 4096);
    }

    #[test]
    fn test_allocation_failure_when_no_fit() {
        let mut chunk = chunk(4096);
        let _a = chunk.allocate(4000, 1).unwrap();
        // 96 bytes remain; neither a large block nor an aligned 96-byte
        // request at offset 4000 with 4096 alignment can fit.
        assert!(chunk.allocate(200, 1).is_none());
        assert!(chunk.allocate(96, 4096).is_none());
        assert!(chunk.allocate(96, 1).is_some());
    }

    #[test]
    fn test_deallocate_foreign_block_rejected() {
        let mut chunk = chunk(4096);
        let block = chunk.allocate(64, 1).unwrap();

        let mut forged = block;
        forged.offset += 1;
        assert!(!chunk.deallocate(&forged));

        // Double free is also rejected.
        assert!(chunk.deallocate(&block));
        assert!(!chunk.deallocate(&block));
    }

    #[test]
    fn test_coalescing_merges_across_multiple_neighbors() {
        let mut chunk = chunk(4096);
        let a = chunk.allocate(100, 1).unwrap();
        let b = chunk.allocate(100, 1).unwrap();
        let c = chunk.allocate(100, 1).unwrap();

        // Free outer blocks first so the final free creates a three-way
        // merge with the trailing remainder.
        assert!(chunk.deallocate(&a));
        assert!(chunk.deallocate(&c));
        assert!(chunk.deallocate(&b));
        assert_eq!(chunk.blocks().len(), 1);
        assert_eq!(chunk.blocks()[0].size, 4096);
    }
}
