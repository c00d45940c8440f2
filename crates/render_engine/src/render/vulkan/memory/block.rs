//! Sub-range of a device memory chunk

use ash::vk;

/// A contiguous byte range within one chunk's backing allocation
///
/// Blocks are owned by their chunk; the copies handed to callers are
/// tickets for binding resources and for the eventual
/// [`deallocate`](super::DeviceAllocator::deallocate). A block never
/// outlives its chunk, and a chunk's blocks always partition
/// `[0, total_size)` with no gaps or overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBlock {
    /// Backing device memory of the owning chunk
    pub memory: vk::DeviceMemory,
    /// Byte offset of this block within the chunk
    pub offset: vk::DeviceSize,
    /// Size of this block in bytes
    pub size: vk::DeviceSize,
    /// Host-visible mapping of this block, when the chunk's memory type is
    /// host-visible (offset already applied)
    pub map: Option<*mut u8>,
    pub(crate) free: bool,
}

impl MemoryBlock {
    /// Whether this block is currently unassigned
    pub fn is_free(&self) -> bool {
        self.free
    }
}
