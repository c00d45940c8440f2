//! Device memory sub-allocation
//!
//! Real driver allocations are expensive and limited in count, so the
//! backend requests fixed-size chunks ([`MemoryChunk`]) and carves them into
//! blocks ([`MemoryBlock`]) on demand: first-fit with alignment padding,
//! split on allocate, coalesce on free. [`DeviceAllocator`] owns every chunk
//! and is the sole mutator of block state; it is single-writer and must be
//! externally serialized if shared across threads.

use std::cell::RefCell;
use std::rc::Rc;

pub mod allocator;
pub mod block;
pub mod chunk;

pub use allocator::{DeviceAllocator, DEFAULT_CHUNK_SIZE};
pub use block::MemoryBlock;
pub use chunk::MemoryChunk;

/// Shared handle to the device allocator
///
/// Buffers and images deallocate their backing block on drop, so they keep
/// the allocator alive through this handle. `Rc<RefCell>` matches the
/// single-threaded submission model; it is not a concurrency primitive.
pub type SharedAllocator = Rc<RefCell<DeviceAllocator>>;
