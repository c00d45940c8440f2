//! # Render Engine
//!
//! The resource and synchronization core of a Vulkan renderer:
//!
//! - **Device memory sub-allocation**: driver allocations ("chunks") carved
//!   into reusable, alignment-respecting blocks with splitting on allocate
//!   and coalescing on free
//! - **Frame-in-flight protocol**: fence-paced acquire/record/submit/present
//!   across N frame slots, with transparent swapchain recreation
//! - **Event bus**: synchronous typed publish/subscribe so surface-derived
//!   resources (depth buffers, framebuffers, pipelines) can rebuild when the
//!   swapchain is recreated
//!
//! Scene graphs, materials, asset loading and render-pass sequencing live in
//! consumer crates; they back their buffers with [`render::vulkan::memory`]
//! and drive their drawing through [`render::vulkan::Renderer`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_engine::prelude::*;
//! # fn record_passes(_cmd: ash::vk::CommandBuffer) {}
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let (display, window): (raw_window_handle::RawDisplayHandle, raw_window_handle::RawWindowHandle) = todo!();
//! let config = RendererConfig::default();
//! let context = DeviceContext::new(display, window, &config)?;
//! let mut renderer = Renderer::new(&context, (1280, 720), &config)?;
//!
//! loop {
//!     if !renderer.begin_frame(&context)? {
//!         continue; // surface was rebuilt, skip this iteration
//!     }
//!     record_passes(renderer.active_command_buffer());
//!     renderer.end_frame(&context)?;
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;
pub mod events;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{ConfigError, RendererConfig},
        events::{EngineEvent, EventBus, ListenerKey},
        render::vulkan::{
            memory::{DeviceAllocator, MemoryBlock, SharedAllocator},
            Buffer, DeviceContext, Renderer, VulkanError, VulkanResult,
        },
    };
}
