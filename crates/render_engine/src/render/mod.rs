//! Rendering subsystem
//!
//! The Vulkan backend lives in [`vulkan`]; higher-level rendering concepts
//! (meshes, materials, passes) belong to consumer crates.

pub mod vulkan;

pub use vulkan::{Buffer, DeviceContext, Renderer, VulkanError, VulkanResult};
