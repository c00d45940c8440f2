//! Renderer configuration
//!
//! Strongly typed configuration for the render core, loadable from TOML.
//! Everything has a sensible default so applications can start from
//! `RendererConfig::default()` and override selectively.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading or saving configuration files
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File contents were not valid TOML for this structure
    #[error("config parse error: {0}")]
    Parse(String),

    /// Structure could not be serialized
    #[error("config serialize error: {0}")]
    Serialize(String),
}

/// Configuration for the renderer core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan driver
    pub app_name: String,
    /// Number of frame slots processed concurrently (frames in flight)
    pub max_frames_in_flight: usize,
    /// Size in bytes of each device memory chunk requested from the driver.
    /// Requests larger than this get a dedicated, larger chunk.
    pub default_chunk_size: u64,
    /// Prefer FIFO presentation (vsync) over MAILBOX when both are available
    pub vsync: bool,
    /// Enable validation layers in debug builds
    pub enable_validation: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "render_engine".to_string(),
            max_frames_in_flight: 3,
            default_chunk_size: 4096,
            vsync: false,
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl RendererConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.max_frames_in_flight, 3);
        assert_eq!(config.default_chunk_size, 4096);
        assert!(!config.vsync);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RendererConfig = toml::from_str("max_frames_in_flight = 2").unwrap();
        assert_eq!(config.max_frames_in_flight, 2);
        assert_eq!(config.default_chunk_size, 4096);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = RendererConfig::default();
        config.app_name = "teapot".to_string();
        config.default_chunk_size = 1 << 20;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: RendererConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.app_name, "teapot");
        assert_eq!(parsed.default_chunk_size, 1 << 20);
    }
}
