//! Renderer configuration.
//!
//! Stored as JSON with a schema version field, like project files.

use lumaview_core::{LumaviewError, RenderState, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Texture memory kept idle by the cache: a few 1080p NV12 frames.
pub const DEFAULT_TEXTURE_CACHE_BUDGET: usize = 4 * 1920 * 1080 * 3 / 2;

/// Settings for [`VideoRenderer`](crate::renderer::VideoRenderer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Schema version for compatibility checks.
    pub version: u32,
    /// Directory holding `<shader_name>.vert.wgsl` and `<shader_name>.frag.wgsl`.
    /// The built-in shader is used when unset.
    pub shader_dir: Option<PathBuf>,
    pub shader_name: String,
    /// Wait for vertical blank when presenting.
    pub vsync: bool,
    /// Bytes of idle plane textures the cache may keep.
    pub texture_cache_budget: usize,
    pub initial_luma_threshold: f32,
    pub initial_chroma_threshold: f32,
    /// Keep full compiler diagnostics. Defaults to on in debug builds.
    pub capture_shader_logs: Option<bool>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            shader_dir: None,
            shader_name: "video".to_string(),
            vsync: true,
            texture_cache_budget: DEFAULT_TEXTURE_CACHE_BUDGET,
            initial_luma_threshold: 1.0,
            initial_chroma_threshold: 1.0,
            capture_shader_logs: None,
        }
    }
}

impl RendererConfig {
    /// Whether compile and link logs are captured in full.
    pub fn capture_logs(&self) -> bool {
        self.capture_shader_logs.unwrap_or(cfg!(debug_assertions))
    }

    /// Render state the renderer starts from.
    pub fn initial_state(&self) -> RenderState {
        RenderState {
            luma_threshold: self.initial_luma_threshold,
            chroma_threshold: self.initial_chroma_threshold,
            ..RenderState::default()
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.shader_name.is_empty() {
            return Err(LumaviewError::Config("shader_name is empty".to_string()));
        }
        for (name, value) in [
            ("initial_luma_threshold", self.initial_luma_threshold),
            ("initial_chroma_threshold", self.initial_chroma_threshold),
        ] {
            if !value.is_finite() {
                return Err(LumaviewError::Config(format!("{} must be finite", name)));
            }
        }
        Ok(())
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| LumaviewError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Deserialize from JSON bytes.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| LumaviewError::Serialization(format!("Invalid JSON: {}", e)))?;

        let version = raw
            .get("version")
            .and_then(|v| v.as_u64())
            .unwrap_or(CURRENT_VERSION as u64);
        if version != CURRENT_VERSION as u64 {
            return Err(LumaviewError::Config(format!(
                "Config version {} is not supported (expected {})",
                version, CURRENT_VERSION
            )));
        }

        let config: Self = serde_json::from_value(raw)
            .map_err(|e| LumaviewError::Serialization(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    /// Save config to a file path.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.shader_name, "video");
        assert!(config.shader_dir.is_none());
        assert_eq!(config.initial_state(), RenderState::default());
        assert_eq!(config.capture_logs(), cfg!(debug_assertions));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            RendererConfig::from_json(br#"{"vsync": false, "initial_luma_threshold": 0.5}"#)
                .unwrap();
        assert!(!config.vsync);
        assert_eq!(config.initial_state().luma_threshold, 0.5);
        assert_eq!(config.initial_state().chroma_threshold, 1.0);
        assert_eq!(config.version, CURRENT_VERSION);
    }

    #[test]
    fn test_json_round_trip() {
        let config = RendererConfig {
            shader_dir: Some(PathBuf::from("assets/shaders")),
            capture_shader_logs: Some(true),
            ..RendererConfig::default()
        };
        let back = RendererConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_rejects_other_versions() {
        let err = RendererConfig::from_json(br#"{"version": 7}"#).unwrap_err();
        assert!(matches!(err, LumaviewError::Config(_)));
    }

    #[test]
    fn test_rejects_empty_shader_name() {
        let err = RendererConfig::from_json(br#"{"shader_name": ""}"#).unwrap_err();
        assert!(matches!(err, LumaviewError::Config(_)));
        assert!(matches!(
            RendererConfig::from_json(b"not json"),
            Err(LumaviewError::Serialization(_))
        ));
    }
}
