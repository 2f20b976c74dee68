//! Renderer error taxonomy.

use lumaview_core::{LumaviewError, Plane};
use std::fmt;
use thiserror::Error;

/// Shader pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => f.write_str("vertex"),
            Self::Fragment => f.write_str("fragment"),
        }
    }
}

/// Errors raised while setting up or driving the render pipeline.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The render target could not be made complete.
    #[error("Surface setup failed: {0}")]
    Setup(String),

    #[error("Failed to compile {stage} shader: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("Failed to link shader program: {log}")]
    ShaderLink { log: String },

    #[error("Failed to create {plane} texture: {reason}")]
    TextureUpload { plane: Plane, reason: String },

    #[error("No video texture cache")]
    MissingCache,

    /// The presenter was driven before `configure`/`build_program` succeeded.
    #[error("Render pipeline is not configured")]
    NotConfigured,

    /// The swap chain could not hand out a drawable for this frame.
    #[error("Surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("Shader asset error: {0}")]
    Asset(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error(transparent)]
    Core(#[from] LumaviewError),
}

impl RenderError {
    /// Per-frame failures that only cost the current frame.
    pub fn is_frame_skip(&self) -> bool {
        matches!(
            self,
            Self::TextureUpload { .. } | Self::MissingCache | Self::SurfaceUnavailable(_)
        )
    }
}

/// Result type alias for renderer operations.
pub type Result<T> = std::result::Result<T, RenderError>;
