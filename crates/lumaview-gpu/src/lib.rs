//! Lumaview GPU - shader pipeline and frame presentation
//!
//! Renders bi-planar YUV frames through a WGSL program: surface and program
//! lifecycle, the per-frame draw protocol, and the tick driver that paces it.
//! Uses wgpu for the GPU and a recording backend for tests.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod headless;
pub mod presenter;
pub mod program;
pub mod renderer;
pub mod shader;
pub mod surface;
pub mod texture;
pub mod texture_cache;
pub mod uniforms;
pub mod wgpu_backend;

pub use backend::{Drawable, RenderBackend, RenderTarget, TexturePair};
pub use config::RendererConfig;
pub use context::GpuContext;
pub use error::{RenderError, Result, ShaderStage};
pub use headless::{BackendCommand, HeadlessBackend};
pub use presenter::{FramePresenter, PresentReport, PresentResult};
pub use program::ShaderProgram;
pub use renderer::{NewDataSignal, RenderStats, TickOutcome, VideoRenderer};
pub use shader::ShaderAssets;
pub use surface::SurfaceManager;
pub use texture::GpuTexture;
pub use uniforms::{Uniform, UniformLocation, UniformValues};
pub use wgpu_backend::WgpuBackend;
