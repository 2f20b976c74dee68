//! Lumaview Core - Foundation types for the video renderer
//!
//! This crate provides the GPU-free types shared by the renderer:
//! - Bi-planar YUV 4:2:0 frames and their YUV matrix tags
//! - The two YUV-to-RGB conversion matrices
//! - Letterbox geometry (aspect-fit, normalized quad, texture coordinates)
//! - Controller-facing render state and playback signals
//! - The inbound frame source interface

pub mod color;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod source;
pub mod state;

pub use color::{convert_pixel, Color, ColorConversionMatrix, ConversionStandard, CONVERSION_MATRICES};
pub use error::{LumaviewError, Result};
pub use frame::{FrameId, FramePlane, Plane, VideoFrame, YuvMatrix};
pub use geometry::{aspect_fit, NormalizedQuad, PixelSize, QuadGeometry, Rect, Size, Vec2, FLIPPED_TEX_COORDS};
pub use source::{ChannelFrameSource, FrameSource};
pub use state::{PlaybackStatus, RenderState, SharedRenderState};
