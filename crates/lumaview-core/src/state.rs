//! Render parameters shared between the controller and the render thread.

use crate::color::ConversionStandard;
use crate::geometry::Size;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-renderer parameters read at the start of every present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderState {
    /// Rotation applied by the vertex stage, in radians
    pub rotation_angle: f32,
    /// Luma scale applied before conversion
    pub luma_threshold: f32,
    /// Chroma scale applied before conversion
    pub chroma_threshold: f32,
    /// Natural presentation size of the stream
    pub presentation_size: Size,
    /// Matrix chosen for the most recent frame
    pub conversion: ConversionStandard,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            rotation_angle: 0.0,
            luma_threshold: 1.0,
            chroma_threshold: 1.0,
            presentation_size: Size::ZERO,
            conversion: ConversionStandard::Hd,
        }
    }
}

/// Status reported by the playback collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackStatus {
    /// Nothing known yet
    Unknown,
    /// The item can be played; carries its natural presentation size
    ReadyToPlay { presentation_size: Size },
    /// The item failed and will not produce frames
    Failed(String),
}

/// Handle to a [`RenderState`] that controllers write and the renderer reads.
///
/// Writes are plain value stores; the renderer takes a snapshot at the start
/// of each present, so a write lands on the next frame.
#[derive(Debug, Clone, Default)]
pub struct SharedRenderState {
    inner: Arc<Mutex<RenderState>>,
}

impl SharedRenderState {
    /// Wrap an initial state.
    pub fn new(state: RenderState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the current values.
    pub fn snapshot(&self) -> RenderState {
        *self.inner.lock()
    }

    pub fn set_luma_threshold(&self, value: f32) {
        self.inner.lock().luma_threshold = value;
    }

    pub fn set_chroma_threshold(&self, value: f32) {
        self.inner.lock().chroma_threshold = value;
    }

    /// Rotation in radians, usually derived from the stream's transform.
    pub fn set_rotation_angle(&self, radians: f32) {
        self.inner.lock().rotation_angle = radians;
    }

    pub fn set_presentation_size(&self, size: Size) {
        self.inner.lock().presentation_size = size;
    }

    /// Record the matrix the presenter picked for the last frame.
    pub fn set_conversion(&self, conversion: ConversionStandard) {
        self.inner.lock().conversion = conversion;
    }
}
