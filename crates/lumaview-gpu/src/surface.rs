//! Render target ownership and sizing.

use crate::backend::{Drawable, RenderBackend, RenderTarget};
use crate::error::{RenderError, Result};
use lumaview_core::{PixelSize, Size};
use tracing::{debug, info};

/// Owns the render target a drawable is presented through.
///
/// The target always reflects the size the backend actually allocated,
/// which may differ from the drawable's request.
#[derive(Debug, Default)]
pub struct SurfaceManager {
    target: Option<RenderTarget>,
    bounds: Size,
}

impl SurfaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a render target for `drawable`, releasing any previous one.
    ///
    /// Fails with [`RenderError::Setup`] when the drawable has no pixels or
    /// the backend cannot make the target complete; in both cases nothing
    /// stays allocated.
    pub fn configure<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        drawable: &dyn Drawable,
    ) -> Result<()> {
        self.teardown(backend);

        let requested = drawable.backing_size();
        if requested.is_empty() {
            return Err(RenderError::Setup(format!(
                "drawable has no backing pixels ({}x{})",
                requested.width, requested.height
            )));
        }

        let target = backend.create_render_target(requested)?;
        if !target.complete {
            backend.release_render_target(target.id);
            return Err(RenderError::Setup(format!(
                "render target {}x{} is incomplete",
                target.size.width, target.size.height
            )));
        }

        if target.size != requested {
            debug!(
                "Backend adjusted target from {}x{} to {}x{}",
                requested.width, requested.height, target.size.width, target.size.height
            );
        }
        info!(
            "Configured render target {}x{}",
            target.size.width, target.size.height
        );

        self.target = Some(target);
        self.bounds = drawable.bounds();
        Ok(())
    }

    /// Release the render target. Safe to call repeatedly.
    pub fn teardown<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(target) = self.target.take() {
            backend.release_render_target(target.id);
            debug!("Released render target {:?}", target.id);
        }
    }

    /// The current target, or [`RenderError::NotConfigured`].
    pub fn target(&self) -> Result<&RenderTarget> {
        self.target.as_ref().ok_or(RenderError::NotConfigured)
    }

    pub fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    /// Backing size as actually allocated.
    pub fn backing_size(&self) -> Option<PixelSize> {
        self.target.map(|t| t.size)
    }

    /// Bounds of the drawable at the last configure.
    pub fn bounds(&self) -> Size {
        self.bounds
    }
}
