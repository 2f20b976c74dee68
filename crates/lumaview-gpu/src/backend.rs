//! The seam between the render pipeline and the graphics API.
//!
//! Everything above this trait (surface management, program build, frame
//! presentation) is API-agnostic and drives a [`RenderBackend`] through
//! opaque handles. [`WgpuBackend`](crate::wgpu_backend::WgpuBackend) talks
//! to the GPU; [`HeadlessBackend`](crate::headless::HeadlessBackend) records
//! commands for tests.

use crate::error::Result;
use crate::shader::LinkedProgram;
use crate::uniforms::PackedBlock;
use lumaview_core::{Color, PixelSize, Plane, QuadGeometry, Size, VideoFrame};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);
    };
}

handle!(
    /// A render target allocated by a backend.
    RenderTargetId
);
handle!(
    /// A linked program installed in a backend.
    ProgramId
);
handle!(
    /// A plane texture created from a frame.
    TextureId
);
handle!(
    /// A texture cache owned by a backend.
    CacheId
);

/// Monotonic handle allocator shared by the backends.
#[derive(Debug, Default)]
pub(crate) struct HandleAllocator {
    next: u64,
}

impl HandleAllocator {
    pub(crate) fn next(&mut self) -> u64 {
        self.next += 1;
        self.next
    }
}

/// A render target as actually allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub id: RenderTargetId,
    /// Backing size in pixels; may differ from what was requested
    pub size: PixelSize,
    /// Whether the target can be drawn into
    pub complete: bool,
}

/// Luma and chroma textures for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexturePair {
    pub luma: TextureId,
    pub chroma: TextureId,
}

impl TexturePair {
    pub fn get(&self, plane: Plane) -> TextureId {
        match plane {
            Plane::Luma => self.luma,
            Plane::Chroma => self.chroma,
        }
    }
}

/// Texture unit assignment for one plane, resolved against a program's
/// texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerUnit {
    pub plane: Plane,
    pub unit: u32,
    pub binding: u32,
}

/// Something the renderer can draw into: a window, a layer, an offscreen view.
pub trait Drawable {
    /// Current backing size in physical pixels.
    fn backing_size(&self) -> PixelSize;

    /// Bounds used for aspect fitting. Defaults to the backing size.
    fn bounds(&self) -> Size {
        self.backing_size().into()
    }
}

impl Drawable for PixelSize {
    fn backing_size(&self) -> PixelSize {
        *self
    }
}

/// Commands the render pipeline needs from a graphics API.
///
/// Creation calls return errors from the [`RenderError`](crate::RenderError)
/// taxonomy; release calls never fail and ignore unknown handles.
pub trait RenderBackend {
    /// Allocate a render target for a drawable of `requested` pixels.
    fn create_render_target(&mut self, requested: PixelSize) -> Result<RenderTarget>;

    fn release_render_target(&mut self, target: RenderTargetId);

    /// Install a linked program.
    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramId>;

    fn delete_program(&mut self, program: ProgramId);

    /// Bind each plane's sampler to its texture unit. Called once per program.
    fn set_sampler_units(&mut self, program: ProgramId, units: &[SamplerUnit; 2]);

    fn create_texture_cache(&mut self, budget: usize) -> Result<CacheId>;

    fn destroy_texture_cache(&mut self, cache: CacheId);

    /// Recycle every texture released since the last flush.
    ///
    /// Fails with `MissingCache` when the cache no longer exists.
    fn flush_texture_cache(&mut self, cache: CacheId) -> Result<()>;

    /// Create a texture for one plane of `frame` through `cache`.
    fn create_plane_texture(
        &mut self,
        cache: CacheId,
        frame: &VideoFrame,
        plane: Plane,
    ) -> Result<TextureId>;

    fn release_plane_texture(&mut self, texture: TextureId);

    /// Make `target` current, set the viewport to its full size and clear it.
    fn bind_render_target(&mut self, target: RenderTargetId, clear: Color) -> Result<()>;

    /// Upload packed uniform blocks for `program`.
    fn set_uniforms(&mut self, program: ProgramId, blocks: &[PackedBlock]);

    /// Draw the four-vertex strip sampling `textures`.
    fn draw_quad(
        &mut self,
        program: ProgramId,
        geometry: &QuadGeometry,
        textures: &TexturePair,
    ) -> Result<()>;

    /// Hand the target's color buffer to the display.
    fn present(&mut self, target: RenderTargetId) -> Result<()>;
}
