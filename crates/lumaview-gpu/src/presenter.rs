//! Per-frame draw protocol.
//!
//! One call to [`FramePresenter::present`] takes a decoded frame from
//! texture upload to the display:
//!
//! 1. release last frame's textures and flush the texture cache
//! 2. pick the conversion matrix from the frame's YUV tag
//! 3. upload luma (unit 0) and chroma (unit 1)
//! 4. bind and clear the render target
//! 5. push thresholds, rotation and the matrix
//! 6. letterbox the quad into the surface bounds
//! 7. flip texture coordinates vertically
//! 8. draw the strip and present
//!
//! A failure before step 4 returns without touching the target, so the
//! previous image stays on screen.

use crate::backend::{CacheId, RenderBackend, TexturePair};
use crate::error::{RenderError, Result};
use crate::program::ShaderProgram;
use crate::surface::SurfaceManager;
use crate::uniforms::UniformValues;
use lumaview_core::{
    Color, ConversionStandard, FrameId, NormalizedQuad, Plane, QuadGeometry, RenderState, Size,
    VideoFrame,
};
use tracing::{debug, trace};

/// What a successful present drew.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentReport {
    pub frame: FrameId,
    pub conversion: ConversionStandard,
    pub quad: NormalizedQuad,
}

/// Outcome of [`FramePresenter::present`].
pub type PresentResult = Result<PresentReport>;

/// Letterbox geometry for one (aspect, bounds) pair.
#[derive(Debug, Clone, Copy)]
struct LetterboxCache {
    aspect: Size,
    bounds: Size,
    quad: NormalizedQuad,
    geometry: QuadGeometry,
}

/// Uploads frames and draws them through a [`ShaderProgram`].
#[derive(Debug)]
pub struct FramePresenter {
    cache: Option<CacheId>,
    textures: Option<TexturePair>,
    letterbox: Option<LetterboxCache>,
    clear_color: Color,
}

impl Default for FramePresenter {
    fn default() -> Self {
        Self {
            cache: None,
            textures: None,
            letterbox: None,
            clear_color: Color::BLACK,
        }
    }
}

impl FramePresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the texture cache frames are uploaded through.
    pub fn create_texture_cache<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        budget: usize,
    ) -> Result<()> {
        self.destroy_texture_cache(backend);
        self.cache = Some(backend.create_texture_cache(budget)?);
        Ok(())
    }

    pub fn has_texture_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Release the live textures and the cache behind them.
    pub fn destroy_texture_cache<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        self.release_textures(backend);
        if let Some(cache) = self.cache.take() {
            backend.destroy_texture_cache(cache);
        }
    }

    /// Textures of the frame currently on screen.
    pub fn live_textures(&self) -> Option<TexturePair> {
        self.textures
    }

    /// Forget the cached letterbox geometry.
    pub fn invalidate_letterbox(&mut self) {
        self.letterbox = None;
    }

    fn release_textures<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(pair) = self.textures.take() {
            backend.release_plane_texture(pair.luma);
            backend.release_plane_texture(pair.chroma);
        }
    }

    fn geometry(&mut self, aspect: Size, bounds: Size) -> (NormalizedQuad, QuadGeometry) {
        match self.letterbox {
            Some(cached) if cached.aspect == aspect && cached.bounds == bounds => {
                (cached.quad, cached.geometry)
            }
            _ => {
                let quad = NormalizedQuad::letterbox(aspect, bounds);
                let geometry = QuadGeometry::new(quad);
                debug!(
                    "Letterbox {}x{} in {}x{}: quad {:.4}x{:.4}",
                    aspect.width, aspect.height, bounds.width, bounds.height, quad.width, quad.height
                );
                self.letterbox = Some(LetterboxCache {
                    aspect,
                    bounds,
                    quad,
                    geometry,
                });
                (quad, geometry)
            }
        }
    }

    /// Draw `frame` and present it.
    ///
    /// `state` supplies thresholds, rotation and the presentation size; its
    /// `conversion` is overwritten with the matrix chosen for this frame.
    pub fn present<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        surface: &SurfaceManager,
        program: &ShaderProgram,
        frame: &VideoFrame,
        state: &mut RenderState,
    ) -> PresentResult {
        let target = *surface.target()?;

        // 1. Texture cache maintenance
        let cache = self.cache.ok_or(RenderError::MissingCache)?;
        self.release_textures(backend);
        backend.flush_texture_cache(cache)?;

        // 2. Matrix selection
        let conversion = ConversionStandard::for_matrix(frame.matrix);
        state.conversion = conversion;

        // 3. Texture upload
        let luma = backend.create_plane_texture(cache, frame, Plane::Luma)?;
        let chroma = match backend.create_plane_texture(cache, frame, Plane::Chroma) {
            Ok(chroma) => chroma,
            Err(e) => {
                backend.release_plane_texture(luma);
                return Err(e);
            }
        };
        let pair = TexturePair { luma, chroma };
        self.textures = Some(pair);

        // 4. Bind + clear
        backend.bind_render_target(target.id, self.clear_color)?;

        // 5. Uniforms
        program.push(backend, &UniformValues::from_state(state));

        // 6-7. Letterboxed quad with flipped texture coordinates
        let (quad, geometry) = self.geometry(state.presentation_size, surface.bounds());

        // 8. Draw + present
        backend.draw_quad(program.id(), &geometry, &pair)?;
        backend.present(target.id)?;

        trace!("Presented frame {:?} ({:?})", frame.id, conversion);
        Ok(PresentReport {
            frame: frame.id,
            conversion,
            quad,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{BackendCommand, HeadlessBackend};
    use crate::shader::ShaderAssets;
    use lumaview_core::{PixelSize, YuvMatrix};

    struct Rig {
        backend: HeadlessBackend,
        surface: SurfaceManager,
        program: ShaderProgram,
        presenter: FramePresenter,
    }

    fn rig() -> Rig {
        let mut backend = HeadlessBackend::new();
        let mut surface = SurfaceManager::new();
        surface
            .configure(&mut backend, &PixelSize::new(750, 1334))
            .unwrap();
        let program = ShaderProgram::build(&mut backend, &ShaderAssets::builtin(), true).unwrap();
        let mut presenter = FramePresenter::new();
        presenter.create_texture_cache(&mut backend, 64 << 20).unwrap();
        backend.take_commands();
        Rig {
            backend,
            surface,
            program,
            presenter,
        }
    }

    fn hd_state() -> RenderState {
        RenderState {
            presentation_size: Size::new(1920.0, 1080.0),
            ..RenderState::default()
        }
    }

    #[test]
    fn test_commands_follow_protocol_order() {
        let mut rig = rig();
        let frame = VideoFrame::test_pattern(FrameId(1), 64, 36);
        let mut state = hd_state();
        rig.presenter
            .present(&mut rig.backend, &rig.surface, &rig.program, &frame, &mut state)
            .unwrap();

        let kinds: Vec<&'static str> = rig
            .backend
            .commands()
            .iter()
            .map(|c| match c {
                BackendCommand::FlushTextureCache(_) => "flush",
                BackendCommand::CreatePlaneTexture { plane: Plane::Luma, .. } => "luma",
                BackendCommand::CreatePlaneTexture { plane: Plane::Chroma, .. } => "chroma",
                BackendCommand::BindRenderTarget { .. } => "bind",
                BackendCommand::SetUniforms { .. } => "uniforms",
                BackendCommand::DrawQuad { .. } => "draw",
                BackendCommand::Present(_) => "present",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            ["flush", "luma", "chroma", "bind", "uniforms", "draw", "present"]
        );
    }

    #[test]
    fn test_bind_clears_to_black_at_full_viewport() {
        let mut rig = rig();
        let frame = VideoFrame::test_pattern(FrameId(1), 64, 36);
        rig.presenter
            .present(&mut rig.backend, &rig.surface, &rig.program, &frame, &mut hd_state())
            .unwrap();
        let bind = rig
            .backend
            .commands()
            .iter()
            .find_map(|c| match c {
                BackendCommand::BindRenderTarget { viewport, clear, .. } => Some((*viewport, *clear)),
                _ => None,
            })
            .unwrap();
        assert_eq!(bind, (PixelSize::new(750, 1334), Color::BLACK));
    }

    #[test]
    fn test_previous_pair_released_before_next_upload() {
        let mut rig = rig();
        let mut state = hd_state();
        for id in 1..=3 {
            let frame = VideoFrame::test_pattern(FrameId(id), 64, 36);
            rig.presenter
                .present(&mut rig.backend, &rig.surface, &rig.program, &frame, &mut state)
                .unwrap();
            assert_eq!(rig.backend.live_textures(), 2);
        }
        // Released textures are flushed back before the next upload
        assert_eq!(rig.backend.texture_allocations(), 2);
    }

    #[test]
    fn test_matrix_follows_frame_tag() {
        let mut rig = rig();
        let mut state = hd_state();
        let sd = VideoFrame::test_pattern(FrameId(1), 32, 32).with_matrix(YuvMatrix::Bt601);
        let report = rig
            .presenter
            .present(&mut rig.backend, &rig.surface, &rig.program, &sd, &mut state)
            .unwrap();
        assert_eq!(report.conversion, ConversionStandard::Sd);
        assert_eq!(state.conversion, ConversionStandard::Sd);

        let untagged = VideoFrame::test_pattern(FrameId(2), 32, 32);
        let report = rig
            .presenter
            .present(&mut rig.backend, &rig.surface, &rig.program, &untagged, &mut state)
            .unwrap();
        assert_eq!(report.conversion, ConversionStandard::Hd);
        assert_eq!(
            rig.backend.uniform_values(rig.program.id()).unwrap().color_conversion,
            lumaview_core::ColorConversionMatrix::BT709
        );
    }

    #[test]
    fn test_chroma_failure_releases_luma_and_skips_draw() {
        let mut rig = rig();
        let mut state = hd_state();
        let first = VideoFrame::test_pattern(FrameId(1), 32, 32);
        rig.presenter
            .present(&mut rig.backend, &rig.surface, &rig.program, &first, &mut state)
            .unwrap();

        rig.backend.faults_mut().texture = Some(Plane::Chroma);
        let second = VideoFrame::test_pattern(FrameId(2), 32, 32);
        let err = rig
            .presenter
            .present(&mut rig.backend, &rig.surface, &rig.program, &second, &mut state)
            .unwrap_err();

        assert!(matches!(
            err,
            RenderError::TextureUpload {
                plane: Plane::Chroma,
                ..
            }
        ));
        assert_eq!(rig.backend.live_textures(), 0);
        assert_eq!(rig.backend.draw_count(), 1);
        assert_eq!(rig.backend.presented_frame(), Some(FrameId(1)));
        assert!(rig.presenter.live_textures().is_none());
    }

    #[test]
    fn test_missing_cache() {
        let mut rig = rig();
        rig.presenter.destroy_texture_cache(&mut rig.backend);
        let frame = VideoFrame::test_pattern(FrameId(1), 32, 32);
        let err = rig
            .presenter
            .present(&mut rig.backend, &rig.surface, &rig.program, &frame, &mut hd_state())
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingCache));
        assert_eq!(rig.backend.draw_count(), 0);
    }

    #[test]
    fn test_unconfigured_surface() {
        let mut rig = rig();
        rig.surface.teardown(&mut rig.backend);
        let frame = VideoFrame::test_pattern(FrameId(1), 32, 32);
        let err = rig
            .presenter
            .present(&mut rig.backend, &rig.surface, &rig.program, &frame, &mut hd_state())
            .unwrap_err();
        assert!(matches!(err, RenderError::NotConfigured));
    }

    #[test]
    fn test_letterbox_recomputed_on_aspect_change() {
        let mut rig = rig();
        let mut state = hd_state();
        let frame = VideoFrame::test_pattern(FrameId(1), 32, 32);
        let wide = rig
            .presenter
            .present(&mut rig.backend, &rig.surface, &rig.program, &frame, &mut state)
            .unwrap();

        state.presentation_size = Size::new(900.0, 2000.0);
        let tall = rig
            .presenter
            .present(&mut rig.backend, &rig.surface, &rig.program, &frame, &mut state)
            .unwrap();

        assert_eq!(wide.quad.width, 1.0);
        assert!(wide.quad.height < 1.0);
        assert_eq!(tall.quad.height, 1.0);
        assert_ne!(wide.quad, tall.quad);
    }
}
