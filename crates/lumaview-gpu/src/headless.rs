//! Backend that records commands instead of talking to a GPU.
//!
//! Used by unit and integration tests. It keeps the same object lifetimes a
//! real backend would (targets, programs, caches, textures), validates the
//! call order, and can be told to fail at specific points.

use crate::backend::{
    CacheId, HandleAllocator, ProgramId, RenderBackend, RenderTarget, RenderTargetId,
    SamplerUnit, TextureId, TexturePair,
};
use crate::error::{RenderError, Result};
use crate::shader::LinkedProgram;
use crate::texture::{plane_format, PlaneLayout};
use crate::texture_cache::{CachedTexture, TextureCache, TextureKey};
use crate::uniforms::{PackedBlock, UniformTable, UniformValues};
use lumaview_core::{
    convert_pixel, Color, FrameId, PixelSize, Plane, QuadGeometry, VideoFrame,
};
use std::collections::HashMap;
use tracing::{debug, trace};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    CreateRenderTarget {
        id: RenderTargetId,
        requested: PixelSize,
        actual: PixelSize,
    },
    ReleaseRenderTarget(RenderTargetId),
    CreateProgram(ProgramId),
    DeleteProgram(ProgramId),
    SetSamplerUnits {
        program: ProgramId,
        units: [SamplerUnit; 2],
    },
    CreateTextureCache(CacheId),
    DestroyTextureCache(CacheId),
    FlushTextureCache(CacheId),
    CreatePlaneTexture {
        id: TextureId,
        plane: Plane,
        frame: FrameId,
        width: u32,
        height: u32,
    },
    ReleasePlaneTexture(TextureId),
    BindRenderTarget {
        target: RenderTargetId,
        viewport: PixelSize,
        clear: Color,
    },
    SetUniforms {
        program: ProgramId,
        blocks: Vec<PackedBlock>,
    },
    DrawQuad {
        program: ProgramId,
        geometry: QuadGeometry,
        textures: TexturePair,
    },
    Present(RenderTargetId),
}

/// Failures the headless backend can be told to produce.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Fail texture creation for this plane
    pub texture: Option<Plane>,
    /// Allocate render targets that are not complete
    pub incomplete_target: bool,
    /// Report every texture cache as missing on flush
    pub missing_cache: bool,
    /// Reject programs with this link log
    pub program: Option<String>,
    /// Clamp allocated targets to this side length
    pub max_target_dimension: Option<u32>,
}

/// A plane copied out of a frame, tightly packed.
#[derive(Debug, Clone)]
struct HeadlessTexture {
    key: TextureKey,
    frame: FrameId,
    plane: Plane,
    samples: Vec<u8>,
}

impl CachedTexture for HeadlessTexture {
    fn key(&self) -> TextureKey {
        self.key
    }

    fn memory_size(&self) -> usize {
        crate::texture::texture_bytes(self.key.width, self.key.height, self.key.format)
    }
}

impl HeadlessTexture {
    fn sample(&self, x: u32, y: u32) -> &[u8] {
        let channels = self.plane.channels();
        let x = x.min(self.key.width - 1) as usize;
        let y = y.min(self.key.height - 1) as usize;
        let start = (y * self.key.width as usize + x) * channels;
        &self.samples[start..start + channels]
    }
}

#[derive(Debug)]
struct ProgramRecord {
    uniforms: UniformTable,
    sampler_units: Option<[SamplerUnit; 2]>,
    blocks: Vec<PackedBlock>,
}

/// What the display currently shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentedImage {
    pub target: RenderTargetId,
    pub frame: FrameId,
    pub geometry: QuadGeometry,
}

#[derive(Debug, Clone, Copy)]
struct PendingDraw {
    program: ProgramId,
    textures: TexturePair,
    geometry: QuadGeometry,
}

/// Recording backend with fault injection.
#[derive(Default)]
pub struct HeadlessBackend {
    handles: HandleAllocator,
    faults: Faults,
    commands: Vec<BackendCommand>,
    targets: HashMap<RenderTargetId, PixelSize>,
    programs: HashMap<ProgramId, ProgramRecord>,
    caches: HashMap<CacheId, TextureCache<HeadlessTexture>>,
    textures: HashMap<TextureId, (CacheId, HeadlessTexture)>,
    bound: Option<RenderTargetId>,
    pending: Option<PendingDraw>,
    presented: Option<(PresentedImage, PendingDraw, HeadlessTexture, HeadlessTexture)>,
    allocations: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Change which calls fail from now on.
    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Every call since creation or the last [`take_commands`](Self::take_commands).
    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<BackendCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, BackendCommand::DrawQuad { .. }))
            .count()
    }

    /// The image currently on screen.
    pub fn presented(&self) -> Option<PresentedImage> {
        self.presented.as_ref().map(|(image, ..)| *image)
    }

    pub fn presented_frame(&self) -> Option<FrameId> {
        self.presented().map(|image| image.frame)
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_caches(&self) -> usize {
        self.caches.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Textures created from scratch rather than taken from a cache.
    pub fn texture_allocations(&self) -> usize {
        self.allocations
    }

    pub fn uniform_table(&self, program: ProgramId) -> Option<&UniformTable> {
        self.programs.get(&program).map(|p| &p.uniforms)
    }

    pub fn sampler_units(&self, program: ProgramId) -> Option<[SamplerUnit; 2]> {
        self.programs.get(&program).and_then(|p| p.sampler_units)
    }

    /// Uniform values most recently pushed to `program`.
    pub fn uniform_values(&self, program: ProgramId) -> Option<UniformValues> {
        let record = self.programs.get(&program)?;
        record.uniforms.unpack(&record.blocks)
    }

    /// Shade frame pixel (x, y) of the presented image the way the
    /// fragment stage does: nearest luma sample, the chroma sample covering
    /// it, and the uniforms that were current at draw time.
    pub fn shade_presented(&self, x: u32, y: u32) -> Option<[f32; 3]> {
        let (_, draw, luma, chroma) = self.presented.as_ref()?;
        let values = self.uniform_values(draw.program)?;
        let y_sample = luma.sample(x, y)[0];
        let uv = chroma.sample(x / 2, y / 2);
        Some(convert_pixel(
            y_sample,
            uv[0],
            uv[1],
            &values.color_conversion,
            values.luma_threshold,
            values.chroma_threshold,
        ))
    }

    fn texture(&self, id: TextureId) -> Result<&HeadlessTexture> {
        self.textures
            .get(&id)
            .map(|(_, tex)| tex)
            .ok_or_else(|| RenderError::Gpu(format!("unknown texture {:?}", id)))
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_render_target(&mut self, requested: PixelSize) -> Result<RenderTarget> {
        let id = RenderTargetId(self.handles.next());
        let clamp = |side: u32| match self.faults.max_target_dimension {
            Some(max) => side.min(max),
            None => side,
        };
        let actual = PixelSize::new(clamp(requested.width), clamp(requested.height));

        self.targets.insert(id, actual);
        self.commands.push(BackendCommand::CreateRenderTarget {
            id,
            requested,
            actual,
        });
        debug!("Headless target {:?} at {}x{}", id, actual.width, actual.height);

        Ok(RenderTarget {
            id,
            size: actual,
            complete: !self.faults.incomplete_target && !actual.is_empty(),
        })
    }

    fn release_render_target(&mut self, target: RenderTargetId) {
        if self.targets.remove(&target).is_some() {
            self.commands.push(BackendCommand::ReleaseRenderTarget(target));
        }
        if self.bound == Some(target) {
            self.bound = None;
        }
    }

    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramId> {
        if let Some(log) = &self.faults.program {
            return Err(RenderError::ShaderLink { log: log.clone() });
        }
        let id = ProgramId(self.handles.next());
        self.programs.insert(
            id,
            ProgramRecord {
                uniforms: program.uniforms.clone(),
                sampler_units: None,
                blocks: Vec::new(),
            },
        );
        self.commands.push(BackendCommand::CreateProgram(id));
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_some() {
            self.commands.push(BackendCommand::DeleteProgram(program));
        }
    }

    fn set_sampler_units(&mut self, program: ProgramId, units: &[SamplerUnit; 2]) {
        if let Some(record) = self.programs.get_mut(&program) {
            record.sampler_units = Some(*units);
            self.commands.push(BackendCommand::SetSamplerUnits {
                program,
                units: *units,
            });
        }
    }

    fn create_texture_cache(&mut self, budget: usize) -> Result<CacheId> {
        let id = CacheId(self.handles.next());
        self.caches.insert(id, TextureCache::new(budget));
        self.commands.push(BackendCommand::CreateTextureCache(id));
        Ok(id)
    }

    fn destroy_texture_cache(&mut self, cache: CacheId) {
        if self.caches.remove(&cache).is_some() {
            self.textures.retain(|_, (owner, _)| *owner != cache);
            self.commands.push(BackendCommand::DestroyTextureCache(cache));
        }
    }

    fn flush_texture_cache(&mut self, cache: CacheId) -> Result<()> {
        if self.faults.missing_cache {
            return Err(RenderError::MissingCache);
        }
        let entry = self.caches.get_mut(&cache).ok_or(RenderError::MissingCache)?;
        entry.flush();
        self.commands.push(BackendCommand::FlushTextureCache(cache));
        Ok(())
    }

    fn create_plane_texture(
        &mut self,
        cache: CacheId,
        frame: &VideoFrame,
        plane: Plane,
    ) -> Result<TextureId> {
        if self.faults.texture == Some(plane) {
            return Err(RenderError::TextureUpload {
                plane,
                reason: "injected failure".to_string(),
            });
        }
        let layout = PlaneLayout::for_frame(frame, plane)?;
        let key = TextureKey {
            width: layout.width,
            height: layout.height,
            format: plane_format(plane),
        };

        let entry = self.caches.get_mut(&cache).ok_or(RenderError::MissingCache)?;
        let mut created = false;
        let mut texture = entry.acquire(key, || {
            created = true;
            HeadlessTexture {
                key,
                frame: frame.id,
                plane,
                samples: Vec::new(),
            }
        });
        if created {
            self.allocations += 1;
        }

        // "Upload": copy the visible samples, dropping row padding.
        let source = frame.plane(plane);
        texture.frame = frame.id;
        texture.samples.clear();
        for row in 0..layout.height {
            texture
                .samples
                .extend_from_slice(&source.row(row)[..layout.row_bytes()]);
        }

        let id = TextureId(self.handles.next());
        self.textures.insert(id, (cache, texture));
        self.commands.push(BackendCommand::CreatePlaneTexture {
            id,
            plane,
            frame: frame.id,
            width: layout.width,
            height: layout.height,
        });
        trace!("Headless {} texture {:?} for frame {:?}", plane, id, frame.id);
        Ok(id)
    }

    fn release_plane_texture(&mut self, texture: TextureId) {
        if let Some((cache, tex)) = self.textures.remove(&texture) {
            if let Some(entry) = self.caches.get_mut(&cache) {
                entry.release(tex);
            }
            self.commands.push(BackendCommand::ReleasePlaneTexture(texture));
        }
    }

    fn bind_render_target(&mut self, target: RenderTargetId, clear: Color) -> Result<()> {
        let viewport = *self
            .targets
            .get(&target)
            .ok_or_else(|| RenderError::Gpu(format!("unknown render target {:?}", target)))?;
        self.bound = Some(target);
        self.pending = None;
        self.commands.push(BackendCommand::BindRenderTarget {
            target,
            viewport,
            clear,
        });
        Ok(())
    }

    fn set_uniforms(&mut self, program: ProgramId, blocks: &[PackedBlock]) {
        if let Some(record) = self.programs.get_mut(&program) {
            record.blocks = blocks.to_vec();
            self.commands.push(BackendCommand::SetUniforms {
                program,
                blocks: blocks.to_vec(),
            });
        }
    }

    fn draw_quad(
        &mut self,
        program: ProgramId,
        geometry: &QuadGeometry,
        textures: &TexturePair,
    ) -> Result<()> {
        if self.bound.is_none() {
            return Err(RenderError::Gpu("draw without a bound render target".to_string()));
        }
        if !self.programs.contains_key(&program) {
            return Err(RenderError::Gpu(format!("unknown program {:?}", program)));
        }
        self.texture(textures.luma)?;
        self.texture(textures.chroma)?;

        self.pending = Some(PendingDraw {
            program,
            textures: *textures,
            geometry: *geometry,
        });
        self.commands.push(BackendCommand::DrawQuad {
            program,
            geometry: *geometry,
            textures: *textures,
        });
        Ok(())
    }

    fn present(&mut self, target: RenderTargetId) -> Result<()> {
        if self.bound != Some(target) {
            return Err(RenderError::Gpu(format!("present of unbound target {:?}", target)));
        }
        self.bound = None;

        if let Some(draw) = self.pending.take() {
            let luma = self.texture(draw.textures.luma)?.clone();
            let chroma = self.texture(draw.textures.chroma)?.clone();
            let image = PresentedImage {
                target,
                frame: luma.frame,
                geometry: draw.geometry,
            };
            self.presented = Some((image, draw, luma, chroma));
        }
        self.commands.push(BackendCommand::Present(target));
        Ok(())
    }
}
