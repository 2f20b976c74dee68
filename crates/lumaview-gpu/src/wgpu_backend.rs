//! [`RenderBackend`] on top of wgpu.
//!
//! The render target is the window surface itself; "allocating" it means
//! configuring the swap chain. Each presented frame acquires a surface
//! texture in `bind_render_target`, records one render pass in
//! `draw_quad` and submits in `present`.

use crate::backend::{
    CacheId, HandleAllocator, ProgramId, RenderBackend, RenderTarget, RenderTargetId,
    SamplerUnit, TextureId, TexturePair,
};
use crate::context::GpuContext;
use crate::error::{RenderError, Result};
use crate::shader::LinkedProgram;
use crate::texture::{GpuTexture, PlaneLayout};
use crate::texture_cache::{TextureCache, TextureKey};
use crate::uniforms::{Attribute, PackedBlock};
use lumaview_core::{Color, PixelSize, Plane, QuadGeometry, VideoFrame};
use std::borrow::Cow;
use std::collections::HashMap;
use std::num::NonZeroU64;
use tracing::{debug, info, warn};

/// Bytes of one strip's worth of a two-float attribute.
const STRIP_ATTRIBUTE_BYTES: u64 = 4 * 2 * std::mem::size_of::<f32>() as u64;

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    uniform_buffers: Vec<(u32, wgpu::Buffer)>,
    layout: wgpu::BindGroupLayout,
    units: Option<[SamplerUnit; 2]>,
    sampler_binding: u32,
}

struct FrameInProgress {
    target: RenderTargetId,
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
    viewport: PixelSize,
    /// Clear still owed to the target; taken by the first pass.
    clear: Option<wgpu::Color>,
}

/// wgpu implementation of the render backend.
pub struct WgpuBackend {
    context: GpuContext,
    surface: wgpu::Surface<'static>,
    formats: Vec<wgpu::TextureFormat>,
    format: wgpu::TextureFormat,
    present_mode: wgpu::PresentMode,
    alpha_mode: wgpu::CompositeAlphaMode,
    handles: HandleAllocator,
    target: Option<(RenderTargetId, wgpu::SurfaceConfiguration)>,
    programs: HashMap<ProgramId, GpuProgram>,
    caches: HashMap<CacheId, TextureCache<GpuTexture>>,
    textures: HashMap<TextureId, (CacheId, GpuTexture)>,
    sampler: wgpu::Sampler,
    positions: wgpu::Buffer,
    tex_coords: wgpu::Buffer,
    frame: Option<FrameInProgress>,
}

impl WgpuBackend {
    /// Create a backend presenting to `window`.
    pub fn new(window: impl Into<wgpu::SurfaceTarget<'static>>, vsync: bool) -> Result<Self> {
        let instance = GpuContext::instance();
        let surface = instance
            .create_surface(window)
            .map_err(|e| RenderError::Setup(format!("Failed to create surface: {}", e)))?;
        let context = GpuContext::new_blocking(instance, Some(&surface))?;

        let caps = surface.get_capabilities(&context.adapter);
        // The shader outputs display-ready values; avoid a second encode.
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| RenderError::Setup("Surface reports no formats".to_string()))?;
        let present_mode = if vsync {
            wgpu::PresentMode::Fifo
        } else if caps.present_modes.contains(&wgpu::PresentMode::Immediate) {
            wgpu::PresentMode::Immediate
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        info!("Surface format {:?}, present mode {:?}", format, present_mode);

        let device = &context.device;
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Plane Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let vertex_buffer = |label: &'static str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: STRIP_ATTRIBUTE_BYTES,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let positions = vertex_buffer("Quad Positions");
        let tex_coords = vertex_buffer("Quad TexCoords");

        Ok(Self {
            formats: caps.formats,
            format,
            present_mode,
            alpha_mode,
            handles: HandleAllocator::default(),
            target: None,
            programs: HashMap::new(),
            caches: HashMap::new(),
            textures: HashMap::new(),
            sampler,
            positions,
            tex_coords,
            frame: None,
            surface,
            context,
        })
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Run `f` inside a validation error scope and report what it raised.
    fn validated<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        let device: &wgpu::Device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(device);
        let error = pollster::block_on(device.pop_error_scope());
        (value, error)
    }

    fn bind_group_layout(
        device: &wgpu::Device,
        program: &LinkedProgram,
    ) -> wgpu::BindGroupLayout {
        let table = &program.uniforms;
        let visibility = wgpu::ShaderStages::VERTEX_FRAGMENT;

        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = table
            .blocks()
            .iter()
            .map(|block| wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(block.size as u64),
                },
                count: None,
            })
            .collect();
        for plane in Plane::ALL {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: table.texture_binding(plane),
                visibility,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: table.sampler_binding(),
            visibility,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });

        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Video Bind Group Layout"),
            entries: &entries,
        })
    }
}

fn to_wgpu_color(color: Color) -> wgpu::Color {
    wgpu::Color {
        r: color.r as f64,
        g: color.g as f64,
        b: color.b as f64,
        a: color.a as f64,
    }
}

impl RenderBackend for WgpuBackend {
    fn create_render_target(&mut self, requested: PixelSize) -> Result<RenderTarget> {
        self.frame = None;

        let max = self.context.max_texture_dimension();
        let size = PixelSize::new(requested.width.min(max), requested.height.min(max));
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: self.format,
            width: size.width,
            height: size.height,
            present_mode: self.present_mode,
            desired_maximum_frame_latency: 2,
            alpha_mode: self.alpha_mode,
            view_formats: vec![],
        };

        let complete = !size.is_empty()
            && self.formats.contains(&self.format)
            && {
                let ((), error) = self.validated(|device| self.surface.configure(device, &config));
                if let Some(e) = &error {
                    warn!("Surface configure rejected: {}", e);
                }
                error.is_none()
            };

        let id = RenderTargetId(self.handles.next());
        self.target = Some((id, config));
        debug!("Surface target {:?} at {}x{}", id, size.width, size.height);

        Ok(RenderTarget { id, size, complete })
    }

    fn release_render_target(&mut self, target: RenderTargetId) {
        if matches!(self.target, Some((id, _)) if id == target) {
            self.frame = None;
            self.target = None;
        }
    }

    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramId> {
        let format = self.format;
        let (result, error) = self.validated(|device| {
            let module = |label: &'static str, source: &str| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(label),
                    source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.to_string())),
                })
            };
            let vertex = module("Video Vertex", &program.vertex.source);
            let fragment = module("Video Fragment", &program.fragment.source);

            let layout = Self::bind_group_layout(device, program);
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Video Pipeline Layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

            let attributes = Attribute::ALL.map(|attribute| {
                [wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x2,
                    offset: 0,
                    shader_location: attribute.location(),
                }]
            });
            let buffers = [
                wgpu::VertexBufferLayout {
                    array_stride: 8,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes[0],
                },
                wgpu::VertexBufferLayout {
                    array_stride: 8,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes[1],
                },
            ];

            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Video Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex,
                    entry_point: Some(program.vertex.entry_point.as_str()),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment,
                    entry_point: Some(program.fragment.entry_point.as_str()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    ..Default::default()
                },
                // Strictly 2D: no depth attachment, so no depth test.
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

            let uniform_buffers = program
                .uniforms
                .blocks()
                .iter()
                .map(|block| {
                    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("Video Uniforms"),
                        size: block.size as u64,
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    });
                    (block.binding, buffer)
                })
                .collect();

            GpuProgram {
                pipeline,
                uniform_buffers,
                layout,
                units: None,
                sampler_binding: program.uniforms.sampler_binding(),
            }
        });

        if let Some(e) = error {
            return Err(RenderError::ShaderLink { log: e.to_string() });
        }

        let id = ProgramId(self.handles.next());
        self.programs.insert(id, result);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn set_sampler_units(&mut self, program: ProgramId, units: &[SamplerUnit; 2]) {
        if let Some(entry) = self.programs.get_mut(&program) {
            entry.units = Some(*units);
        }
    }

    fn create_texture_cache(&mut self, budget: usize) -> Result<CacheId> {
        let id = CacheId(self.handles.next());
        self.caches.insert(id, TextureCache::new(budget));
        Ok(id)
    }

    fn destroy_texture_cache(&mut self, cache: CacheId) {
        if self.caches.remove(&cache).is_some() {
            self.textures.retain(|_, (owner, _)| *owner != cache);
        }
    }

    fn flush_texture_cache(&mut self, cache: CacheId) -> Result<()> {
        let entry = self.caches.get_mut(&cache).ok_or(RenderError::MissingCache)?;
        entry.flush();
        Ok(())
    }

    fn create_plane_texture(
        &mut self,
        cache: CacheId,
        frame: &VideoFrame,
        plane: Plane,
    ) -> Result<TextureId> {
        let layout = PlaneLayout::for_frame(frame, plane)?;
        let entry = self.caches.get_mut(&cache).ok_or(RenderError::MissingCache)?;

        let device = &self.context.device;
        let key = TextureKey {
            width: layout.width,
            height: layout.height,
            format: layout.format(),
        };
        let texture = entry.acquire(key, || GpuTexture::for_plane(device, &layout));

        if let Err(e) = texture.upload_plane(&self.context.queue, frame, &layout) {
            entry.release(texture);
            return Err(e);
        }

        let id = TextureId(self.handles.next());
        self.textures.insert(id, (cache, texture));
        Ok(id)
    }

    fn release_plane_texture(&mut self, texture: TextureId) {
        if let Some((cache, tex)) = self.textures.remove(&texture) {
            if let Some(entry) = self.caches.get_mut(&cache) {
                entry.release(tex);
            }
        }
    }

    fn bind_render_target(&mut self, target: RenderTargetId, clear: Color) -> Result<()> {
        let Some((id, config)) = &self.target else {
            return Err(RenderError::NotConfigured);
        };
        if *id != target {
            return Err(RenderError::Gpu(format!("unknown render target {:?}", target)));
        }
        // Drop any frame that was bound but never presented.
        self.frame = None;

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(e @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                self.surface.configure(&self.context.device, config);
                return Err(RenderError::SurfaceUnavailable(e.to_string()));
            }
            Err(e) => return Err(RenderError::SurfaceUnavailable(e.to_string())),
        };

        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Video Frame"),
            });

        self.frame = Some(FrameInProgress {
            target,
            viewport: PixelSize::new(config.width, config.height),
            surface_texture,
            view,
            encoder,
            clear: Some(to_wgpu_color(clear)),
        });
        Ok(())
    }

    fn set_uniforms(&mut self, program: ProgramId, blocks: &[PackedBlock]) {
        let Some(entry) = self.programs.get(&program) else {
            return;
        };
        for block in blocks {
            if let Some((_, buffer)) = entry.uniform_buffers.iter().find(|(b, _)| *b == block.binding) {
                self.context.queue.write_buffer(buffer, 0, &block.bytes);
            }
        }
    }

    fn draw_quad(
        &mut self,
        program: ProgramId,
        geometry: &QuadGeometry,
        textures: &TexturePair,
    ) -> Result<()> {
        let frame = self
            .frame
            .as_mut()
            .ok_or_else(|| RenderError::Gpu("draw without a bound render target".to_string()))?;
        let entry = self
            .programs
            .get(&program)
            .ok_or_else(|| RenderError::Gpu(format!("unknown program {:?}", program)))?;
        let units = entry
            .units
            .ok_or_else(|| RenderError::Gpu("sampler units not set".to_string()))?;

        let mut views = Vec::with_capacity(units.len());
        for unit in units {
            let id = textures.get(unit.plane);
            let (_, texture) = self
                .textures
                .get(&id)
                .ok_or_else(|| RenderError::Gpu(format!("unknown texture {:?}", id)))?;
            views.push((unit.binding, &texture.view));
        }

        let mut bind_entries: Vec<wgpu::BindGroupEntry> = entry
            .uniform_buffers
            .iter()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        bind_entries.extend(views.iter().map(|(binding, view)| wgpu::BindGroupEntry {
            binding: *binding,
            resource: wgpu::BindingResource::TextureView(view),
        }));
        bind_entries.push(wgpu::BindGroupEntry {
            binding: entry.sampler_binding,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });

        let device = &self.context.device;
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Video Bind Group"),
            layout: &entry.layout,
            entries: &bind_entries,
        });

        let queue = &self.context.queue;
        queue.write_buffer(&self.positions, 0, bytemuck::cast_slice(&geometry.positions));
        queue.write_buffer(&self.tex_coords, 0, bytemuck::cast_slice(&geometry.tex_coords));

        let load = frame
            .clear
            .take()
            .map(wgpu::LoadOp::Clear)
            .unwrap_or(wgpu::LoadOp::Load);
        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Video Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_viewport(
            0.0,
            0.0,
            frame.viewport.width as f32,
            frame.viewport.height as f32,
            0.0,
            1.0,
        );
        pass.set_pipeline(&entry.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(Attribute::Position.location(), self.positions.slice(..));
        pass.set_vertex_buffer(Attribute::TexCoord.location(), self.tex_coords.slice(..));
        pass.draw(0..4, 0..1);

        Ok(())
    }

    fn present(&mut self, target: RenderTargetId) -> Result<()> {
        let mut frame = match self.frame.take() {
            Some(frame) if frame.target == target => frame,
            _ => {
                return Err(RenderError::Gpu(format!(
                    "present of unbound target {:?}",
                    target
                )))
            }
        };

        // Bound but never drawn: still honor the clear.
        if let Some(clear) = frame.clear.take() {
            frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        self.context.queue.submit(Some(frame.encoder.finish()));
        frame.surface_texture.present();
        Ok(())
    }
}
