//! Plane textures.

use crate::error::{RenderError, Result};
use lumaview_core::{FramePlane, Plane, VideoFrame};

/// Upload layout of one plane, checked against the frame it comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub plane: Plane,
    pub width: u32,
    pub height: u32,
    /// Bytes between row starts in the source data
    pub stride: usize,
}

impl PlaneLayout {
    /// Check that `frame` carries a usable `plane` and describe its upload.
    ///
    /// The upload covers the 4:2:0 dimensions implied by the frame size
    /// (chroma at half width and height, rounded down). Decoders may hand over
    /// larger planes (rounded-up chroma, padded widths); only the top-left
    /// sub-rectangle of those is uploaded.
    pub fn for_frame(frame: &VideoFrame, plane: Plane) -> Result<Self> {
        let fail = |reason: String| RenderError::TextureUpload { plane, reason };

        let (width, height) = plane.dimensions(frame.width, frame.height);
        if width == 0 || height == 0 {
            return Err(fail(format!(
                "empty {}x{} plane for a {}x{} frame",
                width, height, frame.width, frame.height
            )));
        }

        let data: &FramePlane = frame.plane(plane);
        if data.width < width || data.height < height {
            return Err(fail(format!(
                "plane is {}x{}, needs at least {}x{}",
                data.width, data.height, width, height
            )));
        }
        if data.bytes_per_pixel != plane.channels() {
            return Err(fail(format!(
                "plane has {} bytes per sample, expected {}",
                data.bytes_per_pixel,
                plane.channels()
            )));
        }
        if !data.is_well_formed() {
            return Err(fail(format!(
                "plane data holds {} bytes, needs {}",
                data.data.len(),
                data.required_len()
            )));
        }

        Ok(Self {
            plane,
            width,
            height,
            stride: data.stride,
        })
    }

    /// Bytes of one uploaded row, without padding.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.plane.channels()
    }

    /// Texture format sampled by the shader for this plane.
    pub fn format(&self) -> wgpu::TextureFormat {
        plane_format(self.plane)
    }
}

/// R8 for luma, RG8 for interleaved chroma. Unorm so the shader sees [0, 1].
pub fn plane_format(plane: Plane) -> wgpu::TextureFormat {
    match plane {
        Plane::Luma => wgpu::TextureFormat::R8Unorm,
        Plane::Chroma => wgpu::TextureFormat::Rg8Unorm,
    }
}

/// A GPU texture holding one plane.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl GpuTexture {
    /// Create a new GPU texture with the given dimensions.
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: Option<&str>,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            // Sampled at display size; no mipmaps.
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
            format,
        }
    }

    /// Create a texture for a plane upload.
    pub fn for_plane(device: &wgpu::Device, layout: &PlaneLayout) -> Self {
        Self::new(
            device,
            layout.width,
            layout.height,
            layout.format(),
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            Some(match layout.plane {
                Plane::Luma => "Luma Plane",
                Plane::Chroma => "Chroma Plane",
            }),
        )
    }

    /// Copy a frame's plane into this texture, honoring the source stride.
    ///
    /// Only `layout.width` x `layout.height` samples are read from each plane.
    pub fn upload_plane(&self, queue: &wgpu::Queue, frame: &VideoFrame, layout: &PlaneLayout) -> Result<()> {
        if layout.width != self.width || layout.height != self.height || layout.format() != self.format {
            return Err(RenderError::TextureUpload {
                plane: layout.plane,
                reason: format!(
                    "plane {}x{} doesn't match texture {}x{}",
                    layout.width, layout.height, self.width, self.height
                ),
            });
        }

        let bytes_per_row = u32::try_from(layout.stride).map_err(|_| RenderError::TextureUpload {
            plane: layout.plane,
            reason: format!("stride {} too large", layout.stride),
        })?;

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.plane(layout.plane).data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        Ok(())
    }

    /// Memory usage estimate in bytes.
    pub fn memory_size(&self) -> usize {
        texture_bytes(self.width, self.height, self.format)
    }
}

/// Bytes held by a texture of the given size and format.
pub fn texture_bytes(width: u32, height: u32, format: wgpu::TextureFormat) -> usize {
    // R8 and RG8 planes: one byte per channel
    let bytes_per_pixel = format.block_copy_size(None).unwrap_or(1) as usize;
    (width as usize) * (height as usize) * bytes_per_pixel
}
