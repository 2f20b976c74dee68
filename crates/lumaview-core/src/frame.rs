//! Bi-planar YUV 4:2:0 video frames in CPU memory.
//!
//! A frame carries a full-resolution luma plane and a half-resolution,
//! interleaved two-channel chroma plane (NV12 layout), plus the YUV matrix
//! the producer declared for it.

use crate::error::{LumaviewError, Result};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Identity of the allocation backing a frame.
///
/// Decoders recycle a small ring of buffers, so the same id shows up again
/// once its buffer is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct FrameId(pub u64);

/// YUV matrix standard declared by the producer of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum YuvMatrix {
    /// ITU-R BT.601 (SDTV), including SMPTE 170M and BT.470 BG
    Bt601,
    /// ITU-R BT.709 (HDTV)
    Bt709,
    /// SMPTE 240M
    Smpte240M,
    /// ITU-R BT.2020
    Bt2020,
    /// Absent or unrecognised tag
    #[default]
    Unspecified,
}

impl YuvMatrix {
    /// Parse a matrix tag as written by demuxers and platform media APIs.
    ///
    /// Accepts spellings such as `"601"`, `"ITU_R_601_4"`, `"bt709"` or
    /// `"smpte170m"`. Anything else maps to [`YuvMatrix::Unspecified`].
    pub fn from_tag(tag: &str) -> Self {
        let normalized: String = tag
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        if normalized.contains("601")
            || normalized.contains("170m")
            || normalized.contains("470bg")
        {
            Self::Bt601
        } else if normalized.contains("709") {
            Self::Bt709
        } else if normalized.contains("240m") {
            Self::Smpte240M
        } else if normalized.contains("2020") {
            Self::Bt2020
        } else {
            Self::Unspecified
        }
    }

    /// Whether this tag belongs to the standard-definition (601) family.
    #[inline]
    pub fn is_601_family(self) -> bool {
        matches!(self, Self::Bt601)
    }

    /// Canonical tag string.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Bt601 => "ITU_R_601_4",
            Self::Bt709 => "ITU_R_709_2",
            Self::Smpte240M => "SMPTE_240M_1995",
            Self::Bt2020 => "ITU_R_2020",
            Self::Unspecified => "",
        }
    }
}

/// One of the two planes of a bi-planar frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plane {
    /// Full-resolution single-channel Y plane
    Luma,
    /// Half-resolution interleaved CbCr plane
    Chroma,
}

impl Plane {
    /// Both planes in upload order.
    pub const ALL: [Plane; 2] = [Plane::Luma, Plane::Chroma];

    /// Index of the plane inside the frame.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::Luma => 0,
            Self::Chroma => 1,
        }
    }

    /// Texture unit the plane is sampled from.
    #[inline]
    pub fn texture_unit(self) -> u32 {
        self.index() as u32
    }

    /// Channels per sample (one byte each).
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            Self::Luma => 1,
            Self::Chroma => 2,
        }
    }

    /// Plane dimensions for a frame of the given size.
    pub fn dimensions(self, frame_width: u32, frame_height: u32) -> (u32, u32) {
        match self {
            Self::Luma => (frame_width, frame_height),
            Self::Chroma => (frame_width / 2, frame_height / 2),
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Luma => f.write_str("luma"),
            Self::Chroma => f.write_str("chroma"),
        }
    }
}

/// A plane of pixel data with stride information.
#[derive(Debug, Clone)]
pub struct FramePlane {
    /// Raw pixel data
    pub data: Vec<u8>,
    /// Bytes per row (may include padding)
    pub stride: usize,
    /// Width in samples
    pub width: u32,
    /// Height in rows
    pub height: u32,
    /// Bytes per sample
    pub bytes_per_pixel: usize,
}

impl FramePlane {
    /// Create a zeroed plane with the given dimensions.
    pub fn new(width: u32, height: u32, bytes_per_pixel: usize) -> Self {
        // Align stride to 64 bytes for SIMD and GPU compatibility
        let min_stride = (width as usize) * bytes_per_pixel;
        let stride = (min_stride + 63) & !63;
        let data = vec![0u8; stride * height as usize];
        Self {
            data,
            stride,
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// Wrap existing pixel data, checking that it covers every row.
    pub fn from_data(
        data: Vec<u8>,
        stride: usize,
        width: u32,
        height: u32,
        bytes_per_pixel: usize,
    ) -> Result<Self> {
        let plane = Self {
            data,
            stride,
            width,
            height,
            bytes_per_pixel,
        };
        if !plane.is_well_formed() {
            return Err(LumaviewError::InvalidFrame(format!(
                "plane {}x{} with stride {} needs {} bytes, got {}",
                width,
                height,
                stride,
                plane.required_len(),
                plane.data.len()
            )));
        }
        Ok(plane)
    }

    /// Row length in bytes without padding.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel
    }

    /// Minimum number of bytes the plane data must hold.
    pub fn required_len(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        self.stride * (self.height as usize - 1) + self.row_bytes()
    }

    /// Stride covers a row and the data covers every row.
    pub fn is_well_formed(&self) -> bool {
        self.stride >= self.row_bytes() && self.data.len() >= self.required_len()
    }

    /// Get a row of pixel data.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.row_bytes();
        &mut self.data[start..start + len]
    }
}

/// A decoded bi-planar YUV 4:2:0 frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Identity of the backing allocation
    pub id: FrameId,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Declared YUV matrix
    pub matrix: YuvMatrix,
    /// Presentation timestamp in seconds
    pub pts: f64,
    planes: SmallVec<[FramePlane; 2]>,
}

impl VideoFrame {
    /// Allocate a zeroed frame of the given size.
    pub fn new(id: FrameId, width: u32, height: u32) -> Self {
        let (chroma_width, chroma_height) = Plane::Chroma.dimensions(width, height);
        Self {
            id,
            width,
            height,
            matrix: YuvMatrix::Unspecified,
            pts: 0.0,
            planes: smallvec::smallvec![
                FramePlane::new(width, height, 1),               // Y
                FramePlane::new(chroma_width, chroma_height, 2), // CbCr interleaved
            ],
        }
    }

    /// Assemble a frame from decoder-provided planes.
    pub fn from_planes(
        id: FrameId,
        width: u32,
        height: u32,
        luma: FramePlane,
        chroma: FramePlane,
    ) -> Result<Self> {
        for (plane, data) in [(Plane::Luma, &luma), (Plane::Chroma, &chroma)] {
            let (w, h) = plane.dimensions(width, height);
            if data.bytes_per_pixel != plane.channels() {
                return Err(LumaviewError::InvalidFrame(format!(
                    "{} plane has {} bytes per sample, expected {}",
                    plane,
                    data.bytes_per_pixel,
                    plane.channels()
                )));
            }
            if data.width < w || data.height < h || !data.is_well_formed() {
                return Err(LumaviewError::InvalidFrame(format!(
                    "{} plane {}x{} does not cover {}x{}",
                    plane, data.width, data.height, w, h
                )));
            }
        }

        Ok(Self {
            id,
            width,
            height,
            matrix: YuvMatrix::Unspecified,
            pts: 0.0,
            planes: smallvec::smallvec![luma, chroma],
        })
    }

    /// Set the declared YUV matrix.
    pub fn with_matrix(mut self, matrix: YuvMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: f64) -> Self {
        self.pts = pts;
        self
    }

    /// Borrow one plane.
    #[inline]
    pub fn plane(&self, plane: Plane) -> &FramePlane {
        &self.planes[plane.index()]
    }

    /// Borrow one plane mutably.
    #[inline]
    pub fn plane_mut(&mut self, plane: Plane) -> &mut FramePlane {
        &mut self.planes[plane.index()]
    }

    /// Total memory usage of this frame in bytes.
    pub fn memory_size(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }

    /// Create a studio-range color bar frame tagged BT.709.
    pub fn test_pattern(id: FrameId, width: u32, height: u32) -> Self {
        Self::test_pattern_shifted(id, width, height, 0)
    }

    /// Color bars scrolled horizontally by `shift` pixels.
    pub fn test_pattern_shifted(id: FrameId, width: u32, height: u32, shift: u32) -> Self {
        // White, yellow, cyan, green, magenta, red, blue, black
        const BARS: [[f32; 3]; 8] = [
            [1.0, 1.0, 1.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 1.0],
            [0.0, 1.0, 0.0],
            [1.0, 0.0, 1.0],
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0],
        ];

        let mut frame = Self::new(id, width, height).with_matrix(YuvMatrix::Bt709);
        if width == 0 || height == 0 {
            return frame;
        }

        let shift = shift % width;
        let bar_at = |x: u32| {
            let shifted = (x as u64 + shift as u64) % width as u64;
            rgb_to_studio_yuv709(BARS[(shifted as usize * 8) / width as usize])
        };

        let luma = frame.plane_mut(Plane::Luma);
        for y in 0..height {
            let row = luma.row_mut(y);
            for x in 0..width {
                row[x as usize] = bar_at(x)[0];
            }
        }

        let (chroma_width, chroma_height) = Plane::Chroma.dimensions(width, height);
        let chroma = frame.plane_mut(Plane::Chroma);
        for y in 0..chroma_height {
            let row = chroma.row_mut(y);
            for x in 0..chroma_width {
                let [_, cb, cr] = bar_at(x * 2);
                let i = x as usize * 2;
                row[i] = cb;
                row[i + 1] = cr;
            }
        }

        frame
    }
}

/// Encode an RGB color as 8-bit studio-range BT.709 YCbCr.
fn rgb_to_studio_yuv709([r, g, b]: [f32; 3]) -> [u8; 3] {
    let y = 0.2126 * r + 0.7152 * g + 0.0722 * b;
    let cb = (b - y) / 1.8556;
    let cr = (r - y) / 1.5748;
    [
        (16.0 + 219.0 * y).round() as u8,
        (128.0 + 224.0 * cb).round() as u8,
        (128.0 + 224.0 * cr).round() as u8,
    ]
}
