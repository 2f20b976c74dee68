//! Letterbox geometry for the video quad.
//!
//! The quad is expressed in normalized device coordinates: (-1, -1) is the
//! bottom-left and (1, 1) the top-right corner of the render target.

use bytemuck::{Pod, Zeroable};
use glam::Vec2 as GlamVec2;
use serde::{Deserialize, Serialize};

/// 2D vector.
pub type Vec2 = GlamVec2;

/// Floating-point size, used for presentation aspect sizes and view bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    #[inline]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are finite and strictly positive.
    #[inline]
    pub fn is_positive(self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Width divided by height.
    #[inline]
    pub fn aspect_ratio(self) -> f32 {
        self.width / self.height
    }
}

impl From<PixelSize> for Size {
    fn from(size: PixelSize) -> Self {
        Self::new(size.width as f32, size.height as f32)
    }
}

/// Integer size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Neither dimension is zero.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle.
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin with the given size.
    #[inline]
    pub const fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    /// Center point.
    #[inline]
    pub fn center(self) -> Vec2 {
        Vec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Size of the rectangle.
    #[inline]
    pub fn size(self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Check whether `other` lies inside this rectangle, with a tolerance
    /// relative to the rectangle's magnitude.
    pub fn contains_rect(self, other: Self) -> bool {
        let eps = 1e-5 * (self.x.abs() + self.y.abs() + self.width + self.height).max(1.0);
        other.x >= self.x - eps
            && other.y >= self.y - eps
            && other.x + other.width <= self.x + self.width + eps
            && other.y + other.height <= self.y + self.height + eps
    }
}

/// Largest rectangle with the aspect ratio of `aspect` that fits inside
/// `bounds`, centered in it.
///
/// A degenerate aspect size yields `bounds` unchanged.
pub fn aspect_fit(aspect: Size, bounds: Rect) -> Rect {
    if !aspect.is_positive() || !bounds.size().is_positive() {
        return bounds;
    }

    let scale = (bounds.width / aspect.width).min(bounds.height / aspect.height);
    let size = Vec2::new(aspect.width * scale, aspect.height * scale);
    let center = bounds.center();
    Rect::new(
        center.x - size.x * 0.5,
        center.y - size.y * 0.5,
        size.x,
        size.y,
    )
}

/// Half-extents of the letterboxed quad in normalized device coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedQuad {
    pub width: f32,
    pub height: f32,
}

impl NormalizedQuad {
    /// Quad covering the whole target.
    pub const FULL: Self = Self {
        width: 1.0,
        height: 1.0,
    };

    /// Scale a quad so content with `aspect` keeps its shape inside `bounds`.
    ///
    /// The fitted rectangle is divided by the bounds per axis, then both axes
    /// are divided by the larger of the two so that the longer one spans the
    /// full [-1, 1] range.
    pub fn letterbox(aspect: Size, bounds: Size) -> Self {
        if !bounds.is_positive() {
            return Self::FULL;
        }

        let fit = aspect_fit(aspect, Rect::from_size(bounds));
        let crop_scale = Size::new(fit.width / bounds.width, fit.height / bounds.height);

        if crop_scale.width > crop_scale.height {
            Self {
                width: 1.0,
                height: crop_scale.height / crop_scale.width,
            }
        } else {
            Self {
                width: crop_scale.width / crop_scale.height,
                height: 1.0,
            }
        }
    }

    /// Triangle-strip vertices: bottom-left, bottom-right, top-left, top-right.
    pub fn vertices(self) -> [[f32; 2]; 4] {
        [
            [-self.width, -self.height],
            [self.width, -self.height],
            [-self.width, self.height],
            [self.width, self.height],
        ]
    }

    /// Width/height ratio of the quad once drawn into `bounds`.
    pub fn displayed_aspect_ratio(self, bounds: Size) -> f32 {
        (self.width * bounds.width) / (self.height * bounds.height)
    }
}

/// Texture coordinates matching [`NormalizedQuad::vertices`], flipped
/// vertically so the top-left buffer origin lands at the top of the quad.
pub const FLIPPED_TEX_COORDS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0]];

/// Vertex data for one draw of the video quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadGeometry {
    /// Attribute slot 0
    pub positions: [[f32; 2]; 4],
    /// Attribute slot 1
    pub tex_coords: [[f32; 2]; 4],
}

impl QuadGeometry {
    /// Build the strip for a letterboxed quad.
    pub fn new(quad: NormalizedQuad) -> Self {
        Self {
            positions: quad.vertices(),
            tex_coords: FLIPPED_TEX_COORDS,
        }
    }
}
