//! Colors and YUV-to-RGB conversion matrices.

use crate::frame::YuvMatrix;
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

/// RGBA color with 32-bit float components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// Create a new color from RGBA components.
    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Create a color from RGB with alpha = 1.0.
    #[inline]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Convert to 8-bit RGBA.
    #[inline]
    pub fn to_rgba8(self) -> [u8; 4] {
        [
            (self.r.clamp(0.0, 1.0) * 255.0) as u8,
            (self.g.clamp(0.0, 1.0) * 255.0) as u8,
            (self.b.clamp(0.0, 1.0) * 255.0) as u8,
            (self.a.clamp(0.0, 1.0) * 255.0) as u8,
        ]
    }

    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
}

/// Which of the two conversion matrices applies to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(usize)]
pub enum ConversionStandard {
    /// BT.601, the standard for SDTV
    Sd = 0,
    /// BT.709, the standard for HDTV
    #[default]
    Hd = 1,
}

impl ConversionStandard {
    /// Pick the standard for a frame's declared matrix.
    ///
    /// Only the 601 family selects SD; every other tag, including an absent
    /// one, falls back to HD.
    #[inline]
    pub fn for_matrix(matrix: YuvMatrix) -> Self {
        if matrix.is_601_family() {
            Self::Sd
        } else {
            Self::Hd
        }
    }

    /// The conversion matrix for this standard.
    #[inline]
    pub fn matrix(self) -> &'static ColorConversionMatrix {
        &CONVERSION_MATRICES[self as usize]
    }
}

/// YUV-to-RGB coefficients, including the expansion from studio range
/// (16-235 luma, 16-240 chroma).
///
/// Stored column-major: the first column multiplies Y, the second Cb and
/// the third Cr, so `rgb = M * yuv` and the columns upload without a
/// transpose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorConversionMatrix {
    columns: [[f32; 3]; 3],
}

impl ColorConversionMatrix {
    /// BT.601 (SDTV).
    pub const BT601: Self = Self {
        columns: [[1.164, 1.164, 1.164], [0.0, -0.392, 2.017], [1.596, -0.813, 0.0]],
    };

    /// BT.709 (HDTV).
    pub const BT709: Self = Self {
        columns: [[1.164, 1.164, 1.164], [0.0, -0.213, 2.112], [1.793, -0.533, 0.0]],
    };

    /// Build a matrix from three columns (Y, Cb, Cr multipliers).
    pub const fn from_columns(columns: [[f32; 3]; 3]) -> Self {
        Self { columns }
    }

    /// Select the matrix for a frame's declared YUV matrix.
    #[inline]
    pub fn select(matrix: YuvMatrix) -> &'static Self {
        ConversionStandard::for_matrix(matrix).matrix()
    }

    /// Columns in upload order.
    #[inline]
    pub fn columns(&self) -> &[[f32; 3]; 3] {
        &self.columns
    }

    /// Flat column-major array.
    pub fn to_cols_array(&self) -> [f32; 9] {
        let [a, b, c] = self.columns;
        [a[0], a[1], a[2], b[0], b[1], b[2], c[0], c[1], c[2]]
    }

    /// As a glam matrix.
    pub fn to_mat3(&self) -> Mat3 {
        Mat3::from_cols_array(&self.to_cols_array())
    }
}

/// Conversion matrices indexed by [`ConversionStandard`].
pub const CONVERSION_MATRICES: [ColorConversionMatrix; 2] =
    [ColorConversionMatrix::BT601, ColorConversionMatrix::BT709];

/// CPU reference of the fragment stage for one sample.
///
/// Luma is offset by 16/255 and scaled by `luma_threshold`, chroma is
/// centered on 0.5 and scaled by `chroma_threshold`, then the matrix maps
/// the result to RGB clamped to [0, 1].
pub fn convert_pixel(
    y: u8,
    cb: u8,
    cr: u8,
    matrix: &ColorConversionMatrix,
    luma_threshold: f32,
    chroma_threshold: f32,
) -> [f32; 3] {
    let yuv = Vec3::new(
        (y as f32 / 255.0 - 16.0 / 255.0) * luma_threshold,
        (cb as f32 / 255.0 - 0.5) * chroma_threshold,
        (cr as f32 / 255.0 - 0.5) * chroma_threshold,
    );
    let rgb = (matrix.to_mat3() * yuv).clamp(Vec3::ZERO, Vec3::ONE);
    rgb.to_array()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_is_sd_only_for_601() {
        assert_eq!(
            ConversionStandard::for_matrix(YuvMatrix::Bt601),
            ConversionStandard::Sd
        );
        for matrix in [
            YuvMatrix::Bt709,
            YuvMatrix::Smpte240M,
            YuvMatrix::Bt2020,
            YuvMatrix::Unspecified,
        ] {
            assert_eq!(ConversionStandard::for_matrix(matrix), ConversionStandard::Hd);
        }
        assert_eq!(
            *ColorConversionMatrix::select(YuvMatrix::from_tag("601")),
            ColorConversionMatrix::BT601
        );
        assert_eq!(
            *ColorConversionMatrix::select(YuvMatrix::from_tag("unknown")),
            ColorConversionMatrix::BT709
        );
    }

    #[test]
    fn test_table_is_indexed_by_standard() {
        assert_eq!(*ConversionStandard::Sd.matrix(), ColorConversionMatrix::BT601);
        assert_eq!(*ConversionStandard::Hd.matrix(), ColorConversionMatrix::BT709);
        assert_eq!(ConversionStandard::default(), ConversionStandard::Hd);
    }

    #[test]
    fn test_studio_white_and_black() {
        for matrix in &CONVERSION_MATRICES {
            let white = convert_pixel(235, 128, 128, matrix, 1.0, 1.0);
            for c in white {
                assert!((c - 1.0).abs() < 0.01, "white channel {}", c);
            }
            let black = convert_pixel(16, 128, 128, matrix, 1.0, 1.0);
            for c in black {
                assert!(c.abs() < 0.01, "black channel {}", c);
            }
        }
    }

    #[test]
    fn test_chroma_threshold_zero_gives_gray() {
        // Saturated red in BT.709 studio range
        let rgb = convert_pixel(63, 102, 240, &ColorConversionMatrix::BT709, 1.0, 0.0);
        assert!((rgb[0] - rgb[1]).abs() < 1e-6);
        assert!((rgb[1] - rgb[2]).abs() < 1e-6);
    }

    #[test]
    fn test_bt709_red() {
        let rgb = convert_pixel(63, 102, 240, &ColorConversionMatrix::BT709, 1.0, 1.0);
        assert!(rgb[0] > 0.95);
        assert!(rgb[1] < 0.05);
        assert!(rgb[2] < 0.05);
    }

    #[test]
    fn test_color_rgba8_conversion() {
        assert_eq!(Color::BLACK.to_rgba8(), [0, 0, 0, 255]);
        assert_eq!(Color::WHITE.to_rgba8(), [255, 255, 255, 255]);
    }
}
