//! Uniform and attribute tables resolved from a linked program.
//!
//! Locations are looked up once after link and stored on the owning
//! [`ShaderProgram`](crate::program::ShaderProgram); nothing here is global.

use lumaview_core::{ColorConversionMatrix, Plane, RenderState};
use smallvec::SmallVec;

/// Bind group holding every resource of the video program.
pub const BIND_GROUP: u32 = 0;

/// Named uniforms of the video shader contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uniform {
    SamplerY,
    SamplerUV,
    LumaThreshold,
    ChromaThreshold,
    RotationAngle,
    ColorConversionMatrix,
}

impl Uniform {
    pub const ALL: [Uniform; 6] = [
        Self::SamplerY,
        Self::SamplerUV,
        Self::LumaThreshold,
        Self::ChromaThreshold,
        Self::RotationAngle,
        Self::ColorConversionMatrix,
    ];

    /// Identifier the shader source must use.
    pub fn shader_name(self) -> &'static str {
        match self {
            Self::SamplerY => "SamplerY",
            Self::SamplerUV => "SamplerUV",
            Self::LumaThreshold => "lumaThreshold",
            Self::ChromaThreshold => "chromaThreshold",
            Self::RotationAngle => "preferredRotation",
            Self::ColorConversionMatrix => "colorConversionMatrix",
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }

    /// The sampler uniform for a plane.
    pub fn sampler_for(plane: Plane) -> Self {
        match plane {
            Plane::Luma => Self::SamplerY,
            Plane::Chroma => Self::SamplerUV,
        }
    }
}

/// Fixed vertex attribute slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Position,
    TexCoord,
}

impl Attribute {
    pub const ALL: [Attribute; 2] = [Self::Position, Self::TexCoord];

    /// Shader location of the attribute.
    #[inline]
    pub fn location(self) -> u32 {
        match self {
            Self::Position => 0,
            Self::TexCoord => 1,
        }
    }

    pub fn shader_name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::TexCoord => "texCoord",
        }
    }
}

/// Where a uniform lives once the program is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformLocation {
    /// A sampled texture binding
    Texture { binding: u32 },
    /// A value at `offset` bytes inside the uniform buffer at `binding`
    Value { binding: u32, offset: u32 },
}

impl UniformLocation {
    /// Binding index inside [`BIND_GROUP`].
    pub fn binding(self) -> u32 {
        match self {
            Self::Texture { binding } | Self::Value { binding, .. } => binding,
        }
    }
}

/// A uniform buffer the program reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformBlock {
    pub binding: u32,
    /// Size in bytes, rounded up to 16
    pub size: u32,
}

/// Resolved locations for one linked program.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformTable {
    locations: [UniformLocation; 6],
    blocks: SmallVec<[UniformBlock; 2]>,
    sampler_binding: u32,
}

impl UniformTable {
    pub(crate) fn new(
        locations: [UniformLocation; 6],
        blocks: SmallVec<[UniformBlock; 2]>,
        sampler_binding: u32,
    ) -> Self {
        Self {
            locations,
            blocks,
            sampler_binding,
        }
    }

    #[inline]
    pub fn location(&self, uniform: Uniform) -> UniformLocation {
        self.locations[uniform.index()]
    }

    /// Texture binding sampled for a plane.
    pub fn texture_binding(&self, plane: Plane) -> u32 {
        self.location(Uniform::sampler_for(plane)).binding()
    }

    pub fn blocks(&self) -> &[UniformBlock] {
        &self.blocks
    }

    /// Binding of the filtering sampler shared by both planes.
    pub fn sampler_binding(&self) -> u32 {
        self.sampler_binding
    }

    /// Lay out `values` into one byte buffer per uniform block.
    pub fn pack(&self, values: &UniformValues) -> SmallVec<[PackedBlock; 2]> {
        self.blocks
            .iter()
            .map(|block| {
                let mut bytes = vec![0u8; block.size as usize];
                for uniform in Uniform::ALL {
                    let UniformLocation::Value { binding, offset } = self.location(uniform) else {
                        continue;
                    };
                    if binding != block.binding {
                        continue;
                    }
                    let offset = offset as usize;
                    match uniform {
                        Uniform::LumaThreshold => {
                            write_f32s(&mut bytes, offset, &[values.luma_threshold])
                        }
                        Uniform::ChromaThreshold => {
                            write_f32s(&mut bytes, offset, &[values.chroma_threshold])
                        }
                        Uniform::RotationAngle => {
                            write_f32s(&mut bytes, offset, &[values.rotation_angle])
                        }
                        Uniform::ColorConversionMatrix => {
                            // mat3x3<f32> columns are vec3 padded to 16 bytes
                            for (i, column) in
                                values.color_conversion.columns().iter().enumerate()
                            {
                                write_f32s(&mut bytes, offset + i * MAT3_COLUMN_STRIDE, column);
                            }
                        }
                        Uniform::SamplerY | Uniform::SamplerUV => {}
                    }
                }
                PackedBlock {
                    binding: block.binding,
                    bytes,
                }
            })
            .collect()
    }

    /// Read values back out of packed blocks. `None` if a block is missing.
    pub fn unpack(&self, blocks: &[PackedBlock]) -> Option<UniformValues> {
        let read = |uniform: Uniform, extra: usize| -> Option<f32> {
            let UniformLocation::Value { binding, offset } = self.location(uniform) else {
                return None;
            };
            let block = blocks.iter().find(|b| b.binding == binding)?;
            let start = offset as usize + extra;
            let bytes = block.bytes.get(start..start + 4)?;
            Some(f32::from_ne_bytes(bytes.try_into().ok()?))
        };

        let mut columns = [[0.0f32; 3]; 3];
        for (i, column) in columns.iter_mut().enumerate() {
            for (j, value) in column.iter_mut().enumerate() {
                *value = read(Uniform::ColorConversionMatrix, i * MAT3_COLUMN_STRIDE + j * 4)?;
            }
        }

        Some(UniformValues {
            luma_threshold: read(Uniform::LumaThreshold, 0)?,
            chroma_threshold: read(Uniform::ChromaThreshold, 0)?,
            rotation_angle: read(Uniform::RotationAngle, 0)?,
            color_conversion: ColorConversionMatrix::from_columns(columns),
        })
    }
}

pub(crate) const MAT3_COLUMN_STRIDE: usize = 16;

fn write_f32s(bytes: &mut [u8], offset: usize, values: &[f32]) {
    let src: &[u8] = bytemuck::cast_slice(values);
    bytes[offset..offset + src.len()].copy_from_slice(src);
}

/// Values pushed to the program before each draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformValues {
    pub luma_threshold: f32,
    pub chroma_threshold: f32,
    pub rotation_angle: f32,
    pub color_conversion: ColorConversionMatrix,
}

impl UniformValues {
    /// Values for a render state, using the state's selected matrix.
    pub fn from_state(state: &RenderState) -> Self {
        Self {
            luma_threshold: state.luma_threshold,
            chroma_threshold: state.chroma_threshold,
            rotation_angle: state.rotation_angle,
            color_conversion: *state.conversion.matrix(),
        }
    }
}

/// Packed contents of one uniform buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedBlock {
    pub binding: u32,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumaview_core::ConversionStandard;

    fn table() -> UniformTable {
        UniformTable::new(
            [
                UniformLocation::Texture { binding: 1 },
                UniformLocation::Texture { binding: 2 },
                UniformLocation::Value { binding: 0, offset: 0 },
                UniformLocation::Value { binding: 0, offset: 4 },
                UniformLocation::Value { binding: 0, offset: 8 },
                UniformLocation::Value { binding: 0, offset: 16 },
            ],
            smallvec::smallvec![UniformBlock { binding: 0, size: 64 }],
            3,
        )
    }

    fn read_f32(bytes: &[u8], offset: usize) -> f32 {
        f32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_pack_places_values_at_offsets() {
        let state = RenderState {
            luma_threshold: 0.25,
            chroma_threshold: 0.75,
            rotation_angle: 1.5,
            conversion: ConversionStandard::Sd,
            ..RenderState::default()
        };
        let packed = table().pack(&UniformValues::from_state(&state));
        assert_eq!(packed.len(), 1);
        let bytes = &packed[0].bytes;
        assert_eq!(bytes.len(), 64);
        assert_eq!(read_f32(bytes, 0), 0.25);
        assert_eq!(read_f32(bytes, 4), 0.75);
        assert_eq!(read_f32(bytes, 8), 1.5);

        // Column-major, no transpose: second column starts at 16 + 16
        assert_eq!(read_f32(bytes, 16), 1.164);
        assert_eq!(read_f32(bytes, 32), 0.0);
        assert_eq!(read_f32(bytes, 36), -0.392);
        assert_eq!(read_f32(bytes, 40), 2.017);
        assert_eq!(read_f32(bytes, 48), 1.596);
        // Padding lane stays zero
        assert_eq!(read_f32(bytes, 28), 0.0);
    }

    #[test]
    fn test_unpack_reads_back_packed_values() {
        let values = UniformValues {
            luma_threshold: 0.5,
            chroma_threshold: 0.0,
            rotation_angle: -0.3,
            color_conversion: ColorConversionMatrix::BT709,
        };
        let table = table();
        assert_eq!(table.unpack(&table.pack(&values)), Some(values));
        assert_eq!(table.unpack(&[]), None);
    }

    #[test]
    fn test_texture_bindings_per_plane() {
        let table = table();
        assert_eq!(table.texture_binding(Plane::Luma), 1);
        assert_eq!(table.texture_binding(Plane::Chroma), 2);
        assert_eq!(table.sampler_binding(), 3);
    }

    #[test]
    fn test_attribute_slots_are_fixed() {
        assert_eq!(Attribute::Position.location(), 0);
        assert_eq!(Attribute::TexCoord.location(), 1);
        assert_eq!(Attribute::TexCoord.shader_name(), "texCoord");
    }
}
