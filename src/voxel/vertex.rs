//! Mesh vertex formats produced by the voxel engine.

use bytemuck::{Pod, Zeroable};

use super::color::QuantizedColor;

/// Vertex of a colored-cubes mesh - exactly 16 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ColoredCubesVertex {
    /// Position relative to the owning node
    pub position: [f32; 3],
    /// Face color
    pub color: QuantizedColor,
    _padding: u16,
}

impl ColoredCubesVertex {
    pub fn new(position: [f32; 3], color: QuantizedColor) -> Self {
        Self {
            position,
            color,
            _padding: 0,
        }
    }
}

/// Vertex of a smooth terrain mesh - exactly 28 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    /// Position relative to the owning node
    pub position: [f32; 3],
    /// Surface normal
    pub normal: [f32; 3],
    /// Blend weights of up to four materials
    pub material: [u8; 4],
}

impl TerrainVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], material: [u8; 4]) -> Self {
        Self {
            position,
            normal,
            material,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(std::mem::size_of::<ColoredCubesVertex>(), 16);
        assert_eq!(std::mem::size_of::<TerrainVertex>(), 28);
    }

    #[test]
    fn test_cast_to_bytes() {
        let vertices = [
            ColoredCubesVertex::new([1.0, 2.0, 3.0], QuantizedColor::from_bits(0xF00F)),
            ColoredCubesVertex::new([4.0, 5.0, 6.0], QuantizedColor::WHITE),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 32);
        // Color sits right after the three floats, native byte order
        assert_eq!(u16::from_ne_bytes([bytes[12], bytes[13]]), 0xF00F);
    }
}
