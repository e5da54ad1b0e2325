// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vertex layouts and the built-in meshes.

use glam::{Vec2, Vec3};

/// Attributes present in an interleaved vertex.
///
/// Attributes are stored in bit order: position (3 floats), color (3), texture
/// coordinates (2), normal (3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexAttributes(pub u32);

impl VertexAttributes {
    pub const POSITION: Self = Self(1);
    pub const COLOR: Self = Self(2);
    pub const TEX_COORD: Self = Self(4);
    pub const NORMAL: Self = Self(8);
    const ALL: u32 = 0xF;

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub(crate) fn is_valid(self) -> bool {
        self.0 & !Self::ALL == 0 && self.contains(Self::POSITION)
    }
}

impl core::ops::BitOr for VertexAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Describes how to read one interleaved vertex out of an `f32` slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub attributes: VertexAttributes,
    /// Floats per vertex.
    pub stride: u32,
}

impl VertexLayout {
    /// The tightly packed layout of `attributes`.
    pub const fn packed(attributes: VertexAttributes) -> Self {
        let mut stride = 0;
        if attributes.contains(VertexAttributes::POSITION) {
            stride += 3;
        }
        if attributes.contains(VertexAttributes::COLOR) {
            stride += 3;
        }
        if attributes.contains(VertexAttributes::TEX_COORD) {
            stride += 2;
        }
        if attributes.contains(VertexAttributes::NORMAL) {
            stride += 3;
        }
        Self { attributes, stride }
    }

    /// Whether one stride holds every declared attribute.
    pub const fn fits_stride(&self) -> bool {
        self.stride >= Self::packed(self.attributes).stride
    }

    fn offset_of(&self, attribute: VertexAttributes) -> Option<usize> {
        if !self.attributes.contains(attribute) {
            return None;
        }
        let mut offset = 0;
        for (flag, width) in [
            (VertexAttributes::POSITION, 3),
            (VertexAttributes::COLOR, 3),
            (VertexAttributes::TEX_COORD, 2),
            (VertexAttributes::NORMAL, 3),
        ] {
            if flag == attribute {
                return Some(offset);
            }
            if self.attributes.contains(flag) {
                offset += width;
            }
        }
        None
    }

    /// Number of whole vertices in `data`.
    pub fn vertex_count(&self, data: &[f32]) -> usize {
        if self.stride == 0 {
            0
        } else {
            data.len() / self.stride as usize
        }
    }

    fn vec3(&self, data: &[f32], index: usize, attribute: VertexAttributes) -> Option<Vec3> {
        let at = index * self.stride as usize + self.offset_of(attribute)?;
        Some(Vec3::from_slice(&data[at..at + 3]))
    }

    pub fn position(&self, data: &[f32], index: usize) -> Vec3 {
        self.vec3(data, index, VertexAttributes::POSITION)
            .unwrap_or(Vec3::ZERO)
    }

    pub fn color(&self, data: &[f32], index: usize) -> Option<Vec3> {
        self.vec3(data, index, VertexAttributes::COLOR)
    }

    pub fn normal(&self, data: &[f32], index: usize) -> Option<Vec3> {
        self.vec3(data, index, VertexAttributes::NORMAL)
    }

    pub fn tex_coord(&self, data: &[f32], index: usize) -> Option<Vec2> {
        let at = index * self.stride as usize + self.offset_of(VertexAttributes::TEX_COORD)?;
        Some(Vec2::from_slice(&data[at..at + 2]))
    }
}

/// Corners of the unit quad, counter-clockwise from the origin.
pub const QUAD_POSITIONS: [[f32; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
];

pub const QUAD_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

pub const QUAD_INDICES: [u16; 6] = [0, 2, 1, 0, 3, 2];

/// Corners of the unit cube centered on the origin.
pub const CUBE_POSITIONS: [[f32; 3]; 8] = [
    [-0.5, 0.5, -0.5],
    [0.5, 0.5, -0.5],
    [-0.5, -0.5, -0.5],
    [0.5, -0.5, -0.5],
    [0.5, -0.5, 0.5],
    [0.5, 0.5, 0.5],
    [-0.5, 0.5, 0.5],
    [-0.5, -0.5, 0.5],
];

pub const CUBE_INDICES: [u16; 36] = [
    0, 2, 1, 3, 1, 2, // front
    1, 3, 4, 4, 5, 1, // right
    4, 7, 5, 5, 7, 6, // back
    0, 6, 7, 2, 0, 7, // left
    6, 0, 5, 1, 5, 0, // top
    3, 2, 4, 2, 7, 4, // bottom
];

/// The unit quad with white vertex colors and texture coordinates.
pub fn rect_vertices() -> (VertexLayout, Vec<f32>) {
    let layout = VertexLayout::packed(
        VertexAttributes::POSITION | VertexAttributes::COLOR | VertexAttributes::TEX_COORD,
    );
    let mut data = Vec::with_capacity(layout.stride as usize * 4);
    for (position, uv) in QUAD_POSITIONS.iter().zip(QUAD_UVS) {
        data.extend_from_slice(position);
        data.extend_from_slice(&[1.0, 1.0, 1.0]);
        data.extend_from_slice(&uv);
    }
    (layout, data)
}

/// The unit cube with white vertex colors.
pub fn cube_vertices() -> (VertexLayout, Vec<f32>) {
    let layout = VertexLayout::packed(VertexAttributes::POSITION | VertexAttributes::COLOR);
    let mut data = Vec::with_capacity(layout.stride as usize * CUBE_POSITIONS.len());
    for position in &CUBE_POSITIONS {
        data.extend_from_slice(position);
        data.extend_from_slice(&[1.0, 1.0, 1.0]);
    }
    (layout, data)
}

/// The unit quad used for glyphs. Positions only.
pub fn text_quad_vertices() -> (VertexLayout, Vec<f32>) {
    let layout = VertexLayout::packed(VertexAttributes::POSITION);
    (layout, QUAD_POSITIONS.concat())
}

#[cfg(test)]
mod tests {
    use super::{
        CUBE_INDICES, CUBE_POSITIONS, VertexAttributes, VertexLayout, cube_vertices,
        rect_vertices, text_quad_vertices,
    };
    use glam::{Vec2, Vec3};

    #[test]
    fn packed_strides() {
        assert_eq!(rect_vertices().0.stride, 8);
        assert_eq!(cube_vertices().0.stride, 6);
        assert_eq!(text_quad_vertices().0.stride, 3);
        let all = VertexAttributes::POSITION
            | VertexAttributes::COLOR
            | VertexAttributes::TEX_COORD
            | VertexAttributes::NORMAL;
        assert_eq!(VertexLayout::packed(all).stride, 11);
    }

    #[test]
    fn attributes_are_read_at_sequential_offsets() {
        let (layout, data) = rect_vertices();
        assert_eq!(layout.vertex_count(&data), 4);
        assert_eq!(layout.position(&data, 2), Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(layout.color(&data, 2), Some(Vec3::ONE));
        assert_eq!(layout.tex_coord(&data, 3), Some(Vec2::new(0.0, 1.0)));
        assert_eq!(layout.normal(&data, 0), None);
    }

    #[test]
    fn normals_skip_missing_attributes() {
        let layout = VertexLayout::packed(VertexAttributes::POSITION | VertexAttributes::NORMAL);
        let data = [1.0, 2.0, 3.0, 0.0, 0.0, 1.0];
        assert_eq!(layout.normal(&data, 0), Some(Vec3::Z));
        assert_eq!(layout.color(&data, 0), None);
    }

    #[test]
    fn position_is_required() {
        assert!(VertexAttributes::POSITION.is_valid());
        assert!(!VertexAttributes::COLOR.is_valid());
        assert!(!VertexAttributes(0x11).is_valid());
    }

    #[test]
    fn cube_indices_reference_every_corner() {
        let mut seen = [false; CUBE_POSITIONS.len()];
        for index in CUBE_INDICES {
            seen[usize::from(index)] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
