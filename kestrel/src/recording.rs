// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};
use kestrel_encoding::glam::{Mat4, Vec4};
use kestrel_encoding::{ClearParams, MeshId, TextureId, VertexLayout, to_row_major};

/// List of [`Command`]s for an engine to execute in order.
#[derive(Clone, Debug, Default)]
pub struct Recording {
    pub clear: ClearParams,
    pub commands: Vec<Command>,
}

impl Recording {
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// The draw commands, in submission order.
    pub fn draws(&self) -> impl Iterator<Item = &DrawParams> {
        self.commands.iter().filter_map(|command| match command {
            Command::Draw(params) => Some(params),
            _ => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.draws().count()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Creates the vertex and index buffers of a mesh.
    UploadMesh {
        mesh: MeshId,
        vertices: Vec<Vertex>,
        indices: Vec<u16>,
    },
    /// Creates a texture. `pixels` are premultiplied BGRA bytes, bottom row first.
    UploadTexture {
        texture: TextureId,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    /// One indexed draw.
    Draw(DrawParams),
}

/// The render pipeline a draw goes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pipeline {
    /// World-space quads, cubes and meshes, depth tested with `LESS`.
    Basic,
    /// Screen-space quads, drawn over everything.
    Overlay,
    /// Glyph quads, tinted by the atlas coverage.
    Text,
}

impl Pipeline {
    pub const ALL: [Self; 3] = [Self::Basic, Self::Overlay, Self::Text];
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawParams {
    pub pipeline: Pipeline,
    pub mesh: MeshId,
    pub texture: TextureId,
    pub index_count: u32,
    /// Model matrix of the draw, row-major.
    pub world: [[f32; 4]; 4],
    pub uniforms: Uniforms,
}

/// The uniform block of a draw, laid out as the shader's `Uniforms` struct.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Uniforms {
    /// Model to clip space, row-major.
    pub transform: [[f32; 4]; 4],
    /// Straight alpha RGBA.
    pub tint: [f32; 4],
    /// `uv_min.xy, uv_max.xy`.
    pub uv_rect: [f32; 4],
    /// Non-zero when the bound texture is sampled.
    pub sample_texture: u32,
    pub _padding: [u32; 3],
}

impl Uniforms {
    pub fn new(transform: Mat4, tint: Vec4, uv_rect: [f32; 4], texture: TextureId) -> Self {
        Self {
            transform: to_row_major(transform),
            tint: tint.to_array(),
            uv_rect,
            sample_texture: u32::from(!texture.is_none()),
            _padding: [0; 3],
        }
    }
}

/// The vertex format every uploaded mesh is converted to.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Unpacks interleaved vertex data.
    ///
    /// Missing colors default to white and missing texture coordinates to the
    /// position's `x` and `y`, which is the right mapping for the unit quads.
    pub fn unpack(layout: &VertexLayout, data: &[f32]) -> Vec<Self> {
        (0..layout.vertex_count(data))
            .map(|index| {
                let position = layout.position(data, index);
                Self {
                    position: position.to_array(),
                    color: layout
                        .color(data, index)
                        .map_or([1.0; 3], |color| color.to_array()),
                    tex_coord: layout
                        .tex_coord(data, index)
                        .unwrap_or(position.truncate())
                        .to_array(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Uniforms, Vertex};
    use kestrel_encoding::glam::{Mat4, Vec3, Vec4};
    use kestrel_encoding::{TextureId, cube_vertices, rect_vertices, text_quad_vertices};

    #[test]
    fn uniforms_match_the_shader_layout() {
        assert_eq!(size_of::<Uniforms>(), 112);
        assert_eq!(size_of::<Vertex>(), 32);
    }

    #[test]
    fn uniforms_store_rows() {
        let uniforms = Uniforms::new(
            Mat4::from_translation(Vec3::new(2.0, 3.0, 4.0)),
            Vec4::ONE,
            [0.0, 0.0, 1.0, 1.0],
            TextureId::NONE,
        );
        assert_eq!(uniforms.transform[0], [1.0, 0.0, 0.0, 2.0]);
        assert_eq!(uniforms.transform[2], [0.0, 0.0, 1.0, 4.0]);
        assert_eq!(uniforms.sample_texture, 0);
        let textured = Uniforms::new(Mat4::IDENTITY, Vec4::ONE, [0.0; 4], TextureId(3));
        assert_eq!(textured.sample_texture, 1);
    }

    #[test]
    fn standard_meshes_unpack() {
        let (layout, data) = rect_vertices();
        let rect = Vertex::unpack(&layout, &data);
        assert_eq!(rect.len(), 4);
        assert!(rect.iter().all(|vertex| vertex.color == [1.0; 3]));
        assert_eq!(rect[2].tex_coord, [1.0, 1.0]);

        let (layout, data) = cube_vertices();
        assert_eq!(Vertex::unpack(&layout, &data).len(), 8);

        let (layout, data) = text_quad_vertices();
        let text = Vertex::unpack(&layout, &data);
        assert_eq!(text.len(), 4);
        assert!(
            text.iter()
                .all(|vertex| vertex.tex_coord == [vertex.position[0], vertex.position[1]])
        );
    }
}
