// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use glam::{Mat4, Vec2, Vec3};
use kestrel_arena::{MemoryBlock, PartitionId};

use crate::bitmap::Bitmap;
use crate::buffer::CommandBuffer;
use crate::color::Color;
use crate::info::{ClearParams, RenderInfo};
use crate::math::{Origin, Projection, Transform, invert, world_matrix};
use crate::mesh::{
    CUBE_INDICES, QUAD_INDICES, VertexLayout, cube_vertices, rect_vertices, text_quad_vertices,
};
use crate::record::{
    CubeDraw, Glyph, LineDraw, MAX_GLYPHS, MeshDraw, MeshId, Record, RectDraw, TextDraw,
    TextureId, TextureLoad, VertexData,
};
use crate::text::GlyphAtlas;
use crate::{Error, Result};

/// A rectangle as described by game code.
///
/// The position lives in `transform.translation`; `origin` says which point of the
/// rectangle it refers to. Rotation and scale pivot around that point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub size: Vec2,
    pub origin: Origin,
    pub transform: Transform,
    pub color: Color,
    pub texture: TextureId,
    pub uv_min: Vec2,
    pub uv_max: Vec2,
}

impl Rect {
    pub fn new(size: Vec2) -> Self {
        Self {
            size,
            origin: Origin::default(),
            transform: Transform::IDENTITY,
            color: Color::WHITE,
            texture: TextureId::NONE,
            uv_min: Vec2::ZERO,
            uv_max: Vec2::ONE,
        }
    }

    /// Places the rectangle's origin at `position`, keeping its depth.
    pub fn with_position(mut self, position: Vec2) -> Self {
        self.transform.translation = position.extend(self.transform.translation.z);
        self
    }

    pub fn with_depth(mut self, depth: f32) -> Self {
        self.transform.translation.z = depth;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Maps the whole texture onto the rectangle.
    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = texture;
        self
    }

    /// Restricts sampling to a sub-rectangle of the texture.
    pub fn with_uv(mut self, uv_min: Vec2, uv_max: Vec2) -> Self {
        self.uv_min = uv_min;
        self.uv_max = uv_max;
        self
    }

    /// Corners relative to the position.
    pub fn local_min_max(&self) -> (Vec2, Vec2) {
        self.origin.min_max(Vec2::ZERO, self.size)
    }

    /// World-space corner of `local_min`.
    pub fn world_min(&self) -> Vec2 {
        self.to_world(self.local_min_max().0)
    }

    /// World-space corner of `local_max`.
    pub fn world_max(&self) -> Vec2 {
        self.to_world(self.local_min_max().1)
    }

    pub fn width(&self) -> f32 {
        self.world_max().x - self.world_min().x
    }

    pub fn height(&self) -> f32 {
        self.world_max().y - self.world_min().y
    }

    /// Resizes along x in world units. The origin stays put, so center-anchored
    /// rectangles grow on both sides and left-anchored ones grow to the right.
    pub fn set_width(&mut self, width: f32) {
        self.size.x = width / self.transform.scale.x;
    }

    /// Resizes along y in world units. Top-left rectangles keep their top edge,
    /// bottom-anchored ones their bottom edge.
    pub fn set_height(&mut self, height: f32) {
        self.size.y = height / self.transform.scale.y;
    }

    /// Moves and resizes the rectangle so its corners land on `min` and `max` in
    /// world space, keeping rotation, scale, depth and origin.
    ///
    /// # Panics
    ///
    /// If `max` is below `min` on either axis, or the transform has a zero scale.
    pub fn set_world_min_max(&mut self, min: Vec2, max: Vec2) {
        assert!(
            max.x >= min.x && max.y >= min.y,
            "world max {max} is below world min {min}"
        );
        let world = world_matrix(&self.transform);
        let to_local = invert(world);
        let local_min = to_local.transform_point3(min.extend(self.transform.translation.z));
        let local_max = to_local.transform_point3(max.extend(self.transform.translation.z));
        self.size = (local_max - local_min).truncate();
        let anchored_min = self.origin.min_max(Vec2::ZERO, self.size).0;
        let anchor = local_min.truncate() - anchored_min;
        self.transform.translation = world.transform_point3(anchor.extend(0.0));
    }

    fn to_world(&self, local: Vec2) -> Vec2 {
        world_matrix(&self.transform)
            .transform_point3(local.extend(0.0))
            .truncate()
    }

    /// Four thin rectangles lying inside the bounds, untextured.
    fn outline(&self, thickness: f32) -> [RectDraw; 4] {
        let (min, max) = self.local_min_max();
        let untextured = Self {
            texture: TextureId::NONE,
            ..*self
        };
        [
            (min, Vec2::new(max.x, min.y + thickness)),
            (Vec2::new(min.x, max.y - thickness), max),
            (min, Vec2::new(min.x + thickness, max.y)),
            (Vec2::new(max.x - thickness, min.y), max),
        ]
        .map(|(edge_min, edge_max)| untextured.draw(edge_min, edge_max))
    }

    fn draw(&self, local_min: Vec2, local_max: Vec2) -> RectDraw {
        RectDraw {
            local_min,
            local_max,
            origin: self.origin,
            transform: self.transform,
            tint: self.color.to_vec4(),
            texture: self.texture,
            uv_min: self.uv_min,
            uv_max: self.uv_max,
        }
    }
}

/// A box as described by game code, centered on `transform.translation`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cube {
    pub size: Vec3,
    pub transform: Transform,
    pub color: Color,
    pub texture: TextureId,
}

impl Cube {
    pub fn new(size: Vec3, position: Vec3) -> Self {
        Self {
            size,
            transform: Transform::from_translation(position),
            color: Color::WHITE,
            texture: TextureId::NONE,
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = texture;
        self
    }
}

/// Writes records into a [`CommandBuffer`].
///
/// Variable-length payloads are copied into `partition` before their record is
/// pushed, so the caller's slices can be dropped or reused as soon as a method
/// returns. Every push is fatal on overflow, like [`CommandBuffer::push`].
#[derive(Debug)]
pub struct Encoder<'a> {
    block: &'a mut MemoryBlock,
    buffer: &'a mut CommandBuffer,
    info: &'a mut RenderInfo,
    partition: PartitionId,
}

impl<'a> Encoder<'a> {
    pub fn new(
        block: &'a mut MemoryBlock,
        buffer: &'a mut CommandBuffer,
        info: &'a mut RenderInfo,
        partition: PartitionId,
    ) -> Self {
        Self {
            block,
            buffer,
            info,
            partition,
        }
    }

    pub fn info(&self) -> &RenderInfo {
        &*self.info
    }

    fn push(&mut self, record: &Record) {
        self.buffer.push(self.block, record);
    }

    /// Uploads a mesh and returns its freshly assigned id.
    ///
    /// # Panics
    ///
    /// If the payload partition or the command buffer is full, or `layout.stride` is
    /// too narrow for its attributes.
    pub fn push_init_vertex_data(
        &mut self,
        vertices: &[f32],
        indices: &[u16],
        layout: VertexLayout,
    ) -> MeshId {
        assert!(
            layout.fits_stride(),
            "vertex stride of {} floats is narrower than the {} floats of its attributes",
            layout.stride,
            VertexLayout::packed(layout.attributes).stride
        );
        self.info.renderables_loaded += 1;
        let mesh = MeshId(self.info.renderables_loaded);
        let vertices = self.block.push_slice(self.partition, vertices);
        let indices = self.block.push_slice(self.partition, indices);
        self.push(&Record::InitVertexData(VertexData {
            mesh,
            vertices,
            indices,
            layout,
        }));
        mesh
    }

    /// Uploads a bitmap and returns its freshly assigned id.
    pub fn push_load_texture(&mut self, bitmap: &Bitmap) -> TextureId {
        self.info.textures_loaded += 1;
        let texture = TextureId(self.info.textures_loaded);
        let pixels = self.block.push_slice(self.partition, bitmap.pixels());
        self.push(&Record::LoadTexture(TextureLoad {
            texture,
            pixels,
            width: bitmap.width(),
            height: bitmap.height(),
        }));
        texture
    }

    /// Uploads the unit rect, unit cube and text quad unless that already happened.
    pub fn ensure_standard_meshes(&mut self) {
        self.rect_mesh();
        self.cube_mesh();
        self.text_mesh();
    }

    pub fn rect_mesh(&mut self) -> MeshId {
        if self.info.rect_mesh.is_none() {
            let (layout, vertices) = rect_vertices();
            self.info.rect_mesh = self.push_init_vertex_data(&vertices, &QUAD_INDICES, layout);
        }
        self.info.rect_mesh
    }

    pub fn cube_mesh(&mut self) -> MeshId {
        if self.info.cube_mesh.is_none() {
            let (layout, vertices) = cube_vertices();
            self.info.cube_mesh = self.push_init_vertex_data(&vertices, &CUBE_INDICES, layout);
        }
        self.info.cube_mesh
    }

    pub fn text_mesh(&mut self) -> MeshId {
        if self.info.text_mesh.is_none() {
            let (layout, vertices) = text_quad_vertices();
            self.info.text_mesh = self.push_init_vertex_data(&vertices, &QUAD_INDICES, layout);
        }
        self.info.text_mesh
    }

    /// Draws a rectangle in world space.
    pub fn push_draw_rect(&mut self, rect: &Rect) {
        let (local_min, local_max) = rect.local_min_max();
        self.push(&Record::DrawRect(rect.draw(local_min, local_max)));
    }

    /// Draws a rectangle on top of the scene. Positions and sizes are in pixels of the
    /// initial screen size, from the bottom left corner.
    pub fn push_draw_rect_overlay(&mut self, rect: &Rect) {
        let (local_min, local_max) = rect.local_min_max();
        self.push(&Record::DrawRectOverlay(rect.draw(local_min, local_max)));
    }

    /// Draws the border of a world-space rectangle as four thin rectangles lying inside
    /// its bounds.
    pub fn push_draw_rect_outline(&mut self, rect: &Rect, thickness: f32) {
        for edge in rect.outline(thickness) {
            self.push(&Record::DrawRect(edge));
        }
    }

    /// Overlay counterpart of [`Encoder::push_draw_rect_outline`].
    pub fn push_draw_rect_overlay_outline(&mut self, rect: &Rect, thickness: f32) {
        for edge in rect.outline(thickness) {
            self.push(&Record::DrawRectOverlay(edge));
        }
    }

    pub fn push_draw_cube(&mut self, cube: &Cube) {
        let transform = Transform {
            scale: cube.transform.scale * cube.size.abs(),
            ..cube.transform
        };
        self.push(&Record::DrawCube(CubeDraw {
            transform,
            tint: cube.color.to_vec4(),
            texture: cube.texture,
        }));
    }

    pub fn push_draw_mesh(
        &mut self,
        mesh: MeshId,
        texture: TextureId,
        world: Mat4,
        index_count: u32,
    ) {
        self.push(&Record::DrawMesh(MeshDraw {
            mesh,
            texture,
            world,
            index_count,
        }));
    }

    /// Draws pre-positioned glyphs from an atlas texture.
    ///
    /// # Panics
    ///
    /// If there are more than [`MAX_GLYPHS`] glyphs.
    pub fn push_draw_text(&mut self, glyphs: &[Glyph], texture: TextureId, color: Color) {
        self.try_push_draw_text(glyphs, texture, color)
            .unwrap_or_else(|err| panic!("{err}"));
    }

    pub fn try_push_draw_text(
        &mut self,
        glyphs: &[Glyph],
        texture: TextureId,
        color: Color,
    ) -> Result<()> {
        if glyphs.len() > MAX_GLYPHS {
            return Err(Error::TooManyGlyphs(glyphs.len()));
        }
        let span = self.block.try_push_slice(self.partition, glyphs)?;
        self.buffer.try_push(
            self.block,
            &Record::DrawText(TextDraw {
                glyphs: span,
                glyph_count: glyphs.len() as u32,
                texture,
                tint: color.to_vec4(),
            }),
        )
    }

    /// Lays out `text` with `atlas` and draws it. `top_left` is in overlay pixels.
    pub fn push_text(
        &mut self,
        atlas: &GlyphAtlas,
        text: &str,
        top_left: Vec2,
        color: Color,
    ) {
        let run = atlas.layout(text, top_left);
        self.push_draw_text(&run, atlas.texture, color);
    }

    /// Draws a line between two world-space points.
    pub fn push_line(&mut self, start: Vec2, end: Vec2, color: Color, thickness: f32) {
        self.push(&Record::Line(LineDraw {
            start,
            end,
            tint: color.to_vec4(),
            thickness,
        }));
    }

    /// Sets the clear color of the frame, and whether depth is cleared as well.
    pub fn clear(&mut self, color: Color, clear_depth: bool) {
        self.info.clear = ClearParams {
            color: color.to_vec4(),
            clear_depth,
        };
    }

    pub fn set_camera(&mut self, position: Vec3, rotation: Vec3) {
        self.info.camera.position = position;
        self.info.camera.rotation = rotation;
    }

    /// Moves the camera relative to where it is.
    pub fn update_camera(&mut self, translation: Vec3, rotation: Vec3) {
        self.info.camera.update(translation, rotation);
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.info.projection = projection;
    }
}
