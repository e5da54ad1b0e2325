// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Translating command buffers into GPU draw state.

use kestrel_arena::MemoryBlock;
use kestrel_encoding::glam::{Mat4, Vec2, Vec3, Vec4};
use kestrel_encoding::{
    CUBE_INDICES, CommandBuffer, CubeDraw, Glyph, MeshDraw, OVERLAY_TO_NDC, QUAD_INDICES, Record,
    RectDraw, RenderInfo, TextDraw, TextureLoad, VertexData, rect_model_matrix, to_row_major,
    world_matrix,
};

use crate::recording::{Command, DrawParams, Pipeline, Recording, Uniforms, Vertex};

const FULL_UV: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

/// Decodes `buffers`, in order, into a [`Recording`].
///
/// This is a single pass over the records. World-space draws are transformed by
/// the camera and projection of `info`, overlay draws and glyphs by the overlay
/// mapping, so every draw carries its complete clip-space transform.
///
/// # Panics
///
/// If a payload span is stale, or a draw uses a mesh that was never uploaded. The
/// standard meshes are uploaded by [`Encoder::ensure_standard_meshes`].
///
/// [`Encoder::ensure_standard_meshes`]: kestrel_encoding::Encoder::ensure_standard_meshes
pub fn decode(block: &MemoryBlock, buffers: &[&CommandBuffer], info: &RenderInfo) -> Recording {
    let mut decoder = Decoder {
        block,
        info,
        view_projection: info.view_projection(),
        overlay: OVERLAY_TO_NDC * overlay_normalization(info),
        recording: Recording {
            clear: info.clear,
            commands: Vec::new(),
        },
    };
    let mut records = 0;
    for buffer in buffers {
        for record in buffer.records(block) {
            records += 1;
            decoder.record(&record);
        }
    }
    log::debug!(
        "decoded {records} records into {} commands ({} draws)",
        decoder.recording.commands.len(),
        decoder.recording.draw_count()
    );
    decoder.recording
}

/// Scales initial-size pixels to `0..1`. Depth is flattened since overlays are
/// drawn in submission order.
fn overlay_normalization(info: &RenderInfo) -> Mat4 {
    let size = info.initial_size.as_vec2().max(Vec2::ONE);
    Mat4::from_scale(Vec3::new(1.0 / size.x, 1.0 / size.y, 0.0))
}

struct Decoder<'a> {
    block: &'a MemoryBlock,
    info: &'a RenderInfo,
    view_projection: Mat4,
    overlay: Mat4,
    recording: Recording,
}

impl Decoder<'_> {
    fn record(&mut self, record: &Record) {
        match record {
            Record::InitVertexData(data) => self.upload_mesh(data),
            Record::LoadTexture(load) => self.upload_texture(load),
            Record::DrawRect(rect) => self.rect(rect, Pipeline::Basic),
            Record::DrawRectOverlay(rect) => self.rect(rect, Pipeline::Overlay),
            Record::DrawText(text) => self.text(text),
            Record::DrawCube(cube) => self.cube(cube),
            Record::DrawMesh(mesh) => self.mesh(mesh),
            Record::Line(_) => log::trace!("line records are only drawn by the software renderer"),
        }
    }

    fn upload_mesh(&mut self, data: &VertexData) {
        let vertices = Vertex::unpack(&data.layout, self.block.slice::<f32>(data.vertices));
        let indices = self.block.slice::<u16>(data.indices).to_vec();
        self.recording.push(Command::UploadMesh {
            mesh: data.mesh,
            vertices,
            indices,
        });
    }

    fn upload_texture(&mut self, load: &TextureLoad) {
        let pixels = self
            .block
            .slice::<u32>(load.pixels)
            .iter()
            .flat_map(|pixel| pixel.to_le_bytes())
            .collect();
        self.recording.push(Command::UploadTexture {
            texture: load.texture,
            width: load.width,
            height: load.height,
            pixels,
        });
    }

    /// # Panics
    ///
    /// If the mesh was never uploaded.
    fn draw(&mut self, params: DrawParams) {
        assert!(
            !params.mesh.is_none(),
            "draw with {:?} pipeline references a mesh that was never uploaded",
            params.pipeline
        );
        self.recording.push(Command::Draw(params));
    }

    fn rect(&mut self, rect: &RectDraw, pipeline: Pipeline) {
        let model = rect_model_matrix(rect.local_min, rect.local_max, &rect.transform);
        let transform = match pipeline {
            Pipeline::Basic => self.view_projection * model,
            Pipeline::Overlay | Pipeline::Text => self.overlay * model,
        };
        let uv_rect = [rect.uv_min.x, rect.uv_min.y, rect.uv_max.x, rect.uv_max.y];
        self.draw(DrawParams {
            pipeline,
            mesh: self.info.rect_mesh,
            texture: rect.texture,
            index_count: QUAD_INDICES.len() as u32,
            world: to_row_major(world_matrix(&rect.transform)),
            uniforms: Uniforms::new(transform, rect.tint, uv_rect, rect.texture),
        });
    }

    fn text(&mut self, text: &TextDraw) {
        let block = self.block;
        let glyphs = block.slice::<Glyph>(text.glyphs);
        for glyph in glyphs.iter().take(text.glyph_count as usize) {
            let min = Vec2::from(glyph.min);
            let size = Vec2::from(glyph.size);
            let model = Mat4::from_translation(min.extend(0.0)) * Mat4::from_scale(size.extend(1.0));
            self.draw(DrawParams {
                pipeline: Pipeline::Text,
                mesh: self.info.text_mesh,
                texture: text.texture,
                index_count: QUAD_INDICES.len() as u32,
                world: to_row_major(model),
                uniforms: Uniforms::new(
                    self.overlay * model,
                    text.tint,
                    [glyph.uv_min[0], glyph.uv_min[1], glyph.uv_max[0], glyph.uv_max[1]],
                    text.texture,
                ),
            });
        }
    }

    fn cube(&mut self, cube: &CubeDraw) {
        let world = world_matrix(&cube.transform);
        self.draw(DrawParams {
            pipeline: Pipeline::Basic,
            mesh: self.info.cube_mesh,
            texture: cube.texture,
            index_count: CUBE_INDICES.len() as u32,
            world: to_row_major(world),
            uniforms: Uniforms::new(self.view_projection * world, cube.tint, FULL_UV, cube.texture),
        });
    }

    fn mesh(&mut self, mesh: &MeshDraw) {
        self.draw(DrawParams {
            pipeline: Pipeline::Basic,
            mesh: mesh.mesh,
            texture: mesh.texture,
            index_count: mesh.index_count,
            world: to_row_major(mesh.world),
            uniforms: Uniforms::new(
                self.view_projection * mesh.world,
                Vec4::ONE,
                FULL_UV,
                mesh.texture,
            ),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::decode;
    use crate::recording::{Command, Pipeline, Recording};
    use kestrel_arena::{MemoryBlock, MemoryOptions, PartitionId};
    use kestrel_encoding::glam::{Mat4, UVec2, Vec2, Vec3, Vec4};
    use kestrel_encoding::{
        Bitmap, Color, CommandBuffer, Cube, Encoder, Glyph, MeshId, Origin, Rect, RenderInfo,
        TextureId,
    };

    struct Fixture {
        block: MemoryBlock,
        buffer: CommandBuffer,
        info: RenderInfo,
        frame: PartitionId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut block = MemoryBlock::new(MemoryOptions {
                total_size: 1 << 18,
                permanent_size: 0,
            });
            let frame = block.create_partition("frame", 1 << 16);
            let commands = block.create_partition("commands", 1 << 16);
            let buffer = CommandBuffer::new(&mut block, commands, 1 << 16);
            let mut fixture = Self {
                block,
                buffer,
                info: RenderInfo::new(UVec2::new(320, 180), 0.1),
                frame,
            };
            fixture.encoder().ensure_standard_meshes();
            fixture
        }

        fn encoder(&mut self) -> Encoder<'_> {
            Encoder::new(&mut self.block, &mut self.buffer, &mut self.info, self.frame)
        }

        fn decode(&self) -> Recording {
            decode(&self.block, &[&self.buffer], &self.info)
        }
    }

    fn clip(uniforms: &[[f32; 4]; 4], point: Vec3) -> Vec4 {
        let rows = Mat4::from_cols_array_2d(uniforms).transpose();
        rows * point.extend(1.0)
    }

    #[test]
    fn standard_meshes_are_uploaded_first() {
        let fixture = Fixture::new();
        let recording = fixture.decode();
        assert_eq!(recording.commands.len(), 3);
        let meshes: Vec<_> = recording
            .commands
            .iter()
            .map(|command| match command {
                Command::UploadMesh { mesh, indices, .. } => (*mesh, indices.len()),
                other => panic!("unexpected command {other:?}"),
            })
            .collect();
        assert_eq!(
            meshes,
            [
                (fixture.info.rect_mesh, 6),
                (fixture.info.cube_mesh, 36),
                (fixture.info.text_mesh, 6)
            ]
        );
    }

    #[test]
    fn world_rect_round_trips() {
        let mut fixture = Fixture::new();
        fixture.encoder().push_draw_rect(
            &Rect::new(Vec2::ONE)
                .with_position(Vec2::new(2.0, 3.0))
                .with_color(Color::RED),
        );
        let recording = fixture.decode();
        let draw = recording.draws().next().expect("one draw");
        assert_eq!(draw.pipeline, Pipeline::Basic);
        assert_eq!(draw.mesh, fixture.info.rect_mesh);
        assert_eq!(draw.texture, TextureId::NONE);
        assert_eq!(draw.index_count, 6);
        assert_eq!(draw.world[0][3], 2.0);
        assert_eq!(draw.world[1][3], 3.0);
        assert_eq!(draw.uniforms.tint, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(draw.uniforms.sample_texture, 0);
        assert_eq!(draw.uniforms.uv_rect, [0.0, 0.0, 1.0, 1.0]);

        let expected = fixture.info.view_projection() * Vec3::new(2.0, 3.0, 0.0).extend(1.0);
        let actual = clip(&draw.uniforms.transform, Vec3::ZERO);
        assert!((expected - actual).abs().max_element() < 1e-5);
    }

    #[test]
    fn full_screen_overlay_spans_ndc() {
        let mut fixture = Fixture::new();
        fixture.encoder().push_draw_rect_overlay(
            &Rect::new(Vec2::new(320.0, 180.0))
                .with_origin(Origin::BottomLeft)
                .with_depth(3.0),
        );
        let recording = fixture.decode();
        let draw = recording.draws().next().expect("one draw");
        assert_eq!(draw.pipeline, Pipeline::Overlay);
        let bottom_left = clip(&draw.uniforms.transform, Vec3::ZERO);
        let top_right = clip(&draw.uniforms.transform, Vec3::new(1.0, 1.0, 0.0));
        assert!((bottom_left - Vec4::new(-1.0, -1.0, 0.0, 1.0)).abs().max_element() < 1e-5);
        assert!((top_right - Vec4::new(1.0, 1.0, 0.0, 1.0)).abs().max_element() < 1e-5);
    }

    #[test]
    fn text_draws_once_per_glyph() {
        let mut fixture = Fixture::new();
        let glyph = Glyph {
            uv_min: [0.25, 0.5],
            uv_max: [0.5, 0.75],
            min: [32.0, 18.0],
            size: [8.0, 9.0],
            baseline: 0.0,
        };
        fixture
            .encoder()
            .push_draw_text(&[glyph; 3], TextureId(7), Color::WHITE);
        let recording = fixture.decode();
        assert_eq!(recording.draw_count(), 3);
        let draw = recording.draws().next().expect("glyph draw");
        assert_eq!(draw.pipeline, Pipeline::Text);
        assert_eq!(draw.mesh, fixture.info.text_mesh);
        assert_eq!(draw.uniforms.uv_rect, [0.25, 0.5, 0.5, 0.75]);
        assert_eq!(draw.uniforms.sample_texture, 1);
        let corner = clip(&draw.uniforms.transform, Vec3::ZERO);
        assert!((corner.x - (2.0 * 32.0 / 320.0 - 1.0)).abs() < 1e-5);
        assert!((corner.y - (2.0 * 18.0 / 180.0 - 1.0)).abs() < 1e-5);
    }

    #[test]
    fn cubes_use_the_standard_cube() {
        let mut fixture = Fixture::new();
        fixture
            .encoder()
            .push_draw_cube(&Cube::new(Vec3::splat(2.0), Vec3::new(0.0, 0.0, 5.0)));
        let recording = fixture.decode();
        let draw = recording.draws().next().expect("cube draw");
        assert_eq!(draw.mesh, fixture.info.cube_mesh);
        assert_eq!(draw.index_count, 36);
        assert_eq!(draw.world[2][3], 5.0);
        assert_eq!(draw.world[0][0], 2.0);
    }

    #[test]
    fn meshes_are_untinted() {
        let mut fixture = Fixture::new();
        let mesh = fixture.info.rect_mesh;
        fixture
            .encoder()
            .push_draw_mesh(mesh, TextureId::NONE, Mat4::IDENTITY, 6);
        let recording = fixture.decode();
        let draw = recording.draws().next().expect("mesh draw");
        assert_eq!(draw.uniforms.tint, [1.0; 4]);
        assert_eq!(draw.index_count, 6);
    }

    #[test]
    fn textures_upload_as_bgra_bytes() {
        let mut fixture = Fixture::new();
        let texture = fixture
            .encoder()
            .push_load_texture(&Bitmap::solid(2, 1, Color::from_rgba8(10, 20, 30, 255)));
        let recording = fixture.decode();
        let upload = recording.commands.iter().find_map(|command| match command {
            Command::UploadTexture {
                texture: id,
                width,
                height,
                pixels,
            } => Some((*id, *width, *height, pixels.clone())),
            _ => None,
        });
        assert_eq!(
            upload,
            Some((texture, 2, 1, vec![30, 20, 10, 255, 30, 20, 10, 255]))
        );
    }

    #[test]
    #[should_panic(expected = "mesh that was never uploaded")]
    fn rect_without_standard_meshes_is_fatal() {
        let mut block = MemoryBlock::new(MemoryOptions {
            total_size: 1 << 16,
            permanent_size: 0,
        });
        let frame = block.create_partition("frame", 1 << 12);
        let commands = block.create_partition("commands", 1 << 12);
        let mut buffer = CommandBuffer::new(&mut block, commands, 1 << 12);
        let mut info = RenderInfo::new(UVec2::new(320, 180), 0.1);
        Encoder::new(&mut block, &mut buffer, &mut info, frame)
            .push_draw_rect(&Rect::new(Vec2::ONE));
        decode(&block, &[&buffer], &info);
    }

    #[test]
    #[should_panic(expected = "mesh that was never uploaded")]
    fn mesh_zero_is_fatal() {
        let mut fixture = Fixture::new();
        fixture
            .encoder()
            .push_draw_mesh(MeshId::NONE, TextureId::NONE, Mat4::IDENTITY, 6);
        fixture.decode();
    }

    #[test]
    fn lines_are_not_drawn() {
        let mut fixture = Fixture::new();
        fixture
            .encoder()
            .push_line(Vec2::ZERO, Vec2::ONE, Color::WHITE, 0.1);
        assert_eq!(fixture.decode().draw_count(), 0);
    }
}
