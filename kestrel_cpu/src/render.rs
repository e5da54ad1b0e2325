// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Walking command buffers into a [`Pixmap`].

use std::collections::HashMap;
use std::num::NonZeroUsize;

use fearless_simd::{Level, Simd, dispatch};
use kestrel_arena::{MemoryBlock, Span};
use kestrel_encoding::glam::{Mat4, UVec2, Vec2, Vec3, Vec4};
use kestrel_encoding::{
    Color, CommandBuffer, Glyph, LineDraw, Record, RectDraw, RenderInfo, TextDraw, TextureId,
    TextureLoad, rect_model_matrix,
};

use crate::dispatch::WorkerPool;
use crate::pixmap::Pixmap;
use crate::raster::{Paint, Quad, Sampler, fill_quad, texture_tint};
use crate::region::{Region, Regions};

/// Options for creating a [`SoftwareRenderer`].
#[derive(Clone, Copy, Debug)]
pub struct SoftwareOptions {
    /// Number of region columns the target is split into.
    pub regions_x: u32,
    /// Number of region rows the target is split into.
    pub regions_y: u32,
    /// Worker thread count. `None` uses the available parallelism.
    pub num_threads: Option<NonZeroUsize>,
    /// The SIMD level used for rasterization.
    pub level: Level,
}

impl Default for SoftwareOptions {
    fn default() -> Self {
        Self {
            regions_x: 8,
            regions_y: 8,
            num_threads: None,
            level: Level::new(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct TextureEntry {
    pixels: Span,
    width: u32,
    height: u32,
}

/// Rasterizes command buffers on the CPU.
///
/// The target is split into regions which are drawn in parallel. Every region walks
/// the whole command stream and draws the part of each quad that falls inside it, so
/// records are composited in push order within every pixel.
///
/// Only rectangles, overlay rectangles, text and lines are drawn. Cubes and meshes
/// need a depth buffer and are left to the hardware renderer.
#[derive(Debug)]
pub struct SoftwareRenderer {
    options: SoftwareOptions,
    pool: WorkerPool,
    /// Textures uploaded by earlier frames. The pixels stay in the partition they were
    /// pushed to.
    textures: HashMap<TextureId, TextureEntry>,
}

/// Everything a region needs to draw a frame. Shared by all workers.
struct Frame<'a> {
    block: &'a MemoryBlock,
    buffers: &'a [&'a CommandBuffer],
    textures: &'a HashMap<TextureId, TextureEntry>,
    clear: u32,
    world_to_pixels: Mat4,
    pixels_per_meter: f32,
    overlay_scale: Vec2,
}

#[derive(Clone, Copy, Debug, Default)]
struct FrameStats {
    records: usize,
    quads: usize,
    skipped: usize,
}

impl SoftwareRenderer {
    /// Creates a renderer and starts its worker threads.
    ///
    /// # Panics
    ///
    /// If a region count is zero.
    pub fn new(options: SoftwareOptions) -> Self {
        assert!(
            options.regions_x > 0 && options.regions_y > 0,
            "the target needs at least one region"
        );
        let pool = WorkerPool::new(options.num_threads);
        log::info!(
            "software renderer: {}x{} regions on {} threads, {:?}",
            options.regions_x,
            options.regions_y,
            pool.num_threads(),
            options.level
        );
        Self {
            options,
            pool,
            textures: HashMap::new(),
        }
    }

    pub fn options(&self) -> &SoftwareOptions {
        &self.options
    }

    /// Number of textures registered so far.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Draws `buffers`, in order, into `target`.
    ///
    /// The target is first filled with the clear color of `info`. Textures loaded by
    /// the buffers are registered and stay available to later frames.
    ///
    /// # Panics
    ///
    /// If a record references a texture that was never loaded, a payload span is
    /// stale, or a texture or glyph payload does not match its declared size.
    pub fn render(
        &mut self,
        block: &MemoryBlock,
        buffers: &[&CommandBuffer],
        info: &RenderInfo,
        target: &mut Pixmap,
    ) {
        let stats = self.prepare(block, buffers);

        let center = Vec2::new(target.width() as f32, target.height() as f32) / 2.0;
        let pixels_per_meter = info.pixels_per_meter;
        let frame = Frame {
            block,
            buffers,
            textures: &self.textures,
            clear: Color::from_vec4(info.clear.color).to_premul_argb(),
            world_to_pixels: Mat4::from_translation(center.extend(0.0))
                * Mat4::from_scale(Vec3::new(pixels_per_meter, pixels_per_meter, 1.0))
                * info.camera.view_matrix(),
            pixels_per_meter,
            overlay_scale: Vec2::new(target.width() as f32, target.height() as f32)
                / info.initial_size.max(UVec2::ONE).as_vec2(),
        };

        let (width, height, pitch) = (target.width(), target.height(), target.pitch());
        let regions = Regions::new(
            width,
            height,
            pitch,
            self.options.regions_x,
            self.options.regions_y,
            target.data_mut(),
        );
        let region_count = regions.len();
        let level = self.options.level;
        self.pool.run(regions.into_vec(), |mut region| {
            dispatch!(level, simd => draw_region(simd, &frame, &mut region));
        });

        log::debug!(
            "software frame: {} records, {} quads, {} skipped, {region_count} regions",
            stats.records,
            stats.quads,
            stats.skipped
        );
    }

    /// Registers the frame's textures and checks every reference before any worker
    /// starts, so that a bad record fails on the calling thread.
    fn prepare(&mut self, block: &MemoryBlock, buffers: &[&CommandBuffer]) -> FrameStats {
        let mut stats = FrameStats::default();
        for buffer in buffers {
            for record in buffer.records(block) {
                stats.records += 1;
                match record {
                    Record::LoadTexture(load) => self.register_texture(block, &load),
                    Record::DrawRect(rect) | Record::DrawRectOverlay(rect) => {
                        self.check_texture(block, rect.texture);
                        stats.quads += 1;
                    }
                    Record::DrawText(text) => {
                        self.check_texture(block, text.texture);
                        let glyphs = block.slice::<Glyph>(text.glyphs);
                        assert_eq!(
                            glyphs.len(),
                            text.glyph_count as usize,
                            "glyph run holds {} glyphs but declares {}",
                            glyphs.len(),
                            text.glyph_count
                        );
                        stats.quads += glyphs.len();
                    }
                    Record::Line(_) => stats.quads += 1,
                    Record::DrawCube(_) | Record::DrawMesh(_) => {
                        log::trace!("software renderer skips {:?}", record.tag());
                        stats.skipped += 1;
                    }
                    Record::InitVertexData(_) => {}
                }
            }
        }
        stats
    }

    fn register_texture(&mut self, block: &MemoryBlock, load: &TextureLoad) {
        let pixels = block.slice::<u32>(load.pixels);
        assert!(
            load.width > 0 && load.height > 0,
            "texture {} is empty ({}x{})",
            load.texture.0,
            load.width,
            load.height
        );
        assert_eq!(
            pixels.len(),
            load.width as usize * load.height as usize,
            "texture {} holds {} pixels, expected {}x{}",
            load.texture.0,
            pixels.len(),
            load.width,
            load.height
        );
        self.textures.insert(
            load.texture,
            TextureEntry {
                pixels: load.pixels,
                width: load.width,
                height: load.height,
            },
        );
    }

    fn check_texture(&self, block: &MemoryBlock, texture: TextureId) {
        if texture.is_none() {
            return;
        }
        let Some(entry) = self.textures.get(&texture) else {
            panic!("unknown texture {}", texture.0);
        };
        // Fails if the partition holding the pixels was released since the load.
        let _ = block.slice::<u32>(entry.pixels);
    }
}

fn draw_region<S: Simd>(simd: S, frame: &Frame<'_>, region: &mut Region<'_>) {
    region.fill(frame.clear);
    if region.is_empty() {
        return;
    }
    for buffer in frame.buffers {
        for record in buffer.records(frame.block) {
            match record {
                Record::DrawRect(rect) => {
                    let to_pixels = frame.world_to_pixels
                        * rect_model_matrix(rect.local_min, rect.local_max, &rect.transform);
                    draw_rect(simd, frame, region, &rect, to_pixels);
                }
                Record::DrawRectOverlay(rect) => {
                    let to_pixels = Mat4::from_scale(frame.overlay_scale.extend(1.0))
                        * rect_model_matrix(rect.local_min, rect.local_max, &rect.transform);
                    draw_rect(simd, frame, region, &rect, to_pixels);
                }
                Record::DrawText(text) => draw_text(simd, frame, region, &text),
                Record::Line(line) => draw_line(simd, frame, region, &line),
                Record::InitVertexData(_)
                | Record::LoadTexture(_)
                | Record::DrawCube(_)
                | Record::DrawMesh(_) => {}
            }
        }
    }
}

/// Draws the unit quad mapped by `to_pixels`.
fn draw_rect<S: Simd>(
    simd: S,
    frame: &Frame<'_>,
    region: &mut Region<'_>,
    rect: &RectDraw,
    to_pixels: Mat4,
) {
    let corner = |x: f32, y: f32| to_pixels.transform_point3(Vec3::new(x, y, 0.0)).truncate();
    let quad = Quad::from_corners(corner(0.0, 0.0), corner(1.0, 0.0), corner(0.0, 1.0));
    let paint = if rect.texture.is_none() {
        Paint::solid(rect.tint)
    } else {
        Paint::Texture(frame.sampler(rect.texture, rect.uv_min, rect.uv_max, rect.tint))
    };
    fill_quad(simd, region, &quad, &paint);
}

fn draw_text<S: Simd>(simd: S, frame: &Frame<'_>, region: &mut Region<'_>, text: &TextDraw) {
    for glyph in frame.block.slice::<Glyph>(text.glyphs) {
        let quad = Quad::from_min_size(
            Vec2::from_array(glyph.min) * frame.overlay_scale,
            Vec2::from_array(glyph.size) * frame.overlay_scale,
        );
        let paint = if text.texture.is_none() {
            Paint::solid(text.tint)
        } else {
            Paint::Texture(frame.sampler(
                text.texture,
                Vec2::from_array(glyph.uv_min),
                Vec2::from_array(glyph.uv_max),
                text.tint,
            ))
        };
        fill_quad(simd, region, &quad, &paint);
    }
}

/// A line is a solid quad of the given world-space thickness centered on the segment.
fn draw_line<S: Simd>(simd: S, frame: &Frame<'_>, region: &mut Region<'_>, line: &LineDraw) {
    let project = |p: Vec2| frame.world_to_pixels.transform_point3(p.extend(0.0)).truncate();
    let start = project(line.start);
    let end = project(line.end);
    let Some(direction) = (end - start).try_normalize() else {
        return;
    };
    let half_width = direction.perp() * (line.thickness * frame.pixels_per_meter / 2.0);
    let quad = Quad::from_corners(start - half_width, end - half_width, start + half_width);
    fill_quad(simd, region, &quad, &Paint::solid(line.tint));
}

impl Frame<'_> {
    fn sampler(&self, texture: TextureId, uv_min: Vec2, uv_max: Vec2, tint: Vec4) -> Sampler<'_> {
        // Checked by `SoftwareRenderer::prepare` before the workers started.
        let entry = self.textures[&texture];
        Sampler {
            texels: self.block.slice::<u32>(entry.pixels),
            width: entry.width,
            height: entry.height,
            uv_min,
            uv_max,
            tint: texture_tint(tint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SoftwareOptions, SoftwareRenderer};
    use crate::pixmap::Pixmap;
    use core::num::NonZeroUsize;
    use kestrel_arena::{MemoryBlock, MemoryOptions, PartitionId};
    use kestrel_encoding::glam::{UVec2, Vec2, Vec3};
    use kestrel_encoding::{
        Bitmap, Color, CommandBuffer, Cube, Encoder, Origin, Rect, RenderInfo, TextureId,
    };

    const SIZE: u32 = 64;

    struct Scene {
        block: MemoryBlock,
        buffer: CommandBuffer,
        info: RenderInfo,
        payload: PartitionId,
        renderer: SoftwareRenderer,
    }

    impl Scene {
        fn new() -> Self {
            let mut block = MemoryBlock::new(MemoryOptions {
                total_size: 1 << 20,
                permanent_size: 0,
            });
            let payload = block.create_partition("payload", 1 << 18);
            let commands = block.create_partition("commands", 1 << 16);
            let buffer = CommandBuffer::new(&mut block, commands, 1 << 16);
            let mut info = RenderInfo::new(UVec2::splat(SIZE), 0.25);
            info.clear.color = Color::BLACK.to_vec4();
            Self {
                block,
                buffer,
                info,
                payload,
                renderer: SoftwareRenderer::new(SoftwareOptions {
                    regions_x: 4,
                    regions_y: 3,
                    num_threads: NonZeroUsize::new(2),
                    ..SoftwareOptions::default()
                }),
            }
        }

        fn encoder(&mut self) -> Encoder<'_> {
            Encoder::new(&mut self.block, &mut self.buffer, &mut self.info, self.payload)
        }

        fn render(&mut self) -> Pixmap {
            let mut target = Pixmap::new(SIZE, SIZE);
            self.renderer
                .render(&self.block, &[&self.buffer], &self.info, &mut target);
            target
        }
    }

    const BLACK: u32 = 0xFF00_0000;

    #[test]
    fn clears_every_region() {
        let mut scene = Scene::new();
        scene.encoder().clear(Color::BLUE, true);
        let target = scene.render();
        assert!(target.data().iter().all(|&pixel| pixel == 0xFF00_00FF));
    }

    #[test]
    fn world_rect_is_centered_on_the_camera() {
        let mut scene = Scene::new();
        // 16 pixels per meter; a 1 m square centered on the origin covers 24..40.
        scene.encoder().push_draw_rect(
            &Rect::new(Vec2::ONE)
                .with_origin(Origin::Center)
                .with_color(Color::RED),
        );
        let target = scene.render();
        assert_eq!(target.pixel(24, 24), 0xFFFF_0000);
        assert_eq!(target.pixel(39, 39), 0xFFFF_0000);
        assert_eq!(target.pixel(23, 32), BLACK);
        assert_eq!(target.pixel(40, 32), BLACK);
    }

    #[test]
    fn later_records_paint_over_earlier_ones() {
        let mut scene = Scene::new();
        let mut encoder = scene.encoder();
        encoder.push_draw_rect_overlay(&Rect::new(Vec2::splat(32.0)).with_color(Color::RED));
        encoder.push_draw_rect_overlay(
            &Rect::new(Vec2::splat(16.0))
                .with_position(Vec2::splat(8.0))
                .with_color(Color::GREEN),
        );
        let target = scene.render();
        assert_eq!(target.pixel(0, 0), 0xFFFF_0000);
        assert_eq!(target.pixel(10, 10), 0xFF00_FF00);
        assert_eq!(target.pixel(40, 40), BLACK);
    }

    #[test]
    fn textured_overlay_samples_the_bitmap() {
        let mut scene = Scene::new();
        let mut encoder = scene.encoder();
        let texture = encoder.push_load_texture(&Bitmap::solid(1, 1, Color::GREEN));
        encoder.push_draw_rect_overlay(
            &Rect::new(Vec2::splat(SIZE as f32)).with_texture(texture),
        );
        let target = scene.render();
        assert_eq!(scene.renderer.texture_count(), 1);
        assert!(target.data().iter().all(|&pixel| pixel == 0xFF00_FF00));
    }

    #[test]
    fn cubes_are_left_to_the_hardware_path() {
        let mut scene = Scene::new();
        scene
            .encoder()
            .push_draw_cube(&Cube::new(Vec3::splat(10.0), Vec3::ZERO).with_color(Color::RED));
        let target = scene.render();
        assert!(target.data().iter().all(|&pixel| pixel == BLACK));
    }

    #[test]
    fn horizontal_line_has_its_thickness() {
        let mut scene = Scene::new();
        // Half a meter thick at 16 pixels per meter: rows 28..36.
        scene
            .encoder()
            .push_line(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), Color::WHITE, 0.5);
        let target = scene.render();
        assert_eq!(target.pixel(32, 28), 0xFFFF_FFFF);
        assert_eq!(target.pixel(32, 35), 0xFFFF_FFFF);
        assert_eq!(target.pixel(32, 27), BLACK);
        assert_eq!(target.pixel(32, 36), BLACK);
        assert_eq!(target.pixel(10, 32), BLACK);
    }

    #[test]
    #[should_panic(expected = "unknown texture 7")]
    fn unknown_texture_is_fatal() {
        let mut scene = Scene::new();
        scene
            .encoder()
            .push_draw_rect(&Rect::new(Vec2::ONE).with_texture(TextureId(7)));
        scene.render();
    }

    #[test]
    #[should_panic(expected = "stale span")]
    fn released_texture_pixels_are_fatal() {
        let mut scene = Scene::new();
        let texture = scene
            .encoder()
            .push_load_texture(&Bitmap::solid(1, 1, Color::WHITE));
        scene.render();
        scene.buffer.reset();
        scene.block.release(scene.payload);
        scene
            .encoder()
            .push_draw_rect(&Rect::new(Vec2::ONE).with_texture(texture));
        scene.render();
    }
}
