// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Headless

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "Frame counters and pixel sizes are small"
)]

use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use kestrel::kestrel_cpu::{Pixmap, SoftwareOptions, SoftwareRenderer};
use kestrel::kestrel_encoding::glam::{UVec2, Vec2, Vec3};
use kestrel::kestrel_encoding::{Bitmap, Color, Cube, Origin, Rect, TextureId, Transform};
use kestrel::util::{RenderContext, create_target, read_texture};
use kestrel::wgpu::TextureFormat;
use kestrel::{BufferKind, FrameContext, FrameOptions, RenderTarget, Renderer, RendererOptions};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.width == 0 || args.height == 0 {
        bail!("cannot render a {}x{} frame", args.width, args.height);
    }
    let mut context = FrameContext::new(
        FrameOptions::default(),
        UVec2::new(args.width, args.height),
    );
    let pixels = if args.gpu {
        pollster::block_on(render_hardware(&mut context, &args))?
    } else {
        render_software(&mut context, &args)?
    };

    std::fs::create_dir_all(&args.out_directory)
        .with_context(|| format!("creating {}", args.out_directory.display()))?;
    let out_path = args
        .out_directory
        .join(if args.gpu { "hardware" } else { "software" })
        .with_extension("png");
    let mut file = File::create(&out_path)?;
    let mut png_encoder = png::Encoder::new(&mut file, args.width, args.height);
    png_encoder.set_color(png::ColorType::Rgba);
    png_encoder.set_depth(png::BitDepth::Eight);
    let mut writer = png_encoder.write_header()?;
    writer.write_image_data(&pixels)?;
    writer.finish()?;
    println!(
        "Wrote frame {} ({}x{}) to {out_path:?}",
        args.frames, args.width, args.height
    );
    Ok(())
}

fn render_software(context: &mut FrameContext, args: &Args) -> Result<Vec<u8>> {
    let mut renderer = SoftwareRenderer::new(SoftwareOptions {
        regions_x: args.regions_x,
        regions_y: args.regions_y,
        num_threads: args.threads,
        ..SoftwareOptions::default()
    });
    let mut target = Pixmap::new(args.width, args.height);
    let mut checker = TextureId::NONE;
    for index in 0..args.frames {
        context.begin_frame(args.width, args.height, FRAME_TIME);
        record_scene(context, index, &mut checker);
        context.submit_frame(RenderTarget::Software {
            renderer: &mut renderer,
            target: &mut target,
        })
        .map_err(|err| anyhow!("rendering failed: {err}"))?;
        context.end_frame();
    }
    Ok(target.to_rgba8_top_down())
}

async fn render_hardware(context: &mut FrameContext, args: &Args) -> Result<Vec<u8>> {
    let mut render_context = RenderContext::new();
    let device_id = render_context
        .device()
        .await
        .map_err(|err| anyhow!("{err}"))?;
    let device_handle = &render_context.devices[device_id];
    let device = &device_handle.device;
    let queue = &device_handle.queue;
    let mut renderer = Renderer::new(
        device,
        RendererOptions {
            surface_format: TextureFormat::Rgba8Unorm,
            use_depth: !args.no_depth,
        },
    )
    .map_err(|err| anyhow!("creating the renderer failed: {err}"))?;
    let (target, view) = create_target(device, args.width, args.height, TextureFormat::Rgba8Unorm);
    let mut checker = TextureId::NONE;
    for index in 0..args.frames {
        context.begin_frame(args.width, args.height, FRAME_TIME);
        record_scene(context, index, &mut checker);
        context.submit_frame(RenderTarget::Hardware {
            renderer: &mut renderer,
            device,
            queue,
            view: &view,
        })
        .map_err(|err| anyhow!("rendering failed: {err}"))?;
        context.end_frame();
    }
    // Render targets store their top row first.
    read_texture(device, queue, &target, args.width, args.height)
        .map_err(|err| anyhow!("reading back the frame failed: {err}"))
}

const FRAME_TIME: f32 = 1.0 / 60.0;

/// Records one frame of the demo scene. The checker texture is loaded into the
/// level partition on the first frame and reused afterwards.
fn record_scene(context: &mut FrameContext, index: u32, checker: &mut TextureId) {
    let frame = context.frame_partition();
    let level = context.level_partition();
    let time = index as f32 * FRAME_TIME;

    if checker.is_none() {
        *checker = context
            .encoder(BufferKind::Game, level)
            .push_load_texture(&checkerboard(8, Color::WHITE, Color::from_rgb8(40, 40, 48)));
    }

    let mut game = context.encoder(BufferKind::Game, frame);
    game.clear(Color::from_rgb8(20, 24, 32), true);
    game.set_camera(Vec3::new(0.5 * time.sin(), 0.0, 0.0), Vec3::ZERO);

    // Floor.
    game.push_draw_rect(
        &Rect::new(Vec2::new(12.0, 1.0))
            .with_origin(Origin::Center)
            .with_position(Vec2::new(0.0, -3.5))
            .with_texture(*checker),
    );
    game.push_draw_rect(
        &Rect::new(Vec2::splat(2.0))
            .with_origin(Origin::Center)
            .with_transform(Transform {
                translation: Vec3::new(-3.0, 0.0, 0.0),
                rotation: Vec3::new(0.0, 0.0, time),
                scale: Vec3::ONE,
            })
            .with_color(Color::from_rgb8(220, 80, 60)),
    );
    game.push_draw_rect(
        &Rect::new(Vec2::splat(2.0))
            .with_origin(Origin::Center)
            .with_position(Vec2::new(0.0, 0.5))
            .with_texture(*checker)
            .with_color(Color::from_rgba8(120, 200, 255, 200)),
    );
    game.push_draw_cube(
        &Cube::new(Vec3::splat(1.5), Vec3::new(3.0, 0.0, -2.0))
            .with_color(Color::from_rgb8(90, 200, 120)),
    );
    game.push_line(
        Vec2::new(-5.0, -2.5),
        Vec2::new(5.0, -2.5),
        Color::from_rgb8(250, 220, 90),
        0.05,
    );
    game.push_draw_rect_outline(
        &Rect::new(Vec2::splat(2.4))
            .with_origin(Origin::Center)
            .with_position(Vec2::new(0.0, 0.5))
            .with_color(Color::WHITE),
        0.05,
    );

    // A frame time bar, the way a profiler overlay would draw it.
    let initial = context.info().initial_size.as_vec2();
    let mut profiler = context.encoder(BufferKind::Profiler, frame);
    profiler.push_draw_rect_overlay(
        &Rect::new(Vec2::new(initial.x, 12.0))
            .with_origin(Origin::TopLeft)
            .with_position(Vec2::new(0.0, initial.y))
            .with_color(Color::from_rgba8(0, 0, 0, 160)),
    );
    profiler.push_draw_rect_overlay(
        &Rect::new(Vec2::new(initial.x * FRAME_TIME * 30.0, 8.0))
            .with_origin(Origin::TopLeft)
            .with_position(Vec2::new(2.0, initial.y - 2.0))
            .with_color(Color::from_rgb8(90, 220, 90)),
    );
}

fn checkerboard(cells: u32, light: Color, dark: Color) -> Bitmap {
    let pixels = (0..cells)
        .flat_map(|y| (0..cells).map(move |x| (x, y)))
        .map(|(x, y)| {
            if (x + y) % 2 == 0 {
                light.to_premul_argb()
            } else {
                dark.to_premul_argb()
            }
        })
        .collect();
    Bitmap::from_premultiplied(cells, cells, pixels)
}

#[derive(Parser, Debug)]
#[command(about, long_about = None, bin_name = "cargo run -p headless --")]
struct Args {
    #[arg(long, short = 'x', default_value_t = 640)]
    width: u32,
    #[arg(long, short = 'y', default_value_t = 360)]
    height: u32,
    /// Number of frames to simulate; the last one is written out
    #[arg(long, short, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    frames: u32,
    /// Render with wgpu instead of the software rasterizer
    #[arg(long)]
    gpu: bool,
    /// Draw world-space records in submission order on the GPU
    #[arg(long)]
    no_depth: bool,
    /// Region columns of the software rasterizer
    #[arg(long, default_value_t = 8)]
    regions_x: u32,
    /// Region rows of the software rasterizer
    #[arg(long, default_value_t = 4)]
    regions_y: u32,
    /// Worker threads of the software rasterizer
    #[arg(long)]
    threads: Option<NonZeroUsize>,
    /// Directory to store the result into
    #[arg(long, default_value_os_t = default_directory())]
    out_directory: PathBuf,
}

fn default_directory() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("outputs")
}
