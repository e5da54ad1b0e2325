// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use kestrel::BufferKind;
use kestrel::kestrel_encoding::glam::{Vec2, Vec3};
use kestrel::kestrel_encoding::{Bitmap, Color, Cube, Origin, Rect};
use kestrel_tests::{SoftwareHarness, TestParams, count_pixels};

#[test]
fn simple_square() {
    // 160 pixels high at a tenth of the height per meter: 16 pixels per meter.
    let mut harness = SoftwareHarness::new(&TestParams::new(160, 160));
    let image = harness
        .frame(|context| {
            let frame = context.frame_partition();
            context.encoder(BufferKind::Game, frame).push_draw_rect(
                &Rect::new(Vec2::splat(2.0))
                    .with_origin(Origin::Center)
                    .with_color(Color::RED),
            );
        })
        .unwrap();
    let red = Color::RED.to_premul_argb();
    let black = Color::BLACK.to_premul_argb();
    assert_eq!(count_pixels(image, red), 32 * 32);
    assert_eq!(count_pixels(image, black), 160 * 160 - 32 * 32);
    assert_eq!(image.pixel(64, 64), red);
    assert_eq!(image.pixel(95, 95), red);
    assert_eq!(image.pixel(63, 64), black);
    assert_eq!(image.pixel(96, 95), black);
}

#[test]
fn clear_color_fills_the_target() {
    let mut harness = SoftwareHarness::new(&TestParams::new(40, 24));
    let teal = Color::from_rgb8(0, 128, 128);
    let image = harness
        .frame(|context| {
            let frame = context.frame_partition();
            context.encoder(BufferKind::Game, frame).clear(teal, true);
        })
        .unwrap();
    assert_eq!(count_pixels(image, teal.to_premul_argb()), 40 * 24);
}

#[test]
fn overlay_follows_the_screen_size() {
    let mut harness = SoftwareHarness::new(&TestParams::new(64, 64));
    // Overlay coordinates stay relative to the initial size, so a quad over the
    // left half keeps covering the left half after the target doubles.
    harness.target.resize(128, 128);
    let image = harness
        .frame(|context| {
            let frame = context.frame_partition();
            context
                .encoder(BufferKind::Game, frame)
                .push_draw_rect_overlay(&Rect::new(Vec2::new(32.0, 64.0)).with_color(Color::GREEN));
        })
        .unwrap();
    assert_eq!(count_pixels(image, Color::GREEN.to_premul_argb()), 64 * 128);
    assert_eq!(image.pixel(63, 0), Color::GREEN.to_premul_argb());
    assert_eq!(image.pixel(64, 0), Color::BLACK.to_premul_argb());
}

#[test]
fn textures_persist_across_frames() {
    let mut harness = SoftwareHarness::new(&TestParams::new(32, 32));
    let mut texture = None;
    harness
        .frame(|context| {
            let level = context.level_partition();
            texture = Some(
                context
                    .encoder(BufferKind::Game, level)
                    .push_load_texture(&Bitmap::solid(1, 1, Color::BLUE)),
            );
        })
        .unwrap();
    let texture = texture.unwrap();
    let image = harness
        .frame(|context| {
            let frame = context.frame_partition();
            context.encoder(BufferKind::Game, frame).push_draw_rect_overlay(
                &Rect::new(Vec2::splat(32.0))
                    .with_color(Color::WHITE)
                    .with_texture(texture),
            );
        })
        .unwrap();
    assert_eq!(count_pixels(image, Color::BLUE.to_premul_argb()), 32 * 32);
    assert_eq!(harness.renderer.texture_count(), 1);
}

#[test]
#[should_panic(expected = "stale span")]
fn textures_die_with_their_level() {
    let mut harness = SoftwareHarness::new(&TestParams::new(32, 32));
    let mut texture = None;
    harness
        .frame(|context| {
            let level = context.level_partition();
            texture = Some(
                context
                    .encoder(BufferKind::Game, level)
                    .push_load_texture(&Bitmap::solid(1, 1, Color::BLUE)),
            );
        })
        .unwrap();
    harness.context.end_level();
    let texture = texture.unwrap();
    let _ = harness.frame(|context| {
        let frame = context.frame_partition();
        context
            .encoder(BufferKind::Game, frame)
            .push_draw_rect_overlay(&Rect::new(Vec2::splat(8.0)).with_texture(texture));
    });
}

#[test]
fn cubes_do_not_touch_the_software_target() {
    let mut harness = SoftwareHarness::new(&TestParams::new(32, 32));
    let image = harness
        .frame(|context| {
            let frame = context.frame_partition();
            context.encoder(BufferKind::Game, frame).push_draw_cube(
                &Cube::new(Vec3::ONE, Vec3::new(0.0, 0.0, 4.0)).with_color(Color::RED),
            );
        })
        .unwrap();
    assert_eq!(count_pixels(image, Color::BLACK.to_premul_argb()), 32 * 32);
}
