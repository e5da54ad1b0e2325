// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::num::NonZeroUsize;

use kestrel::BufferKind;
use kestrel::kestrel_encoding::glam::Vec2;
use kestrel::kestrel_encoding::{Color, Glyph, Rect, TextureId};
use kestrel_tests::{SoftwareHarness, TestParams, count_pixels};
use proptest::prelude::*;

const SIZE: u32 = 48;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Region boundaries never drop or double pixels of a quad.
    #[test]
    fn aligned_overlay_covers_exactly_its_pixels(
        x in 0_u32..SIZE,
        y in 0_u32..SIZE,
        width in 1_u32..SIZE,
        height in 1_u32..SIZE,
        regions_x in 1_u32..7,
        regions_y in 1_u32..7,
    ) {
        let params = TestParams {
            regions_x,
            regions_y,
            num_threads: NonZeroUsize::new(2),
            ..TestParams::new(SIZE, SIZE)
        };
        let mut harness = SoftwareHarness::new(&params);
        let image = harness
            .frame(|context| {
                let frame = context.frame_partition();
                context.encoder(BufferKind::Game, frame).push_draw_rect_overlay(
                    &Rect::new(Vec2::new(width as f32, height as f32))
                        .with_position(Vec2::new(x as f32, y as f32))
                        .with_color(Color::WHITE),
                );
            })
            .unwrap();
        let visible_x = (x + width).min(SIZE) - x;
        let visible_y = (y + height).min(SIZE) - y;
        prop_assert_eq!(
            count_pixels(image, Color::WHITE.to_premul_argb()),
            (visible_x * visible_y) as usize
        );
    }

    /// Every overlay and every glyph becomes exactly one draw.
    #[test]
    fn one_draw_per_quad(rects in 0_usize..20, glyphs in proptest::collection::vec(0_usize..6, 0..5)) {
        let mut harness = SoftwareHarness::new(&TestParams::new(16, 16));
        harness.context.begin_frame(16, 16, 0.0);
        let frame = harness.context.frame_partition();
        let mut encoder = harness.context.encoder(BufferKind::Game, frame);
        for _ in 0..rects {
            encoder.push_draw_rect_overlay(&Rect::new(Vec2::ONE));
        }
        let glyph = Glyph {
            uv_min: [0.0; 2],
            uv_max: [1.0; 2],
            min: [1.0; 2],
            size: [2.0; 2],
            baseline: 0.0,
        };
        for &count in &glyphs {
            encoder.push_draw_text(&vec![glyph; count], TextureId::NONE, Color::WHITE);
        }
        let recording = harness.context.recording();
        prop_assert_eq!(recording.draw_count(), rects + glyphs.iter().sum::<usize>());
        harness.context.end_frame();
    }
}
