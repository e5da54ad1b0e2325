// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Laying out ASCII text against a baked glyph atlas.

use glam::Vec2;
use smallvec::SmallVec;

use crate::bitmap::Bitmap;
use crate::record::{Glyph, TextureId};

/// Metrics of one character packed into an atlas.
///
/// The box `x0, y0, x1, y1` is in atlas pixels with the origin at the top left, as
/// produced by common font bakers. Offsets are relative to the pen position on the
/// baseline, again with y pointing down.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PackedChar {
    pub x0: u16,
    pub y0: u16,
    pub x1: u16,
    pub y1: u16,
    pub xoff: f32,
    pub yoff: f32,
    pub xadvance: f32,
    pub xoff2: f32,
    pub yoff2: f32,
}

/// Glyphs produced by [`GlyphAtlas::layout`].
pub type GlyphRun = SmallVec<[Glyph; 32]>;

/// A font baked into a single texture.
#[derive(Clone, Debug, PartialEq)]
pub struct GlyphAtlas {
    pub width: u32,
    pub height: u32,
    /// Pixel height the font was baked at.
    pub font_height: f32,
    /// Character of `chars[0]`.
    pub first_char: char,
    pub chars: Vec<PackedChar>,
    /// The uploaded atlas, or [`TextureId::NONE`] before upload.
    pub texture: TextureId,
}

impl GlyphAtlas {
    fn packed(&self, c: char) -> Option<&PackedChar> {
        let index = u32::from(c).checked_sub(u32::from(self.first_char))?;
        self.chars.get(index as usize)
    }

    /// Positions the glyphs of `text` on one line.
    ///
    /// `top_left` is the top left corner of the line in screen pixels (y up). Characters
    /// missing from the atlas are skipped.
    pub fn layout(&self, text: &str, top_left: Vec2) -> GlyphRun {
        let baseline = top_left.y - self.font_height;
        let atlas_size = Vec2::new(self.width as f32, self.height as f32);
        let mut pen = top_left.x;
        let mut run = GlyphRun::new();
        for c in text.chars() {
            let Some(packed) = self.packed(c) else {
                log::warn!("character {c:?} is not in the glyph atlas");
                continue;
            };
            let x0 = pen + packed.xoff;
            let x1 = if c == ' ' {
                x0 + self.font_height * 0.4
            } else {
                pen + packed.xoff2
            };
            let min_y = baseline - packed.yoff2;
            let max_y = baseline - packed.yoff;
            let uv_min = Vec2::new(
                f32::from(packed.x0) / atlas_size.x,
                1.0 - f32::from(packed.y1) / atlas_size.y,
            );
            let uv_max = Vec2::new(
                f32::from(packed.x1) / atlas_size.x,
                1.0 - f32::from(packed.y0) / atlas_size.y,
            );
            run.push(Glyph {
                uv_min: uv_min.to_array(),
                uv_max: uv_max.to_array(),
                min: [x0, min_y],
                size: [x1 - x0, max_y - min_y],
                baseline,
            });
            pen += packed.xadvance;
        }
        run
    }

    /// Width of `text` on screen, measured by pen advance.
    pub fn advance(&self, text: &str) -> f32 {
        text.chars()
            .filter_map(|c| self.packed(c))
            .map(|packed| packed.xadvance)
            .sum()
    }

    /// Turns 8-bit coverage (top row first, one byte per pixel) into a white texture
    /// whose alpha is the coverage.
    ///
    /// # Panics
    ///
    /// If `coverage` does not hold `width * height` bytes.
    pub fn coverage_to_bitmap(width: u32, height: u32, coverage: &[u8]) -> Bitmap {
        assert_eq!(
            coverage.len(),
            width as usize * height as usize,
            "glyph atlas of {width}x{height} pixels given {} coverage bytes",
            coverage.len()
        );
        let mut pixels = Vec::with_capacity(coverage.len());
        if width > 0 {
            for row in coverage.chunks_exact(width as usize).rev() {
                // Premultiplied white has every channel equal to the alpha.
                pixels.extend(row.iter().map(|&a| u32::from_ne_bytes([a; 4])));
            }
        }
        Bitmap::from_premultiplied(width, height, pixels)
    }
}
