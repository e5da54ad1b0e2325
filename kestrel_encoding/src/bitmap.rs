// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::color::Color;

/// Pixels ready to be uploaded as a texture.
///
/// Stored bottom row first as premultiplied `0xAARRGGBB` words, the layout every
/// backend samples from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Bitmap {
    /// Wraps pixels which are already premultiplied and bottom-up.
    ///
    /// # Panics
    ///
    /// If `pixels` does not hold exactly `width * height` entries.
    pub fn from_premultiplied(width: u32, height: u32, pixels: Vec<u32>) -> Self {
        assert_eq!(
            pixels.len(),
            width as usize * height as usize,
            "bitmap of {width}x{height} pixels given {} pixels",
            pixels.len()
        );
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        let pixel = color.to_premul_argb();
        Self::from_premultiplied(width, height, vec![pixel; width as usize * height as usize])
    }

    /// Converts straight alpha RGBA8 data stored top row first.
    ///
    /// # Panics
    ///
    /// If `data` does not hold exactly `width * height * 4` bytes.
    pub fn from_rgba8_top_down(width: u32, height: u32, data: &[u8]) -> Self {
        let row_len = width as usize * 4;
        assert_eq!(
            data.len(),
            row_len * height as usize,
            "RGBA8 image of {width}x{height} pixels given {} bytes",
            data.len()
        );
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        if row_len > 0 {
            for row in data.chunks_exact(row_len).rev() {
                pixels.extend(
                    row.chunks_exact(4)
                        .map(|px| Color::from_rgba8(px[0], px[1], px[2], px[3]).to_premul_argb()),
                );
            }
        }
        Self::from_premultiplied(width, height, pixels)
    }

    /// Converts a decoded image.
    pub fn from_image(image: &image::RgbaImage) -> Self {
        Self::from_rgba8_top_down(image.width(), image.height(), image.as_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The pixels, bottom row first.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// The pixel at `(x, y)`, counted from the bottom left corner.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::Bitmap;
    use crate::color::Color;

    #[test]
    fn flips_and_premultiplies() {
        // Top row red, bottom row half transparent white.
        #[rustfmt::skip]
        let data = [
            255, 0, 0, 255,     255, 0, 0, 255,
            255, 255, 255, 128, 255, 255, 255, 128,
        ];
        let bitmap = Bitmap::from_rgba8_top_down(2, 2, &data);
        assert_eq!(bitmap.pixel(0, 0), 0x8080_8080);
        assert_eq!(bitmap.pixel(1, 1), 0xFFFF_0000);
    }

    #[test]
    fn converts_image_buffers() {
        let image = image::RgbaImage::from_pixel(3, 1, image::Rgba([0, 0, 255, 255]));
        let bitmap = Bitmap::from_image(&image);
        assert_eq!(bitmap.pixels(), &[0xFF00_00FF; 3]);
        assert_eq!(bitmap, Bitmap::solid(3, 1, Color::BLUE));
    }

    #[test]
    #[should_panic(expected = "given 3 pixels")]
    fn size_mismatch_is_fatal() {
        let _ = Bitmap::from_premultiplied(2, 2, vec![0; 3]);
    }
}
