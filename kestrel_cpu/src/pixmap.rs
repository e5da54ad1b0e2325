// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The software render target.

/// A pixmap of premultiplied `0xAARRGGBB` pixels.
///
/// Row 0 is the bottom of the image. Rows are `pitch` pixels apart, which may be more
/// than `width` when the buffer is shared with a platform surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    width: u32,
    height: u32,
    /// Distance between the starts of two rows, in pixels.
    pitch: u32,
    data: Vec<u32>,
}

impl Pixmap {
    /// Create a new pixmap with the given width and height in pixels.
    ///
    /// All pixels are initialized to transparent black.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_pitch(width, height, width)
    }

    /// Like [`Pixmap::new`], with padding at the end of each row.
    ///
    /// # Panics
    ///
    /// If `pitch` is smaller than `width`.
    pub fn with_pitch(width: u32, height: u32, pitch: u32) -> Self {
        assert!(
            pitch >= width,
            "pitch of {pitch} pixels is smaller than the width {width}"
        );
        Self {
            width,
            height,
            pitch,
            data: vec![0; pitch as usize * height as usize],
        }
    }

    /// Resizes the pixmap. The pitch becomes the new width and all pixels are cleared.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pitch = width;
        self.data.clear();
        self.data.resize(width as usize * height as usize, 0);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pitch(&self) -> u32 {
        self.pitch
    }

    pub fn data(&self) -> &[u32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u32] {
        &mut self.data
    }

    /// The pixel at `(x, y)`, counted from the bottom left corner.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.data[(y * self.pitch + x) as usize]
    }

    /// Converts to straight alpha RGBA8 bytes, top row first, without row padding.
    ///
    /// This is the layout image encoders expect.
    pub fn to_rgba8_top_down(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in (0..self.height).rev() {
            let start = (y * self.pitch) as usize;
            for &pixel in &self.data[start..start + self.width as usize] {
                out.extend_from_slice(&unpremultiply(pixel));
            }
        }
        out
    }
}

fn unpremultiply(pixel: u32) -> [u8; 4] {
    let [b, g, r, a] = pixel.to_le_bytes();
    let channel = |c: u8| {
        if a == 0 {
            0
        } else {
            ((u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8
        }
    };
    [channel(r), channel(g), channel(b), a]
}

#[cfg(test)]
mod tests {
    use super::Pixmap;

    #[test]
    fn export_flips_rows_and_unpremultiplies() {
        let mut pixmap = Pixmap::with_pitch(2, 2, 3);
        // Bottom left: opaque red. Top right: half transparent white.
        pixmap.data_mut()[0] = 0xFFFF_0000;
        pixmap.data_mut()[3 + 1] = 0x8080_8080;
        let rgba = pixmap.to_rgba8_top_down();
        assert_eq!(rgba.len(), 16);
        assert_eq!(&rgba[4..8], &[255, 255, 255, 128]);
        assert_eq!(&rgba[8..12], &[255, 0, 0, 255]);
        assert_eq!(&rgba[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "smaller than the width")]
    fn pitch_must_cover_width() {
        let _ = Pixmap::with_pitch(4, 1, 3);
    }
}
