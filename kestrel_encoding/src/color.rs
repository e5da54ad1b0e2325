// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use glam::Vec4;

/// An 8-bit per channel, straight alpha color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Self = Self::from_rgba8(0, 0, 0, 0);
    pub const BLACK: Self = Self::from_rgb8(0, 0, 0);
    pub const WHITE: Self = Self::from_rgb8(255, 255, 255);
    pub const RED: Self = Self::from_rgb8(255, 0, 0);
    pub const GREEN: Self = Self::from_rgb8(0, 255, 0);
    pub const BLUE: Self = Self::from_rgb8(0, 0, 255);

    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::from_rgba8(r, g, b, 255)
    }

    /// The channels scaled to `0.0..=1.0`.
    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(
            f32::from(self.r),
            f32::from(self.g),
            f32::from(self.b),
            f32::from(self.a),
        ) / 255.0
    }

    /// Inverse of [`Color::to_vec4`], rounding to the nearest 8-bit value.
    pub fn from_vec4(v: Vec4) -> Self {
        let c = (v.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
        Self::from_rgba8(c.x as u8, c.y as u8, c.z as u8, c.w as u8)
    }

    /// Premultiplied and packed as `0xAARRGGBB`, the pixel format of textures and of the
    /// software render target. Premultiplied channels are truncated.
    pub fn to_premul_argb(self) -> u32 {
        let alpha = f32::from(self.a) / 255.0;
        let premul = |c: u8| (f32::from(c) * alpha) as u32;
        (u32::from(self.a) << 24) | (premul(self.r) << 16) | (premul(self.g) << 8) | premul(self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::Color;
    use glam::Vec4;

    #[test]
    fn unit_round_trip() {
        let color = Color::from_rgba8(255, 0, 128, 255);
        assert_eq!(color.to_vec4(), Vec4::new(1.0, 0.0, 128.0 / 255.0, 1.0));
        assert_eq!(Color::from_vec4(color.to_vec4()), color);
    }

    #[test]
    fn premultiplies_when_packing() {
        assert_eq!(Color::RED.to_premul_argb(), 0xFFFF_0000);
        assert_eq!(Color::from_rgba8(255, 255, 255, 0).to_premul_argb(), 0);
        assert_eq!(Color::from_rgba8(200, 100, 50, 128).to_premul_argb(), 0x8064_3219);
    }
}
