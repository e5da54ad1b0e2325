// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Filling parallelograms into a region, eight pixels at a time.
//!
//! A quad is described by its bottom left corner and two edge vectors. For a pixel
//! center `p`, `d = p - origin` is projected onto both edges, giving `u` and `v`; the
//! pixel is covered when both lie in `0..=1`. The same `u` and `v` address the
//! texture, so coverage and sampling share one pass.

use fearless_simd::{Simd, SimdBase, SimdFloat, f32x8};
use kestrel_encoding::glam::{Vec2, Vec4};

use crate::region::Region;

pub(crate) const LANES: usize = 8;

const LANE_CENTERS: [f32; LANES] = [0.5, 1.5, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5];

/// A parallelogram in pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Quad {
    pub(crate) origin: Vec2,
    pub(crate) x_axis: Vec2,
    pub(crate) y_axis: Vec2,
}

impl Quad {
    pub(crate) fn from_corners(bottom_left: Vec2, bottom_right: Vec2, top_left: Vec2) -> Self {
        Self {
            origin: bottom_left,
            x_axis: bottom_right - bottom_left,
            y_axis: top_left - bottom_left,
        }
    }

    pub(crate) fn from_min_size(min: Vec2, size: Vec2) -> Self {
        Self {
            origin: min,
            x_axis: Vec2::new(size.x, 0.0),
            y_axis: Vec2::new(0.0, size.y),
        }
    }

    /// Zero area, or not finite.
    pub(crate) fn is_degenerate(&self) -> bool {
        let area = self.x_axis.perp_dot(self.y_axis);
        area == 0.0
            || !area.is_finite()
            || !self.origin.is_finite()
            || self.x_axis.length_squared() == 0.0
            || self.y_axis.length_squared() == 0.0
    }

    fn bounds(&self) -> (Vec2, Vec2) {
        let corners = [
            self.origin,
            self.origin + self.x_axis,
            self.origin + self.y_axis,
            self.origin + self.x_axis + self.y_axis,
        ];
        corners
            .iter()
            .fold((corners[0], corners[0]), |(min, max), &c| (min.min(c), max.max(c)))
    }
}

/// Bilinear lookups into a premultiplied `0xAARRGGBB` texture stored bottom row first.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Sampler<'a> {
    pub(crate) texels: &'a [u32],
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) uv_min: Vec2,
    pub(crate) uv_max: Vec2,
    /// Per channel multipliers (red, green, blue, alpha) applied to every sample.
    pub(crate) tint: [f32; 4],
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Paint<'a> {
    /// Premultiplied red, green, blue and alpha in `0.0..=255.0`.
    Solid([f32; 4]),
    Texture(Sampler<'a>),
}

impl Paint<'_> {
    /// A straight alpha tint in `0.0..=1.0` as a solid paint.
    pub(crate) fn solid(tint: Vec4) -> Self {
        let tint = tint.clamp(Vec4::ZERO, Vec4::ONE);
        let alpha = tint.w * 255.0;
        Self::Solid([tint.x * alpha, tint.y * alpha, tint.z * alpha, alpha])
    }
}

/// Texture multipliers for a straight alpha tint: textures are premultiplied, so the
/// color channels are scaled by the tint's alpha as well.
pub(crate) fn texture_tint(tint: Vec4) -> [f32; 4] {
    let tint = tint.clamp(Vec4::ZERO, Vec4::ONE);
    [tint.x * tint.w, tint.y * tint.w, tint.z * tint.w, tint.w]
}

/// Composites `paint` over every pixel of `region` whose center lies inside `quad`.
///
/// Blending is source-over on premultiplied channels, `dst · (1 - src_a/255) + src`,
/// computed in `f32` and truncated when the pixel is written.
pub(crate) fn fill_quad<S: Simd>(simd: S, region: &mut Region<'_>, quad: &Quad, paint: &Paint<'_>) {
    if region.is_empty() || quad.is_degenerate() {
        return;
    }
    let (min, max) = quad.bounds();
    let y_start = min.y.floor().max(region.y0 as f32);
    let y_end = max.y.ceil().min(region.y1 as f32);
    let x_start = min.x.floor().max(region.x0 as f32);
    let x_end = max.x.ceil().min(region.x1 as f32);
    if y_start >= y_end || x_start >= x_end {
        return;
    }
    let (y_start, y_end) = (y_start as u32, y_end as u32);
    // Groups start on multiples of the lane count; the clip mask hides lanes left of
    // the region.
    let x_start = x_start as u32 & !(LANES as u32 - 1);
    let x_end = x_end as u32;

    let inv_x = quad.x_axis / quad.x_axis.length_squared();
    let inv_y = quad.y_axis / quad.y_axis.length_squared();

    let zero = f32x8::splat(simd, 0.0);
    let one = f32x8::splat(simd, 1.0);
    let clip_min = f32x8::splat(simd, region.x0 as f32);
    let clip_max = f32x8::splat(simd, region.x1 as f32);
    let lane_centers = f32x8::from_slice(simd, &LANE_CENTERS);
    let du_dx = f32x8::splat(simd, inv_x.x);
    let dv_dx = f32x8::splat(simd, inv_y.x);

    for y in y_start..y_end {
        let dy = y as f32 + 0.5 - quad.origin.y;
        let u_row = f32x8::splat(simd, dy * inv_x.y);
        let v_row = f32x8::splat(simd, dy * inv_y.y);

        for x in (x_start..x_end).step_by(LANES) {
            let centers = lane_centers + f32x8::splat(simd, x as f32);
            let dx = centers - f32x8::splat(simd, quad.origin.x);
            let u = dx.madd(du_dx, u_row);
            let v = dx.madd(dv_dx, v_row);

            let mut coverage = one;
            coverage = simd.select_f32x8(simd.simd_lt_f32x8(u, zero), zero, coverage);
            coverage = simd.select_f32x8(simd.simd_lt_f32x8(one, u), zero, coverage);
            coverage = simd.select_f32x8(simd.simd_lt_f32x8(v, zero), zero, coverage);
            coverage = simd.select_f32x8(simd.simd_lt_f32x8(one, v), zero, coverage);
            // A lane's center is `x + 0.5`, so these reject `x < x0` and `x >= x1`.
            coverage = simd.select_f32x8(simd.simd_lt_f32x8(centers, clip_min), zero, coverage);
            coverage = simd.select_f32x8(simd.simd_lt_f32x8(clip_max, centers), zero, coverage);
            if coverage.as_slice().iter().all(|&c| c == 0.0) {
                continue;
            }

            let src = match paint {
                Paint::Solid(color) => color.map(|c| f32x8::splat(simd, c)),
                Paint::Texture(sampler) => sample_bilinear(simd, sampler, u, v),
            };
            composite(simd, region, x, y, coverage, src);
        }
    }
}

/// Bilinear sampling at `u`, `v`, returning premultiplied channels in `0.0..=255.0`.
///
/// Neighbours past the last row or column repeat the edge texel, so a lookup that
/// lands exactly on a texel returns that texel.
pub(crate) fn sample_bilinear<S: Simd>(
    simd: S,
    sampler: &Sampler<'_>,
    u: f32x8<S>,
    v: f32x8<S>,
) -> [f32x8<S>; 4] {
    let zero = f32x8::splat(simd, 0.0);
    let one = f32x8::splat(simd, 1.0);
    let u = u.max(zero).min(one);
    let v = v.max(zero).min(one);
    let span = sampler.uv_max - sampler.uv_min;
    let max_x = sampler.width - 1;
    let max_y = sampler.height - 1;
    let tx = u.madd(
        f32x8::splat(simd, span.x),
        f32x8::splat(simd, sampler.uv_min.x),
    ) * f32x8::splat(simd, max_x as f32);
    let ty = v.madd(
        f32x8::splat(simd, span.y),
        f32x8::splat(simd, sampler.uv_min.y),
    ) * f32x8::splat(simd, max_y as f32);
    let floor_x = tx.floor();
    let floor_y = ty.floor();
    let fx = tx - floor_x;
    let fy = ty - floor_y;
    let (floor_x, floor_y) = (floor_x.as_slice(), floor_y.as_slice());

    // Corner texels per lane, split into channels: A at the floor, B to its right, C
    // above and D diagonally.
    let mut corners = [[[0.0_f32; LANES]; 4]; 4];
    for lane in 0..LANES {
        let x0 = (floor_x[lane].max(0.0) as u32).min(max_x);
        let y0 = (floor_y[lane].max(0.0) as u32).min(max_y);
        let x1 = (x0 + 1).min(max_x);
        let y1 = (y0 + 1).min(max_y);
        let texels = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)];
        for (corner, (cx, cy)) in corners.iter_mut().zip(texels) {
            let texel = sampler.texels[(cy * sampler.width + cx) as usize];
            for (channel, value) in corner.iter_mut().zip(unpack(texel)) {
                channel[lane] = value;
            }
        }
    }

    let inv_fx = one - fx;
    let inv_fy = one - fy;
    let weights = [inv_fx * inv_fy, fx * inv_fy, inv_fx * fy, fx * fy];
    core::array::from_fn(|channel| {
        let mut sum = zero;
        for (corner, weight) in corners.iter().zip(weights) {
            sum = weight.madd(f32x8::from_slice(simd, &corner[channel]), sum);
        }
        sum * f32x8::splat(simd, sampler.tint[channel])
    })
}

fn composite<S: Simd>(
    simd: S,
    region: &mut Region<'_>,
    x: u32,
    y: u32,
    coverage: f32x8<S>,
    src: [f32x8<S>; 4],
) {
    let (x0, x1) = (region.x0, region.x1);
    let row = region.row_mut(y);
    let lane_in_region = |lane: usize| {
        let px = x + lane as u32;
        (px >= x0 && px < x1).then(|| (px - x0) as usize)
    };

    let mut dst = [[0.0_f32; LANES]; 4];
    for lane in 0..LANES {
        if let Some(index) = lane_in_region(lane) {
            for (channel, value) in dst.iter_mut().zip(unpack(row[index])) {
                channel[lane] = value;
            }
        }
    }

    let inv_src_alpha = (f32x8::splat(simd, 255.0) - src[3]) * f32x8::splat(simd, 1.0 / 255.0);
    let blended: [f32x8<S>; 4] = core::array::from_fn(|channel| {
        f32x8::from_slice(simd, &dst[channel]).madd(inv_src_alpha, src[channel])
    });

    let blended = blended.map(|channel| {
        let mut lanes = [0.0; LANES];
        lanes.copy_from_slice(channel.as_slice());
        lanes
    });
    for (lane, &covered) in coverage.as_slice().iter().enumerate() {
        if covered != 1.0 {
            continue;
        }
        if let Some(index) = lane_in_region(lane) {
            row[index] = pack(blended.map(|channel| channel[lane]));
        }
    }
}

/// `0xAARRGGBB` to red, green, blue, alpha.
fn unpack(pixel: u32) -> [f32; 4] {
    let [b, g, r, a] = pixel.to_le_bytes();
    [f32::from(r), f32::from(g), f32::from(b), f32::from(a)]
}

fn pack(rgba: [f32; 4]) -> u32 {
    let [r, g, b, a] = rgba.map(|c| c.min(255.0) as u32);
    (a << 24) | (r << 16) | (g << 8) | b
}
