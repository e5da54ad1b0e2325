// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A CPU renderer for Kestrel command buffers.
//!
//! [`SoftwareRenderer`] draws the same command stream as the hardware renderer into
//! a [`Pixmap`] of premultiplied `0xAARRGGBB` pixels. The target is split into a grid
//! of regions; each region is an independent work item for a fixed pool of worker
//! threads, and within a region quads are filled eight pixels at a time with
//! `fearless_simd`, sampling textures bilinearly.
//!
//! ```ignore
//! let mut renderer = SoftwareRenderer::new(SoftwareOptions::default());
//! let mut target = Pixmap::new(1280, 720);
//! renderer.render(&block, &[&game_buffer, &profiler_buffer], &info, &mut target);
//! ```
//!
//! Only flat geometry is rasterized: rectangles (world space and overlay), text and
//! lines. Cubes and meshes are skipped.

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![allow(missing_docs, reason = "We have many as-yet undocumented items.")]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    reason = "Pixel coordinates are converted between u32 and f32 throughout"
)]

mod dispatch;
mod pixmap;
mod raster;
mod region;
mod render;

pub use fearless_simd::Level;
pub use pixmap::Pixmap;
pub use region::{Region, Regions};
pub use render::{SoftwareOptions, SoftwareRenderer};

#[cfg(test)]
mod tests {
    use crate::{Pixmap, SoftwareRenderer};

    static_assertions::assert_impl_all!(Pixmap: Send, Sync);
    static_assertions::assert_impl_all!(SoftwareRenderer: Send);
}
