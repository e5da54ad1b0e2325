// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Kestrel tests.

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    missing_debug_implementations,
    unreachable_pub,
    missing_docs,
    clippy::missing_assert_message,
    reason = "Deferred"
)]

use std::num::NonZeroUsize;

use anyhow::Result;
use kestrel::kestrel_arena::MemoryOptions;
use kestrel::kestrel_cpu::{Pixmap, SoftwareOptions, SoftwareRenderer};
use kestrel::kestrel_encoding::glam::UVec2;
use kestrel::{FrameContext, FrameOptions, RenderTarget};

pub struct TestParams {
    pub width: u32,
    pub height: u32,
    pub regions_x: u32,
    pub regions_y: u32,
    pub num_threads: Option<NonZeroUsize>,
}

impl TestParams {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            regions_x: 4,
            regions_y: 3,
            num_threads: NonZeroUsize::new(3),
        }
    }
}

/// Frame options small enough to run many tests side by side.
pub fn test_frame_options() -> FrameOptions {
    FrameOptions {
        memory: MemoryOptions {
            total_size: 8 << 20,
            permanent_size: 64 << 10,
        },
        frame_partition_size: 2 << 20,
        level_partition_size: 2 << 20,
        platform_partition_size: 256 << 10,
        command_buffer_size: 1 << 20,
        ..FrameOptions::default()
    }
}

/// A frame context driving the software renderer into its own pixmap.
pub struct SoftwareHarness {
    pub context: FrameContext,
    pub renderer: SoftwareRenderer,
    pub target: Pixmap,
}

impl SoftwareHarness {
    pub fn new(params: &TestParams) -> Self {
        Self {
            context: FrameContext::new(
                test_frame_options(),
                UVec2::new(params.width, params.height),
            ),
            renderer: SoftwareRenderer::new(SoftwareOptions {
                regions_x: params.regions_x,
                regions_y: params.regions_y,
                num_threads: params.num_threads,
                ..SoftwareOptions::default()
            }),
            target: Pixmap::new(params.width, params.height),
        }
    }

    /// Runs one whole frame: `draw` records into the context, which is then
    /// submitted to the software renderer and ended.
    pub fn frame(&mut self, draw: impl FnOnce(&mut FrameContext)) -> Result<&Pixmap> {
        let (width, height) = (self.target.width(), self.target.height());
        self.context.begin_frame(width, height, 1.0 / 60.0);
        draw(&mut self.context);
        self.context.submit_frame(RenderTarget::Software {
            renderer: &mut self.renderer,
            target: &mut self.target,
        })?;
        self.context.end_frame();
        Ok(&self.target)
    }
}

/// Number of pixels of `pixmap` equal to `pixel`.
pub fn count_pixels(pixmap: &Pixmap, pixel: u32) -> usize {
    (0..pixmap.height())
        .flat_map(|y| (0..pixmap.width()).map(move |x| (x, y)))
        .filter(|&(x, y)| pixmap.pixel(x, y) == pixel)
        .count()
}
