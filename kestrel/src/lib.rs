// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Kestrel is a small renderer for games, built around command buffers.
//!
//! Game code records draws through an [`Encoder`](kestrel_encoding::Encoder) into
//! command buffers living in a pre-allocated [`MemoryBlock`](kestrel_arena::MemoryBlock).
//! Once per frame the buffers are handed to one of two backends:
//!
//! - [`Renderer`] decodes them into a [`Recording`] and executes it with [`wgpu`];
//! - [`SoftwareRenderer`](kestrel_cpu::SoftwareRenderer) rasterizes them on the CPU,
//!   in parallel over screen regions.
//!
//! [`FrameContext`] ties the pieces together:
//!
//! ```ignore
//! let mut context = FrameContext::new(FrameOptions::default(), UVec2::new(width, height));
//! let mut renderer = SoftwareRenderer::new(SoftwareOptions::default());
//! let mut target = Pixmap::new(width, height);
//! loop {
//!     let dt = context.begin_frame(width, height, elapsed);
//!     let frame = context.frame_partition();
//!     context
//!         .encoder(BufferKind::Game, frame)
//!         .push_draw_rect(&Rect::new(Vec2::ONE).with_color(Color::RED));
//!     context.submit_frame(RenderTarget::Software {
//!         renderer: &mut renderer,
//!         target: &mut target,
//!     })?;
//!     context.end_frame();
//! }
//! ```

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
    clippy::missing_errors_doc,
    reason = "Deferred"
)]

mod decode;
mod frame;
mod recording;
mod shaders;
mod wgpu_engine;

pub mod util;

pub use kestrel_arena;
pub use kestrel_cpu;
pub use kestrel_encoding;
pub use wgpu;

pub use decode::decode;
pub use frame::{BufferKind, FrameContext, FrameOptions, RenderTarget};
pub use recording::{Command, DrawParams, Pipeline, Recording, Uniforms, Vertex};

use kestrel_arena::MemoryBlock;
use kestrel_encoding::{CommandBuffer, MeshId, RenderInfo, TextureId};
use thiserror::Error;
use wgpu::{Device, Queue, TextureFormat, TextureView};

use crate::util::block_on_wgpu;
use crate::wgpu_engine::WgpuEngine;

/// Errors that can occur in Kestrel.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// There is no available device with the features required by Kestrel.
    #[error("Couldn't find suitable device")]
    NoCompatibleDevice,
    /// A draw references a mesh the renderer never received.
    #[error("mesh {0:?} was drawn before it was uploaded")]
    UnknownMesh(MeshId),
    /// A draw references a texture the renderer never received.
    #[error("texture {0:?} was drawn before it was uploaded")]
    UnknownTexture(TextureId),
    /// Failed to async map a buffer.
    /// See [`wgpu::BufferAsyncError`] for more information.
    #[error("Failed to async map a buffer")]
    BufferAsyncError(#[from] wgpu::BufferAsyncError),
    /// The device dropped a readback before completing it.
    #[error("readback channel was closed")]
    ReadbackCancelled,
    #[error("wgpu Error from scope")]
    WgpuErrorFromScope(#[from] wgpu::Error),
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// Options which are set at renderer creation time, used in [`Renderer::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RendererOptions {
    /// The format of the textures this renderer draws into.
    pub surface_format: TextureFormat,
    /// Whether world-space draws are depth tested. Without it records are drawn
    /// strictly in order.
    pub use_depth: bool,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            surface_format: TextureFormat::Rgba8Unorm,
            use_depth: true,
        }
    }
}

/// Draws command buffers into a texture with `wgpu`.
///
/// Meshes and textures stay resident once uploaded, so a buffer may draw a mesh
/// uploaded by any earlier frame.
#[derive(Debug)]
pub struct Renderer {
    options: RendererOptions,
    engine: WgpuEngine,
}

static_assertions::assert_impl_all!(Renderer: Send);

impl Renderer {
    /// Creates a new renderer for the specified device.
    pub fn new(device: &Device, options: RendererOptions) -> Result<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let engine = WgpuEngine::new(device, &options);
        if let Some(error) = block_on_wgpu(device, device.pop_error_scope()) {
            return Err(error.into());
        }
        log::info!(
            "wgpu renderer: {:?}, depth test {}",
            options.surface_format,
            if options.use_depth { "on" } else { "off" }
        );
        Ok(Self { options, engine })
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// Number of meshes resident on the device.
    pub fn mesh_count(&self) -> usize {
        self.engine.mesh_count()
    }

    /// Number of textures resident on the device.
    pub fn texture_count(&self) -> usize {
        self.engine.texture_count()
    }

    /// Decodes `buffers`, in order, and draws them into `texture`.
    ///
    /// The texture must have the format given in [`RendererOptions::surface_format`],
    /// the `RENDER_ATTACHMENT` usage and the screen size of `info`.
    pub fn render_to_texture(
        &mut self,
        device: &Device,
        queue: &Queue,
        block: &MemoryBlock,
        buffers: &[&CommandBuffer],
        info: &RenderInfo,
        texture: &TextureView,
    ) -> Result<()> {
        let recording = decode(block, buffers, info);
        self.render_recording(
            device,
            queue,
            &recording,
            texture,
            info.screen_size.x,
            info.screen_size.y,
        )
    }

    /// Executes a recording produced by [`decode`].
    pub fn render_recording(
        &mut self,
        device: &Device,
        queue: &Queue,
        recording: &Recording,
        texture: &TextureView,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.engine
            .run_recording(device, queue, recording, texture, width, height)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, FrameContext, RendererOptions};
    use kestrel_encoding::{MeshId, TextureId};

    static_assertions::assert_impl_all!(FrameContext: Send);

    #[test]
    fn unknown_handles_name_their_id() {
        assert_eq!(
            Error::UnknownMesh(MeshId(4)).to_string(),
            "mesh MeshId(4) was drawn before it was uploaded"
        );
        assert_eq!(
            Error::UnknownTexture(TextureId(9)).to_string(),
            "texture TextureId(9) was drawn before it was uploaded"
        );
    }

    #[test]
    fn depth_is_on_by_default() {
        assert!(RendererOptions::default().use_depth);
    }
}
