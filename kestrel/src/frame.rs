// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-frame lifecycle: memory, command buffers and backend selection.

use kestrel_arena::{MemoryBlock, MemoryOptions, PartitionId};
use kestrel_cpu::{Pixmap, SoftwareRenderer};
use kestrel_encoding::glam::UVec2;
use kestrel_encoding::{CommandBuffer, Encoder, RenderInfo};
use wgpu::{Device, Queue, TextureView};

use crate::recording::Recording;
use crate::{Renderer, Result, decode};

/// Sizes and limits used by [`FrameContext::new`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameOptions {
    pub memory: MemoryOptions,
    /// Payloads which live until [`FrameContext::end_frame`].
    pub frame_partition_size: usize,
    /// Payloads which live until [`FrameContext::end_level`].
    pub level_partition_size: usize,
    /// Scratch space for platform code, only ever used through scopes.
    pub platform_partition_size: usize,
    /// Bytes shared by the game and profiler command buffers. The profiler buffer
    /// gets a fifth.
    pub command_buffer_size: usize,
    /// Longest simulation step, in seconds, [`FrameContext::begin_frame`] reports.
    pub max_delta_time: f32,
    /// World scale of the software renderer, as a fraction of the screen height.
    pub pixels_per_meter_ratio: f32,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            memory: MemoryOptions::default(),
            frame_partition_size: 100 << 20,
            level_partition_size: 100 << 20,
            platform_partition_size: 100 << 20,
            command_buffer_size: 10 << 20,
            max_delta_time: 1.0 / 30.0,
            pixels_per_meter_ratio: 0.10,
        }
    }
}

/// One of the two command buffers of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Game,
    /// Submitted after the game buffer, so it draws on top.
    Profiler,
}

/// Where [`FrameContext::submit_frame`] sends the frame.
#[derive(Debug)]
pub enum RenderTarget<'a> {
    Software {
        renderer: &'a mut SoftwareRenderer,
        target: &'a mut Pixmap,
    },
    Hardware {
        renderer: &'a mut Renderer,
        device: &'a Device,
        queue: &'a Queue,
        view: &'a TextureView,
    },
}

/// Owns the memory block, the command buffers and the rendering info of a game.
///
/// A frame goes through [`begin_frame`](Self::begin_frame), any number of
/// [`encoder`](Self::encoder) calls, [`submit_frame`](Self::submit_frame) and
/// [`end_frame`](Self::end_frame). [`end_level`](Self::end_level) drops everything
/// allocated for the current level.
#[derive(Debug)]
pub struct FrameContext {
    options: FrameOptions,
    block: MemoryBlock,
    frame: PartitionId,
    level: PartitionId,
    platform: PartitionId,
    game: CommandBuffer,
    profiler: CommandBuffer,
    info: RenderInfo,
    frame_index: u64,
}

impl FrameContext {
    /// Allocates the memory block and carves out the partitions and command buffers.
    ///
    /// # Panics
    ///
    /// If the partitions do not fit in the block.
    pub fn new(options: FrameOptions, screen_size: UVec2) -> Self {
        let mut block = MemoryBlock::new(options.memory);
        let frame = block.create_partition("frame", options.frame_partition_size);
        let level = block.create_partition("level", options.level_partition_size);
        let platform = block.create_partition("platform", options.platform_partition_size);
        let commands = block.create_partition("RenderCmdBuffer", options.command_buffer_size);
        let profiler_size = options.command_buffer_size / 5;
        let game = CommandBuffer::new(
            &mut block,
            commands,
            options.command_buffer_size - profiler_size,
        );
        let profiler = CommandBuffer::new(&mut block, commands, profiler_size);
        Self {
            options,
            block,
            frame,
            level,
            platform,
            game,
            profiler,
            info: RenderInfo::new(screen_size, options.pixels_per_meter_ratio),
            frame_index: 0,
        }
    }

    pub fn options(&self) -> &FrameOptions {
        &self.options
    }

    pub fn block(&self) -> &MemoryBlock {
        &self.block
    }

    /// The block, for game state and platform scratch allocations.
    pub fn block_mut(&mut self) -> &mut MemoryBlock {
        &mut self.block
    }

    pub fn info(&self) -> &RenderInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut RenderInfo {
        &mut self.info
    }

    pub fn frame_partition(&self) -> PartitionId {
        self.frame
    }

    pub fn level_partition(&self) -> PartitionId {
        self.level
    }

    pub fn platform_partition(&self) -> PartitionId {
        self.platform
    }

    pub fn buffer(&self, kind: BufferKind) -> &CommandBuffer {
        match kind {
            BufferKind::Game => &self.game,
            BufferKind::Profiler => &self.profiler,
        }
    }

    /// Number of frames ended so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Starts a frame and returns the simulation step to use for it.
    ///
    /// Steps longer than [`FrameOptions::max_delta_time`] are clamped, so a stall
    /// does not turn into a burst of catch-up work. The first frame also uploads the
    /// standard meshes, into the level partition.
    pub fn begin_frame(&mut self, width: u32, height: u32, delta_time: f32) -> f32 {
        let delta_time = if delta_time > self.options.max_delta_time {
            log::warn!(
                "frame {} took {delta_time:.3}s, clamping to {:.3}s",
                self.frame_index,
                self.options.max_delta_time
            );
            self.options.max_delta_time
        } else {
            delta_time.max(0.0)
        };
        self.info.resize(UVec2::new(width, height));
        let level = self.level;
        self.encoder(BufferKind::Game, level).ensure_standard_meshes();
        delta_time
    }

    /// An encoder writing into the `kind` buffer, with payloads copied to `partition`.
    pub fn encoder(&mut self, kind: BufferKind, partition: PartitionId) -> Encoder<'_> {
        let buffer = match kind {
            BufferKind::Game => &mut self.game,
            BufferKind::Profiler => &mut self.profiler,
        };
        Encoder::new(&mut self.block, buffer, &mut self.info, partition)
    }

    /// Decodes both buffers for the hardware path without submitting them.
    pub fn recording(&self) -> Recording {
        decode(&self.block, &[&self.game, &self.profiler], &self.info)
    }

    /// Draws the game buffer, then the profiler buffer, with the chosen backend.
    ///
    /// The buffers are left untouched; [`end_frame`](Self::end_frame) resets them.
    pub fn submit_frame(&mut self, target: RenderTarget<'_>) -> Result<()> {
        let buffers = [&self.game, &self.profiler];
        match target {
            RenderTarget::Software { renderer, target } => {
                renderer.render(&self.block, &buffers, &self.info, target);
            }
            RenderTarget::Hardware {
                renderer,
                device,
                queue,
                view,
            } => {
                renderer.render_to_texture(device, queue, &self.block, &buffers, &self.info, view)?;
            }
        }
        log::debug!(
            "frame {}: {} + {} records, {} + {} bytes",
            self.frame_index,
            self.game.entry_count(),
            self.profiler.entry_count(),
            self.game.used_bytes(),
            self.profiler.used_bytes()
        );
        Ok(())
    }

    /// Drops the records of one buffer.
    pub fn reset_buffer(&mut self, kind: BufferKind) {
        match kind {
            BufferKind::Game => self.game.reset(),
            BufferKind::Profiler => self.profiler.reset(),
        }
    }

    /// Ends the frame: resets both buffers and releases the frame partition.
    ///
    /// # Panics
    ///
    /// If a temporary scope on the platform, frame or level partition is still open.
    pub fn end_frame(&mut self) {
        self.block.assert_temp_memory_cleared(self.platform);
        self.block.assert_temp_memory_cleared(self.frame);
        self.block.assert_temp_memory_cleared(self.level);
        self.game.reset();
        self.profiler.reset();
        self.block.release(self.frame);
        self.frame_index += 1;
    }

    /// Releases the level partition. Textures loaded into it can no longer be drawn.
    ///
    /// # Panics
    ///
    /// If a temporary scope on the level partition is still open.
    pub fn end_level(&mut self) {
        self.block.assert_temp_memory_cleared(self.level);
        let used = self.block.partition_info(self.level).used();
        self.block.release(self.level);
        log::info!("level released ({used} bytes)");
    }
}

#[cfg(test)]
mod tests {
    use super::{BufferKind, FrameContext, FrameOptions, RenderTarget};
    use crate::recording::Command;
    use core::num::NonZeroUsize;
    use kestrel_arena::MemoryOptions;
    use kestrel_cpu::{Pixmap, SoftwareOptions, SoftwareRenderer};
    use kestrel_encoding::glam::{UVec2, Vec2};
    use kestrel_encoding::{Color, Rect};

    fn small_options() -> FrameOptions {
        FrameOptions {
            memory: MemoryOptions {
                total_size: 1 << 20,
                permanent_size: 1 << 12,
            },
            frame_partition_size: 1 << 16,
            level_partition_size: 1 << 16,
            platform_partition_size: 1 << 12,
            command_buffer_size: 1 << 15,
            ..FrameOptions::default()
        }
    }

    fn context() -> FrameContext {
        FrameContext::new(small_options(), UVec2::new(64, 64))
    }

    #[test]
    fn long_frames_are_clamped() {
        let mut context = context();
        assert_eq!(context.begin_frame(64, 64, 0.5), 1.0 / 30.0);
        context.end_frame();
        assert_eq!(context.begin_frame(64, 64, 0.01), 0.01);
    }

    #[test]
    fn standard_meshes_upload_once() {
        let mut context = context();
        context.begin_frame(64, 64, 0.016);
        assert_eq!(context.info().renderables_loaded, 3);
        let uploads = context
            .recording()
            .commands
            .iter()
            .filter(|command| matches!(command, Command::UploadMesh { .. }))
            .count();
        assert_eq!(uploads, 3);
        context.end_frame();

        context.begin_frame(64, 64, 0.016);
        assert!(context.buffer(BufferKind::Game).is_empty());
        assert_eq!(context.info().renderables_loaded, 3);
    }

    #[test]
    fn end_frame_releases_frame_memory() {
        let mut context = context();
        context.begin_frame(64, 64, 0.016);
        let frame = context.frame_partition();
        context.encoder(BufferKind::Game, frame).push_draw_text(
            &[kestrel_encoding::Glyph {
                uv_min: [0.0; 2],
                uv_max: [1.0; 2],
                min: [0.0; 2],
                size: [4.0; 2],
                baseline: 0.0,
            }],
            kestrel_encoding::TextureId::NONE,
            Color::WHITE,
        );
        assert!(context.block().partition_info(frame).used() > 0);
        context.end_frame();
        assert_eq!(context.block().partition_info(frame).used(), 0);
        assert!(context.buffer(BufferKind::Game).is_empty());
        assert_eq!(context.frame_index(), 1);
    }

    #[test]
    fn profiler_draws_over_game() {
        let mut context = context();
        let mut renderer = SoftwareRenderer::new(SoftwareOptions {
            regions_x: 2,
            regions_y: 2,
            num_threads: NonZeroUsize::new(2),
            ..SoftwareOptions::default()
        });
        let mut target = Pixmap::new(64, 64);
        context.begin_frame(64, 64, 0.016);
        let frame = context.frame_partition();
        context
            .encoder(BufferKind::Profiler, frame)
            .push_draw_rect_overlay(&Rect::new(Vec2::splat(64.0)).with_color(Color::BLUE));
        context
            .encoder(BufferKind::Game, frame)
            .push_draw_rect_overlay(&Rect::new(Vec2::splat(64.0)).with_color(Color::RED));
        context
            .submit_frame(RenderTarget::Software {
                renderer: &mut renderer,
                target: &mut target,
            })
            .unwrap();
        assert_eq!(target.pixel(10, 10), Color::BLUE.to_premul_argb());
        context.end_frame();
    }

    #[test]
    #[should_panic(expected = "open temporary scope")]
    fn open_platform_scope_is_fatal_at_end_of_frame() {
        let mut context = context();
        context.begin_frame(64, 64, 0.016);
        let platform = context.platform_partition();
        core::mem::forget(context.block_mut().scoped(platform));
        context.end_frame();
    }

    #[test]
    #[should_panic(expected = "open temporary scope")]
    fn open_frame_scope_is_fatal_at_end_of_frame() {
        let mut context = context();
        context.begin_frame(64, 64, 0.016);
        let frame = context.frame_partition();
        core::mem::forget(context.block_mut().scoped(frame));
        context.end_frame();
    }

    #[test]
    #[should_panic(expected = "open temporary scope")]
    fn open_level_scope_is_fatal_at_end_of_frame() {
        let mut context = context();
        context.begin_frame(64, 64, 0.016);
        let level = context.level_partition();
        core::mem::forget(context.block_mut().scoped(level));
        context.end_frame();
    }

    #[test]
    #[should_panic(expected = "open temporary scope")]
    fn open_level_scope_is_fatal_at_end_of_level() {
        let mut context = context();
        context.begin_frame(64, 64, 0.016);
        context.end_frame();
        let level = context.level_partition();
        core::mem::forget(context.block_mut().scoped(level));
        context.end_level();
    }

    #[test]
    fn end_level_releases_level_memory() {
        let mut context = context();
        context.begin_frame(64, 64, 0.016);
        let level = context.level_partition();
        assert!(context.block().partition_info(level).used() > 0);
        context.end_frame();
        context.end_level();
        assert_eq!(context.block().partition_info(level).used(), 0);
    }
}
