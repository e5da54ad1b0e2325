// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The Kestrel render command stream.
//!
//! Game code describes a frame by pushing [records](Record) through an [`Encoder`]
//! into a [`CommandBuffer`]. The buffer lives in a partition of a
//! [`MemoryBlock`](kestrel_arena::MemoryBlock), and any variable-length payload
//! (vertices, indices, glyph runs, pixels) is copied into a partition chosen by the
//! caller, so producer memory can be reused as soon as a push returns.
//!
//! A backend consumes the buffer in a single pass with [`CommandBuffer::records`].
//!
//! Coordinates are y-up everywhere. Screen space has its origin in the bottom left
//! corner, angles are in radians and images are stored bottom row first. Top-down
//! inputs (decoded images, font atlases) are converted when they are loaded, by
//! [`Bitmap`] and [`GlyphAtlas`].

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
// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
// Feel free to send a PR that solves one or more of these.
#![allow(missing_docs, reason = "We have many as-yet undocumented items.")]
#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_panics_doc,
    reason = "Deferred"
)]

mod bitmap;
mod buffer;
mod color;
mod encoder;
mod info;
mod math;
mod mesh;
mod record;
mod text;

pub use bitmap::Bitmap;
pub use buffer::{CommandBuffer, Records};
pub use color::Color;
pub use encoder::{Cube, Encoder, Rect};
pub use info::{ClearParams, RenderInfo};
pub use math::{
    Camera, OVERLAY_TO_NDC, Origin, Projection, Transform, invert, rect_model_matrix,
    rotation_matrix, to_row_major, world_matrix,
};
pub use mesh::{
    CUBE_INDICES, CUBE_POSITIONS, QUAD_INDICES, QUAD_POSITIONS, QUAD_UVS, VertexAttributes,
    VertexLayout, cube_vertices, rect_vertices, text_quad_vertices,
};
pub use record::{
    CubeDraw, Glyph, LineDraw, MAX_GLYPHS, MeshDraw, MeshId, Record, RecordTag, RectDraw,
    TextDraw, TextureId, TextureLoad, VertexData,
};
pub use text::{GlyphAtlas, GlyphRun, PackedChar};

/// Re-exported so that downstream crates use the same math types.
pub use glam;

use thiserror::Error;

/// Errors produced while writing or reading a command stream.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A record does not fit in the remaining space of the command buffer.
    #[error(
        "command buffer full: record of {requested} bytes does not fit ({used} of {capacity} bytes used)"
    )]
    BufferFull {
        requested: usize,
        used: usize,
        capacity: usize,
    },
    /// A glyph run is longer than [`MAX_GLYPHS`].
    #[error("glyph run of {0} characters exceeds the limit of {max}", max = MAX_GLYPHS)]
    TooManyGlyphs(usize),
    /// The stream contains a tag which does not name a record.
    #[error("unknown record tag {0:#x}")]
    UnknownTag(u32),
    /// The stream ends in the middle of a record.
    #[error("record with tag {tag:#x} truncated: needs {needed} bytes, {available} available")]
    Truncated {
        tag: u32,
        needed: usize,
        available: usize,
    },
    /// A field of a record holds a value outside its domain.
    #[error("invalid {field} value {value} in record")]
    InvalidField { field: &'static str, value: u32 },
    /// Payload storage could not be allocated.
    #[error(transparent)]
    Arena(#[from] kestrel_arena::Error),
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;
