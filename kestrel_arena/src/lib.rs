// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A single pre-allocated memory block carved into named linear partitions.
//!
//! Everything the renderer needs per frame or per level is bump-allocated out of a
//! [`MemoryBlock`] which is created once at startup. The block is split into:
//!
//! - an optional permanent store, for state which lives as long as the program;
//! - up to [`MAX_PARTITIONS`] named [partitions](Partition), each a linear region
//!   which only ever grows until it is released wholesale or rolled back by a
//!   [`ScopedMemory`] guard.
//!
//! Allocations are addressed by [`Span`] handles rather than pointers. A span
//! remembers the generation of its partition, so reading through a span after its
//! partition was [released](MemoryBlock::release) is caught instead of silently
//! returning reused memory.
//!
//! ```
//! use kestrel_arena::{MemoryBlock, MemoryOptions};
//!
//! let mut block = MemoryBlock::new(MemoryOptions {
//!     total_size: 1 << 16,
//!     permanent_size: 0,
//! });
//! let frame = block.create_partition("frame", 1 << 12);
//! let before = block.partition_info(frame).used();
//! {
//!     let mut scratch = block.scoped(frame);
//!     let span = scratch.push_slice(frame, &[1_u32, 2, 3]);
//!     assert_eq!(scratch.slice::<u32>(span), &[1, 2, 3]);
//! }
//! assert_eq!(block.partition_info(frame).used(), before);
//! ```
//!
//! All invariant violations are fatal. The `try_` methods report the same
//! conditions as an [`Error`] for callers which want to add context before aborting.

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

mod block;
mod partition;
mod scope;

pub use block::{MemoryBlock, MemoryOptions};
pub use partition::{MAX_PARTITIONS, Partition, PartitionId, PartitionKey, Span};
pub use scope::ScopedMemory;

use thiserror::Error;

/// Errors which can occur while carving up or allocating from a [`MemoryBlock`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The block does not have enough unpartitioned space left for a new partition.
    #[error("partition `{name}` needs {requested} bytes but only {available} remain in the memory block")]
    BlockExhausted {
        name: &'static str,
        requested: usize,
        available: usize,
    },
    /// Every partition slot is already taken.
    #[error(
        "cannot create partition `{0}`: the memory block already holds {max} partitions",
        max = MAX_PARTITIONS
    )]
    TooManyPartitions(&'static str),
    /// Two partition names produce the same lookup key.
    #[error("partition `{new}` has the same key as existing partition `{existing}`")]
    DuplicatePartitionKey {
        new: &'static str,
        existing: &'static str,
    },
    /// A partition cannot satisfy an allocation.
    #[error(
        "partition `{name}` exhausted: {requested} bytes requested with {used} of {capacity} bytes used"
    )]
    PartitionExhausted {
        name: &'static str,
        requested: usize,
        used: usize,
        capacity: usize,
    },
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;
