// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// The maximum number of partitions a [`MemoryBlock`](crate::MemoryBlock) can hold.
pub const MAX_PARTITIONS: usize = 10;

/// Lookup key of a partition, derived from its name.
///
/// The key is the sum of the name's bytes, so it does not depend on the order of
/// the characters. Two names with the same key cannot coexist in one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartitionKey(pub u32);

impl PartitionKey {
    pub fn from_name(name: &str) -> Self {
        Self(name.bytes().map(u32::from).sum())
    }
}

/// Handle to a partition of a [`MemoryBlock`](crate::MemoryBlock).
///
/// Only valid for the block which created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartitionId(pub(crate) u8);

impl PartitionId {
    pub(crate) fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// A range of bytes handed out by a partition.
///
/// Spans are plain data and can be stored inside other allocations (the command
/// buffer does so for every variable-length payload).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    pub(crate) partition: PartitionId,
    pub(crate) offset: u32,
    pub(crate) len: u32,
    pub(crate) generation: u32,
}

impl Span {
    /// A span of zero bytes, valid in every partition and every generation.
    pub const EMPTY: Self = Self {
        partition: PartitionId(0),
        offset: 0,
        len: 0,
        generation: u32::MAX,
    };

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Offset of the first byte, relative to the start of the partition.
    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Packs the span into four words, for storage inside `Pod` records.
    pub fn to_words(self) -> [u32; 4] {
        [
            u32::from(self.partition.0),
            self.offset,
            self.len,
            self.generation,
        ]
    }

    /// Inverse of [`Span::to_words`].
    ///
    /// Returns `None` if the partition index is out of range.
    pub fn from_words(words: [u32; 4]) -> Option<Self> {
        let index = u8::try_from(words[0]).ok()?;
        if usize::from(index) >= MAX_PARTITIONS {
            return None;
        }
        Some(Self {
            partition: PartitionId(index),
            offset: words[1],
            len: words[2],
            generation: words[3],
        })
    }
}

/// A named linear region of a [`MemoryBlock`](crate::MemoryBlock).
#[derive(Clone, Debug)]
pub struct Partition {
    pub(crate) name: &'static str,
    pub(crate) key: PartitionKey,
    /// Byte offset of the partition inside the block storage.
    pub(crate) base: usize,
    pub(crate) capacity: usize,
    pub(crate) used: usize,
    pub(crate) temp_depth: u32,
    /// Bumped on every release; spans from older generations are stale.
    pub(crate) generation: u32,
}

impl Partition {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn key(&self) -> PartitionKey {
        self.key
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes currently allocated.
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    /// Number of [`ScopedMemory`](crate::ScopedMemory) guards currently open.
    pub fn temp_depth(&self) -> u32 {
        self.temp_depth
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub(crate) fn check_span(&self, span: Span) {
        if span.is_empty() {
            return;
        }
        assert_eq!(
            span.generation, self.generation,
            "stale span into partition `{}`: the partition was released after the span was allocated",
            self.name
        );
        assert!(
            span.offset() + span.len() <= self.used,
            "stale span into partition `{}`: bytes {}..{} were rolled back (used is {})",
            self.name,
            span.offset(),
            span.offset() + span.len(),
            self.used
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{PartitionKey, Span};

    #[test]
    fn key_ignores_character_order() {
        assert_eq!(PartitionKey::from_name("frame"), PartitionKey::from_name("emarf"));
        assert_ne!(PartitionKey::from_name("frame"), PartitionKey::from_name("level"));
    }

    #[test]
    fn span_words_reject_bad_partition() {
        assert!(Span::from_words([200, 0, 0, 0]).is_none());
        let words = [3, 16, 8, 2];
        let span = Span::from_words(words).unwrap();
        assert_eq!(span.to_words(), words);
        assert_eq!(span.offset(), 16);
        assert_eq!(span.len(), 8);
    }
}
