// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use kestrel_arena::{MemoryBlock, PartitionId, Span};

use crate::record::Record;
use crate::{Error, Result};

/// An append-only stream of [records](Record) stored in a partition.
///
/// The buffer owns a fixed span of `capacity` bytes, allocated once by
/// [`CommandBuffer::new`]. Resetting the buffer keeps that span, so the same storage
/// is reused every frame.
#[derive(Clone, Debug)]
pub struct CommandBuffer {
    storage: Span,
    capacity: usize,
    used_bytes: usize,
    entry_count: usize,
}

impl CommandBuffer {
    /// Allocates `capacity` bytes of record storage from `partition`.
    ///
    /// # Panics
    ///
    /// If the partition cannot hold `capacity` more bytes.
    pub fn new(block: &mut MemoryBlock, partition: PartitionId, capacity: usize) -> Self {
        let storage = block.allocate(partition, capacity);
        Self {
            storage,
            capacity,
            used_bytes: 0,
            entry_count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Appends a record.
    ///
    /// # Panics
    ///
    /// If the record does not fit in the remaining capacity.
    pub fn push(&mut self, block: &mut MemoryBlock, record: &Record) {
        self.try_push(block, record)
            .unwrap_or_else(|err| panic!("{err}"));
    }

    /// Appends a record, or reports that it does not fit. A failed push leaves the
    /// buffer unchanged.
    pub fn try_push(&mut self, block: &mut MemoryBlock, record: &Record) -> Result<()> {
        let size = record.encoded_size();
        if self.used_bytes + size > self.capacity {
            return Err(Error::BufferFull {
                requested: size,
                used: self.used_bytes,
                capacity: self.capacity,
            });
        }
        let bytes = block.bytes_mut(self.storage);
        record.write(&mut bytes[self.used_bytes..self.used_bytes + size]);
        self.used_bytes += size;
        self.entry_count += 1;
        Ok(())
    }

    /// Iterates over the records in push order.
    pub fn records<'a>(&self, block: &'a MemoryBlock) -> Records<'a> {
        let bytes = &block.bytes(self.storage)[..self.used_bytes];
        Records {
            bytes,
            remaining: self.entry_count,
        }
    }

    /// Forgets every record. The storage is kept.
    pub fn reset(&mut self) {
        self.used_bytes = 0;
        self.entry_count = 0;
    }
}

/// Iterator over the records of a [`CommandBuffer`], created by
/// [`CommandBuffer::records`].
///
/// # Panics
///
/// Iteration panics on a record which cannot be decoded. The buffer only ever holds
/// records written by [`CommandBuffer::push`], so this means the storage was
/// corrupted.
#[derive(Clone, Debug)]
pub struct Records<'a> {
    bytes: &'a [u8],
    remaining: usize,
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.remaining == 0 {
            return None;
        }
        let (record, size) =
            Record::read(self.bytes).unwrap_or_else(|err| panic!("corrupt command buffer: {err}"));
        self.bytes = &self.bytes[size..];
        self.remaining -= 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Records<'_> {}
