// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;

use bytemuck::Pod;

use crate::partition::{MAX_PARTITIONS, Partition, PartitionId, PartitionKey, Span};
use crate::scope::ScopedMemory;
use crate::{Error, Result};

/// Alignment of every partition base, and the largest alignment `push_slice` supports.
const PARTITION_ALIGN: usize = 8;

/// Sizes used when creating a [`MemoryBlock`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryOptions {
    /// Size of the whole block in bytes, including the permanent store.
    pub total_size: usize,
    /// Bytes reserved at the start of the block for [`MemoryBlock::permanent_mut`].
    pub permanent_size: usize,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            total_size: 1 << 30,
            permanent_size: 64 << 20,
        }
    }
}

/// One large allocation, split into a permanent store and named partitions.
///
/// The storage is allocated (zeroed) once in [`MemoryBlock::new`]; no further memory is
/// requested afterwards.
pub struct MemoryBlock {
    /// Backing storage. Held as words so that every partition base is 8-byte aligned.
    storage: Box<[u64]>,
    total_size: usize,
    permanent_size: usize,
    /// First byte of the block not claimed by the permanent store or a partition.
    unpartitioned: usize,
    partitions: Vec<Partition>,
}

impl MemoryBlock {
    /// Allocates the block.
    ///
    /// # Panics
    ///
    /// If the permanent store does not fit in the block.
    pub fn new(options: MemoryOptions) -> Self {
        assert!(
            options.permanent_size <= options.total_size,
            "permanent store of {} bytes does not fit in a {} byte memory block",
            options.permanent_size,
            options.total_size
        );
        let words = options.total_size.div_ceil(size_of::<u64>());
        Self {
            storage: vec![0_u64; words].into_boxed_slice(),
            total_size: options.total_size,
            permanent_size: options.permanent_size,
            unpartitioned: options.permanent_size.next_multiple_of(PARTITION_ALIGN),
            partitions: Vec::with_capacity(MAX_PARTITIONS),
        }
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Bytes still available for new partitions.
    pub fn unpartitioned_size(&self) -> usize {
        self.total_size.saturating_sub(self.unpartitioned)
    }

    pub fn permanent(&self) -> &[u8] {
        &self.as_bytes()[..self.permanent_size]
    }

    pub fn permanent_mut(&mut self) -> &mut [u8] {
        let size = self.permanent_size;
        &mut self.as_bytes_mut()[..size]
    }

    /// Carves a new partition of `size` bytes out of the unpartitioned space.
    ///
    /// # Panics
    ///
    /// On any of the conditions reported by [`MemoryBlock::try_create_partition`].
    pub fn create_partition(&mut self, name: &'static str, size: usize) -> PartitionId {
        self.try_create_partition(name, size)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_create_partition(&mut self, name: &'static str, size: usize) -> Result<PartitionId> {
        if self.partitions.len() >= MAX_PARTITIONS {
            return Err(Error::TooManyPartitions(name));
        }
        let key = PartitionKey::from_name(name);
        if let Some(existing) = self.partitions.iter().find(|p| p.key == key) {
            return Err(Error::DuplicatePartitionKey {
                new: name,
                existing: existing.name,
            });
        }
        let base = self.unpartitioned.next_multiple_of(PARTITION_ALIGN);
        let available = self.total_size.saturating_sub(base);
        if size > available {
            return Err(Error::BlockExhausted {
                name,
                requested: size,
                available,
            });
        }
        let id = PartitionId(self.partitions.len() as u8);
        self.partitions.push(Partition {
            name,
            key,
            base,
            capacity: size,
            used: 0,
            temp_depth: 0,
            generation: 0,
        });
        self.unpartitioned = base + size;
        log::info!("created partition `{name}` with {size} bytes");
        Ok(id)
    }

    /// Finds a partition by name.
    ///
    /// The lookup goes through the [`PartitionKey`], so any permutation of the name's
    /// characters finds the same partition.
    pub fn partition(&self, name: &str) -> Option<PartitionId> {
        let key = PartitionKey::from_name(name);
        self.partitions
            .iter()
            .position(|p| p.key == key)
            .map(|index| PartitionId(index as u8))
    }

    pub fn partition_info(&self, id: PartitionId) -> &Partition {
        &self.partitions[id.index()]
    }

    pub fn partitions(&self) -> impl Iterator<Item = (PartitionId, &Partition)> {
        self.partitions
            .iter()
            .enumerate()
            .map(|(index, p)| (PartitionId(index as u8), p))
    }

    pub(crate) fn partition_mut(&mut self, id: PartitionId) -> &mut Partition {
        &mut self.partitions[id.index()]
    }

    /// Bump-allocates exactly `size` bytes.
    ///
    /// # Panics
    ///
    /// If the partition cannot hold `size` more bytes.
    pub fn allocate(&mut self, id: PartitionId, size: usize) -> Span {
        self.try_allocate(id, size)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_allocate(&mut self, id: PartitionId, size: usize) -> Result<Span> {
        self.try_allocate_aligned(id, size, 1)
    }

    fn try_allocate_aligned(&mut self, id: PartitionId, size: usize, align: usize) -> Result<Span> {
        let partition = self.partition_mut(id);
        let start = partition.used.next_multiple_of(align);
        if start + size > partition.capacity {
            return Err(Error::PartitionExhausted {
                name: partition.name,
                requested: size,
                used: partition.used,
                capacity: partition.capacity,
            });
        }
        partition.used = start + size;
        Ok(Span {
            partition: id,
            offset: start as u32,
            len: size as u32,
            generation: partition.generation,
        })
    }

    /// Copies `data` into freshly allocated storage sized exactly to it.
    ///
    /// The start of the allocation is aligned for `T`, so the span can be read back with
    /// [`MemoryBlock::slice`].
    ///
    /// # Panics
    ///
    /// If the partition cannot hold the data, or `T` needs more than 8-byte alignment.
    pub fn push_slice<T: Pod>(&mut self, id: PartitionId, data: &[T]) -> Span {
        self.try_push_slice(id, data)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_push_slice<T: Pod>(&mut self, id: PartitionId, data: &[T]) -> Result<Span> {
        assert!(
            align_of::<T>() <= PARTITION_ALIGN,
            "partitions only guarantee {PARTITION_ALIGN}-byte alignment"
        );
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let span = self.try_allocate_aligned(id, bytes.len(), align_of::<T>())?;
        self.bytes_mut(span).copy_from_slice(bytes);
        Ok(span)
    }

    /// Pops `size` bytes off the top of the partition.
    ///
    /// # Panics
    ///
    /// If fewer than `size` bytes are in use.
    pub fn free_size(&mut self, id: PartitionId, size: usize) {
        let partition = self.partition_mut(id);
        assert!(
            size <= partition.used,
            "cannot free {size} bytes from partition `{}` which only has {} bytes in use",
            partition.name,
            partition.used
        );
        partition.used -= size;
    }

    /// Opens a temporary scope on the partition.
    ///
    /// Everything allocated from the partition while the returned guard is alive is
    /// reclaimed when it is dropped.
    pub fn scoped(&mut self, id: PartitionId) -> ScopedMemory<'_> {
        ScopedMemory::new(self, id)
    }

    /// Resets the partition to empty, closing any temporary scopes.
    ///
    /// Spans handed out before the release become stale.
    pub fn release(&mut self, id: PartitionId) {
        let partition = self.partition_mut(id);
        if partition.used != 0 {
            partition.generation = partition.generation.wrapping_add(1);
        }
        partition.used = 0;
        partition.temp_depth = 0;
    }

    /// # Panics
    ///
    /// If a temporary scope is still open on the partition.
    pub fn assert_temp_memory_cleared(&self, id: PartitionId) {
        let partition = self.partition_info(id);
        assert_eq!(
            partition.temp_depth, 0,
            "partition `{}` still has {} open temporary scope(s)",
            partition.name, partition.temp_depth
        );
    }

    pub fn bytes(&self, span: Span) -> &[u8] {
        if span.is_empty() {
            return &[];
        }
        let partition = self.partition_info(span.partition);
        partition.check_span(span);
        let start = partition.base + span.offset();
        &self.as_bytes()[start..start + span.len()]
    }

    pub fn bytes_mut(&mut self, span: Span) -> &mut [u8] {
        if span.is_empty() {
            return &mut [];
        }
        let partition = self.partition_info(span.partition);
        partition.check_span(span);
        let start = partition.base + span.offset();
        &mut self.as_bytes_mut()[start..start + span.len()]
    }

    /// Views a span as a slice of `T`.
    ///
    /// # Panics
    ///
    /// If the span is stale, or was not allocated with the alignment and a length
    /// suitable for `T` (as [`MemoryBlock::push_slice`] does).
    pub fn slice<T: Pod>(&self, span: Span) -> &[T] {
        if span.is_empty() {
            return &[];
        }
        bytemuck::cast_slice(self.bytes(span))
    }

    fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.storage)[..self.total_size]
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        let total = self.total_size;
        &mut bytemuck::cast_slice_mut(&mut self.storage)[..total]
    }
}

impl fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("total_size", &self.total_size)
            .field("permanent_size", &self.permanent_size)
            .field("unpartitioned", &self.unpartitioned)
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryBlock, MemoryOptions};
    use crate::{Error, MAX_PARTITIONS};

    fn small_block() -> MemoryBlock {
        MemoryBlock::new(MemoryOptions {
            total_size: 4096,
            permanent_size: 100,
        })
    }

    #[test]
    fn partitions_do_not_alias() {
        let mut block = small_block();
        let a = block.create_partition("a", 64);
        let b = block.create_partition("b", 64);
        let span_a = block.push_slice(a, &[0xAA_u8; 64]);
        let span_b = block.push_slice(b, &[0xBB_u8; 64]);
        assert!(block.bytes(span_a).iter().all(|&byte| byte == 0xAA));
        assert!(block.bytes(span_b).iter().all(|&byte| byte == 0xBB));
        // The permanent store is untouched, and partitions start 8-byte aligned after it.
        assert!(block.permanent().iter().all(|&byte| byte == 0));
        assert_eq!(block.partition_info(a).base, 104);
        assert_eq!(block.partition_info(b).base, 168);
    }

    #[test]
    fn lookup_by_name() {
        let mut block = small_block();
        let level = block.create_partition("level", 128);
        assert_eq!(block.partition("level"), Some(level));
        assert_eq!(block.partition("vlele"), Some(level));
        assert_eq!(block.partition("frame"), None);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut block = small_block();
        block.create_partition("ab", 16);
        assert_eq!(
            block.try_create_partition("ba", 16),
            Err(Error::DuplicatePartitionKey {
                new: "ba",
                existing: "ab"
            })
        );
    }

    #[test]
    fn partition_slots_are_limited() {
        const NAMES: [&str; MAX_PARTITIONS] = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];
        let mut block = small_block();
        for name in NAMES {
            block.create_partition(name, 8);
        }
        assert_eq!(
            block.try_create_partition("k", 8),
            Err(Error::TooManyPartitions("k"))
        );
    }

    #[test]
    #[should_panic(expected = "remain in the memory block")]
    fn oversized_partition_is_fatal() {
        let mut block = small_block();
        block.create_partition("huge", 4096);
    }

    #[test]
    fn allocation_is_exact() {
        let mut block = small_block();
        let frame = block.create_partition("frame", 16);
        let first = block.allocate(frame, 3);
        let second = block.allocate(frame, 13);
        assert_eq!((first.offset(), first.len()), (0, 3));
        assert_eq!((second.offset(), second.len()), (3, 13));
        assert_eq!(block.partition_info(frame).remaining(), 0);
        assert!(matches!(
            block.try_allocate(frame, 1),
            Err(Error::PartitionExhausted {
                requested: 1,
                used: 16,
                capacity: 16,
                ..
            })
        ));
    }

    #[test]
    #[should_panic(expected = "partition `frame` exhausted")]
    fn over_allocation_is_fatal() {
        let mut block = small_block();
        let frame = block.create_partition("frame", 16);
        block.allocate(frame, 17);
    }

    #[test]
    fn push_slice_aligns_for_element_type() {
        let mut block = small_block();
        let frame = block.create_partition("frame", 64);
        block.allocate(frame, 1);
        let floats = block.push_slice(frame, &[1.5_f32, -2.0]);
        assert_eq!(floats.offset(), 4);
        assert_eq!(floats.len(), 8);
        assert_eq!(block.slice::<f32>(floats), &[1.5, -2.0]);
        let empty = block.push_slice::<u32>(frame, &[]);
        assert!(block.slice::<u32>(empty).is_empty());
    }

    #[test]
    fn release_is_idempotent_on_clean_partition() {
        let mut block = small_block();
        let frame = block.create_partition("frame", 64);
        block.allocate(frame, 40);
        block.release(frame);
        let after_first = block.partition_info(frame).clone();
        assert_eq!(after_first.used(), 0);
        block.release(frame);
        let after_second = block.partition_info(frame);
        assert_eq!(after_second.used(), 0);
        assert_eq!(after_second.temp_depth(), 0);
        assert_eq!(after_second.generation(), after_first.generation());
    }

    #[test]
    #[should_panic(expected = "stale span")]
    fn span_is_stale_after_release() {
        let mut block = small_block();
        let frame = block.create_partition("frame", 64);
        let span = block.push_slice(frame, &[7_u32; 4]);
        block.release(frame);
        // Reallocate so the bytes are in range again; the generation still differs.
        block.allocate(frame, 32);
        let _ = block.bytes(span);
    }

    #[test]
    fn free_size_pops_from_the_top() {
        let mut block = small_block();
        let frame = block.create_partition("frame", 64);
        block.allocate(frame, 24);
        block.free_size(frame, 8);
        assert_eq!(block.partition_info(frame).used(), 16);
        let next = block.allocate(frame, 4);
        assert_eq!(next.offset(), 16);
    }

    #[test]
    fn permanent_store_is_writable() {
        let mut block = small_block();
        block.permanent_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(&block.permanent()[..4], &[1, 2, 3, 4]);
        assert_eq!(block.permanent().len(), 100);
    }

    static_assertions::assert_impl_all!(MemoryBlock: Send, Sync);
}
