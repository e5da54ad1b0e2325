// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::ops::{Deref, DerefMut};

use crate::block::MemoryBlock;
use crate::partition::PartitionId;

/// A temporary allocation scope on one partition.
///
/// Created by [`MemoryBlock::scoped`]. The guard dereferences to the block, so
/// allocations (and nested scopes) go through it. When the guard is dropped the
/// partition's used amount is rolled back to what it was when the scope opened.
///
/// Because a nested scope borrows its parent mutably, scopes always end in LIFO
/// order. The checks on drop catch the remaining ways to break the stack
/// discipline, such as releasing the partition while the scope is open.
pub struct ScopedMemory<'a> {
    block: &'a mut MemoryBlock,
    partition: PartitionId,
    saved_used: usize,
}

impl<'a> ScopedMemory<'a> {
    pub(crate) fn new(block: &'a mut MemoryBlock, partition: PartitionId) -> Self {
        let info = block.partition_mut(partition);
        info.temp_depth += 1;
        let saved_used = info.used;
        Self {
            block,
            partition,
            saved_used,
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// The used amount the partition returns to when this scope ends.
    pub fn saved_used(&self) -> usize {
        self.saved_used
    }

    /// Ends the scope. Equivalent to dropping the guard.
    pub fn end(self) {}
}

impl Deref for ScopedMemory<'_> {
    type Target = MemoryBlock;

    fn deref(&self) -> &MemoryBlock {
        self.block
    }
}

impl DerefMut for ScopedMemory<'_> {
    fn deref_mut(&mut self) -> &mut MemoryBlock {
        self.block
    }
}

impl Drop for ScopedMemory<'_> {
    fn drop(&mut self) {
        let info = self.block.partition_mut(self.partition);
        assert!(
            info.used >= self.saved_used,
            "temporary scope on partition `{}` ended out of order: used amount {} is below the saved mark {}",
            info.name,
            info.used,
            self.saved_used
        );
        assert!(
            info.temp_depth > 0,
            "temporary scope on partition `{}` ended with no scope open",
            info.name
        );
        info.used = self.saved_used;
        info.temp_depth -= 1;
    }
}

impl core::fmt::Debug for ScopedMemory<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScopedMemory")
            .field("partition", &self.partition)
            .field("saved_used", &self.saved_used)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::{MemoryBlock, MemoryOptions, PartitionId};

    fn block_with_frame(size: usize) -> (MemoryBlock, PartitionId) {
        let mut block = MemoryBlock::new(MemoryOptions {
            total_size: size,
            permanent_size: 0,
        });
        let frame = block.create_partition("frame", size);
        (block, frame)
    }

    #[test]
    fn nested_scopes_roll_back() {
        let (mut block, frame) = block_with_frame(1024);
        block.allocate(frame, 10);
        {
            let mut outer = block.scoped(frame);
            outer.allocate(frame, 100);
            {
                let mut inner = outer.scoped(frame);
                assert_eq!(inner.partition_info(frame).temp_depth(), 2);
                inner.allocate(frame, 200);
                assert_eq!(inner.saved_used(), 110);
            }
            assert_eq!(outer.partition_info(frame).used(), 110);
            assert_eq!(outer.partition_info(frame).temp_depth(), 1);
        }
        assert_eq!(block.partition_info(frame).used(), 10);
        block.assert_temp_memory_cleared(frame);
    }

    #[test]
    #[should_panic(expected = "ended out of order")]
    fn release_inside_scope_is_fatal() {
        let (mut block, frame) = block_with_frame(1024);
        block.allocate(frame, 16);
        let mut scope = block.scoped(frame);
        scope.release(frame);
        scope.end();
    }

    #[test]
    #[should_panic(expected = "open temporary scope")]
    fn leaked_scope_is_detected() {
        let (mut block, frame) = block_with_frame(1024);
        let scope = block.scoped(frame);
        core::mem::forget(scope);
        block.assert_temp_memory_cleared(frame);
    }

    #[test]
    #[should_panic(expected = "stale span")]
    fn rolled_back_span_is_stale() {
        let (mut block, frame) = block_with_frame(1024);
        let span = {
            let mut scope = block.scoped(frame);
            scope.push_slice(frame, &[1_u32, 2, 3])
        };
        let _ = block.slice::<u32>(span);
    }

    proptest! {
        #[test]
        fn allocations_are_monotonic_and_disjoint(sizes in prop::collection::vec(0_usize..64, 0..64)) {
            let (mut block, frame) = block_with_frame(64 * 64);
            let mut last_used = 0;
            let mut last_end = 0;
            for size in sizes {
                let span = block.allocate(frame, size);
                let used = block.partition_info(frame).used();
                prop_assert!(used >= last_used);
                prop_assert!(span.offset() >= last_end);
                prop_assert_eq!(span.offset() + span.len(), used);
                last_used = used;
                last_end = span.offset() + span.len();
            }
        }

        #[test]
        fn scopes_restore_used_amount(
            before in 0_usize..256,
            outer in 0_usize..256,
            inner in prop::collection::vec(0_usize..256, 0..8),
        ) {
            let (mut block, frame) = block_with_frame(4096);
            block.allocate(frame, before);
            {
                let mut scope = block.scoped(frame);
                scope.allocate(frame, outer);
                for size in inner {
                    let mut nested = scope.scoped(frame);
                    nested.allocate(frame, size);
                }
                prop_assert_eq!(scope.partition_info(frame).used(), before + outer);
            }
            prop_assert_eq!(block.partition_info(frame).used(), before);
            prop_assert_eq!(block.partition_info(frame).temp_depth(), 0);
        }
    }
}
