// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A fixed pool of worker threads draining a bounded work queue.

use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicUsize, Ordering};
use std::num::NonZeroUsize;

use crossbeam_channel::{Receiver, TrySendError};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Maximum number of queued work items.
pub(crate) const QUEUE_CAPACITY: usize = 256;

pub(crate) struct WorkerPool {
    thread_pool: ThreadPool,
    num_threads: usize,
}

impl WorkerPool {
    pub(crate) fn new(num_threads: Option<NonZeroUsize>) -> Self {
        let num_threads = num_threads
            .or_else(|| std::thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get);
        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("kestrel-worker-{index}"))
            .build()
            .unwrap_or_else(|err| panic!("failed to start the worker pool: {err}"));
        Self {
            thread_pool,
            num_threads,
        }
    }

    pub(crate) fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Runs `work` once for every item and returns when all of them completed.
    ///
    /// Items go through a bounded queue drained by every worker. The calling thread
    /// drains the queue as well, both while it is full and once everything is queued,
    /// then spins until the completion count reaches the number of items.
    pub(crate) fn run<T, F>(&self, items: Vec<T>, work: F)
    where
        T: Send,
        F: Fn(T) + Sync,
    {
        let goal = items.len();
        let completed = AtomicUsize::new(0);
        let (sender, receiver) = crossbeam_channel::bounded::<T>(QUEUE_CAPACITY);

        self.thread_pool.in_place_scope(|scope| {
            for _ in 0..self.num_threads {
                let receiver = receiver.clone();
                let work = &work;
                let completed = &completed;
                scope.spawn(move |_| {
                    while let Ok(item) = receiver.recv() {
                        execute(work, item, completed);
                    }
                });
            }

            for item in items {
                let mut pending = item;
                loop {
                    match sender.try_send(pending) {
                        Ok(()) => break,
                        Err(TrySendError::Full(item)) => {
                            pending = item;
                            drain_one(&receiver, &work, &completed);
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            unreachable!("the pool holds a receiver until every item is queued")
                        }
                    }
                }
            }
            drop(sender);

            while drain_one(&receiver, &work, &completed) {}
            while completed.load(Ordering::Acquire) < goal {
                core::hint::spin_loop();
            }
        });
    }
}

fn drain_one<T, F: Fn(T)>(receiver: &Receiver<T>, work: &F, completed: &AtomicUsize) -> bool {
    match receiver.try_recv() {
        Ok(item) => {
            execute(work, item, completed);
            true
        }
        Err(_) => false,
    }
}

fn execute<T, F: Fn(T)>(work: &F, item: T, completed: &AtomicUsize) {
    // Counted on drop, so a panicking item cannot leave the caller spinning forever.
    let _done = Completion(completed);
    work(item);
}

struct Completion<'a>(&'a AtomicUsize);

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Release);
    }
}

impl Debug for WorkerPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_threads", &self.num_threads)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{QUEUE_CAPACITY, WorkerPool};
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::num::NonZeroUsize;

    #[test]
    fn every_item_runs_once() {
        let pool = WorkerPool::new(NonZeroUsize::new(3));
        let hits: Vec<AtomicUsize> = (0..QUEUE_CAPACITY * 3).map(|_| AtomicUsize::new(0)).collect();
        pool.run((0..hits.len()).collect(), |index: usize| {
            hits[index].fetch_add(1, Ordering::Relaxed);
        });
        assert!(hits.iter().all(|hit| hit.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn items_may_borrow_mutably() {
        let pool = WorkerPool::new(NonZeroUsize::new(2));
        let mut values = [0_u32; 64];
        let items: Vec<&mut u32> = values.iter_mut().collect();
        pool.run(items, |value| *value += 7);
        assert!(values.iter().all(|&value| value == 7));
    }

    #[test]
    fn empty_batch_returns_immediately() {
        let pool = WorkerPool::new(None);
        assert!(pool.num_threads() >= 1);
        pool.run(Vec::<u32>::new(), |_| unreachable!());
    }
}
