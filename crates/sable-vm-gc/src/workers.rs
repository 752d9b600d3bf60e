//! Parallel worker gangs and claim-based work distribution.
//!
//! GC phases are bulk-synchronous: a gang of workers is launched, each runs
//! the same task body with its worker id, and the phase ends when every
//! worker has returned. Work inside a phase is distributed by atomic
//! fetch-increment claiming over a shared cursor, so load balancing needs no
//! locks and no pre-partitioning.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// A fixed-capacity pool of GC worker threads.
///
/// Workers are materialized per phase with `std::thread::scope`, which lets
/// task bodies borrow the heap directly; the pool only fixes the upper bound
/// on gang size.
pub struct WorkerPool {
    max_workers: usize,
}

impl WorkerPool {
    /// Create a pool allowing up to `max_workers` concurrent workers.
    pub fn new(max_workers: usize) -> Self {
        assert!(max_workers >= 1, "worker pool needs at least one worker");
        Self { max_workers }
    }

    /// Upper bound on gang size.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run `task(worker_id)` on `nworkers` workers and join them all.
    ///
    /// `nworkers` is clamped to the pool maximum. A single-worker gang runs
    /// inline on the calling thread.
    pub fn run_task<F>(&self, nworkers: usize, task: F)
    where
        F: Fn(usize) + Sync,
    {
        let n = nworkers.clamp(1, self.max_workers);
        if n == 1 {
            task(0);
            return;
        }
        thread::scope(|s| {
            for worker_id in 0..n {
                let task = &task;
                s.spawn(move || task(worker_id));
            }
        });
    }
}

/// Sizes worker gangs for the individual collection kinds.
pub struct WorkerPolicy;

impl WorkerPolicy {
    /// Gang size for a full (stop-the-world) collection: every core we are
    /// allowed to use, since the world is stopped anyway.
    pub fn calc_workers_for_fullgc(max_workers: usize, requested: usize) -> usize {
        if requested != 0 {
            return requested.clamp(1, max_workers);
        }
        let parallelism = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        parallelism.clamp(1, max_workers)
    }
}

/// Atomic fetch-increment cursor over `0..limit`.
///
/// Each `claim_next` hands out a distinct index exactly once; when the range
/// is exhausted it keeps returning `None`.
pub struct ClaimCursor {
    next: AtomicUsize,
    limit: usize,
}

impl ClaimCursor {
    /// Create a cursor over `0..limit`.
    pub fn new(limit: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            limit,
        }
    }

    /// Claim the next unclaimed index, if any.
    #[inline]
    pub fn claim_next(&self) -> Option<usize> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed);
        (idx < self.limit).then_some(idx)
    }
}
