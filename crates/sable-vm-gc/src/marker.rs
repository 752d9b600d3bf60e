//! Stop-the-world marking.
//!
//! ## Design
//!
//! - **Parallel root scan**: root groups are fanned out over the gang via
//!   the root processor's claim cursor, seeding a shared injector queue.
//! - **Work-stealing drain**: each worker owns a deque and steals from the
//!   injector and from its peers until the whole system is empty.
//! - **TAMS-aware liveness**: marks land in the *next* bitmap; objects
//!   allocated above a region's next-TAMS are implicitly live.
//! - **Reference discovery**: reaching a weak/soft reference object while
//!   discovery is active registers it with the reference processor instead
//!   of tracing the referent; the discovered lists are resolved after the
//!   fixpoint.
//! - **Class unloading**: code blobs whose holder died are purged after
//!   marking; with unloading disabled, holders are ordinary strong roots.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use parking_lot::Mutex;

use crate::heap::{Heap, HeapAddr};
use crate::object::{BrooksPointer, NULL_REF, tags};
use crate::roots::RootProcessor;

/// The shared marker, configured per cycle.
///
/// Full GC drives it in stop-the-world mode: update roots, mark roots,
/// drain to fixpoint, process references, then swap the bitmaps so the
/// result becomes authoritative.
pub struct Marker<'heap> {
    heap: &'heap Heap,
    process_references: bool,
    unload_classes: bool,
    worklist: Injector<HeapAddr>,
    marked: AtomicUsize,
}

impl<'heap> Marker<'heap> {
    /// Create a marker with the heap-configured defaults.
    pub fn new(heap: &'heap Heap) -> Self {
        Self {
            heap,
            process_references: heap.config().ref_processing_enabled,
            unload_classes: heap.config().class_unloading_enabled,
            worklist: Injector::new(),
            marked: AtomicUsize::new(0),
        }
    }

    /// Process soft/weak references this cycle. When disabled, referent
    /// slots (and weak handles) are traced as strong edges.
    pub fn set_process_references(&mut self, value: bool) {
        self.process_references = value;
    }

    /// Whether reference processing is on for this cycle.
    pub fn process_references(&self) -> bool {
        self.process_references
    }

    /// Purge code blobs with dead holders this cycle.
    pub fn set_unload_classes(&mut self, value: bool) {
        self.unload_classes = value;
    }

    /// Whether class unloading is on for this cycle.
    pub fn unload_classes(&self) -> bool {
        self.unload_classes
    }

    /// Objects marked so far in this cycle.
    pub fn marked_count(&self) -> usize {
        self.marked.load(Ordering::Relaxed)
    }

    /// Re-resolve every root slot through its referent's forwarding header.
    /// Recovers roots left stale by a cancelled concurrent cycle.
    pub fn update_roots(&self, nworkers: usize) {
        let heap = self.heap;
        let rp = RootProcessor::new(heap.roots(), true, true);
        heap.workers().run_task(nworkers, |worker_id| {
            rp.process_all_roots(worker_id, |slot| {
                let obj = slot.load(Ordering::Relaxed);
                if obj != NULL_REF {
                    slot.store(BrooksPointer::get_raw(heap, obj), Ordering::Relaxed);
                }
            });
        });
    }

    /// Mark every strong root and seed the worklist.
    pub fn mark_roots(&self, nworkers: usize) {
        let heap = self.heap;
        // With reference processing off, weak handles are strong. With class
        // unloading on, code holders must be allowed to die.
        let include_weak = !self.process_references;
        let include_code_holders = !self.unload_classes;
        let rp = RootProcessor::new(heap.roots(), include_weak, include_code_holders);
        heap.workers().run_task(nworkers, |worker_id| {
            rp.process_all_roots(worker_id, |slot| {
                let obj = slot.load(Ordering::Relaxed);
                if obj != NULL_REF && self.try_mark(obj) {
                    self.worklist.push(obj);
                }
            });
        });
    }

    /// Drain the worklist to fixpoint with all workers, then process
    /// references and unload dead code.
    pub fn finish_mark_from_roots(&self, nworkers: usize) {
        self.drain_worklist(nworkers);
        if self.process_references {
            self.process_reference_queue();
        }
        if self.unload_classes {
            self.unload_dead_code();
        }

        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "sable::gc",
            marked = self.marked_count(),
            "marking fixpoint reached"
        );
    }

    fn drain_worklist(&self, nworkers: usize) {
        let n = nworkers.clamp(1, self.heap.workers().max_workers());
        let locals: Vec<Mutex<Option<Worker<HeapAddr>>>> = (0..n)
            .map(|_| Mutex::new(Some(Worker::new_fifo())))
            .collect();
        let stealers: Vec<Stealer<HeapAddr>> = locals
            .iter()
            .map(|slot| slot.lock().as_ref().expect("deque present").stealer())
            .collect();

        self.heap.workers().run_task(n, |worker_id| {
            let local = locals[worker_id]
                .lock()
                .take()
                .expect("worker deque claimed exactly once");
            // Termination: a worker leaves only after finding its own deque,
            // the injector, and every peer's deque empty. Peers drain their
            // own deque before leaving, so no marked object goes untraced.
            loop {
                let task = local
                    .pop()
                    .or_else(|| self.steal_work(&local, worker_id, &stealers));
                match task {
                    Some(obj) => self.trace_object(obj, &local),
                    None => break,
                }
            }
        });
    }

    fn steal_work(
        &self,
        local: &Worker<HeapAddr>,
        worker_id: usize,
        stealers: &[Stealer<HeapAddr>],
    ) -> Option<HeapAddr> {
        loop {
            match self.worklist.steal_batch_and_pop(local) {
                Steal::Success(obj) => return Some(obj),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }
        for (peer, stealer) in stealers.iter().enumerate() {
            if peer == worker_id {
                continue;
            }
            loop {
                match stealer.steal() {
                    Steal::Success(obj) => return Some(obj),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }
        None
    }

    fn trace_object(&self, obj: HeapAddr, local: &Worker<HeapAddr>) {
        let heap = self.heap;
        let header = heap.object_header(obj);
        let refs = header.ref_count();
        let mut first = 0;
        if refs > 0
            && header.is_reference()
            && self.process_references
            && heap.ref_processor().discover(obj)
        {
            // Slot 0 (the referent) now belongs to reference processing.
            first = 1;
        }
        for i in first..refs {
            let child = heap.get_ref(obj, i);
            if child != NULL_REF && self.try_mark(child) {
                local.push(child);
            }
        }
    }

    /// Mark `obj` in the next bitmap; on winning, account its live words to
    /// the containing region.
    fn try_mark(&self, obj: HeapAddr) -> bool {
        let heap = self.heap;
        if !heap.mark_next(obj) {
            return false;
        }
        let words = heap.object_size(obj) + BrooksPointer::word_size();
        heap.region_of(obj).increase_live_data(words);
        self.marked.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Resolve the discovered weak/soft references: clear dead referents,
    /// keep softly reachable ones alive when the snapshot policy retains
    /// them, and clear dead weak handles.
    fn process_reference_queue(&self) {
        let heap = self.heap;
        let rp = heap.ref_processor();
        let clear_soft = rp.should_clear_soft_refs();
        let discovered = rp.take_discovered();
        let mut _cleared = 0usize;
        let mut _kept_alive = 0usize;

        for reference in discovered {
            let slot = heap.ref_slot_addr(reference, 0);
            let referent = heap.word(slot);
            if referent == NULL_REF || heap.is_marked_next(referent) {
                continue;
            }
            let soft = heap.object_header(reference).tag() == tags::SOFT_REFERENCE;
            if soft && !clear_soft {
                self.keep_alive(referent);
                _kept_alive += 1;
            } else {
                heap.set_word(slot, NULL_REF);
                _cleared += 1;
            }
        }

        heap.roots().weak_handles().for_each_slot(|slot| {
            let obj = slot.load(Ordering::Relaxed);
            if obj != NULL_REF && !heap.is_marked_next(obj) {
                slot.store(NULL_REF, Ordering::Relaxed);
                _cleared += 1;
            }
        });

        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "sable::gc",
            cleared = _cleared,
            kept_alive = _kept_alive,
            "reference processing done"
        );
    }

    /// Transitively mark a retained soft referent. Runs single-threaded
    /// after the parallel fixpoint; referent slots are traced strongly here
    /// so nothing new is discovered.
    fn keep_alive(&self, obj: HeapAddr) {
        if !self.try_mark(obj) {
            return;
        }
        let heap = self.heap;
        let mut stack = vec![obj];
        while let Some(current) = stack.pop() {
            let refs = heap.object_header(current).ref_count();
            for i in 0..refs {
                let child = heap.get_ref(current, i);
                if child != NULL_REF && self.try_mark(child) {
                    stack.push(child);
                }
            }
        }
    }

    fn unload_dead_code(&self) {
        let heap = self.heap;
        let _purged = heap
            .roots()
            .purge_code_blobs(|holder| !heap.is_marked_next(holder));

        #[cfg(feature = "gc_logging")]
        if _purged > 0 {
            tracing::debug!(target: "sable::gc", purged = _purged, "unloaded dead code blobs");
        }
    }
}
