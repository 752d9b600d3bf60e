//! Stop-the-world sliding mark-compact — the full-collection fallback.
//!
//! Runs when the concurrent collector cannot make progress and the heap
//! must be recovered no matter what state the cancelled cycle left behind.
//! Four phases under one safepoint:
//!
//! 1. **Mark** — drive the shared marker in stop-the-world mode, then swap
//!    the bitmaps so `complete` holds this cycle's liveness.
//! 2. **Calculate addresses** — parallel sliding planner: each worker claims
//!    a private slice of regions and assigns every live object a forwarding
//!    address into densely packed destinations.
//! 3. **Adjust pointers** — rewrite every reference in roots and heap to the
//!    destination stored in its referent's forwarding header.
//! 4. **Copy objects** — each worker replays its own slice, moves the
//!    objects, then the region states, free set, and aggregate counters are
//!    rebuilt under the heap lock.
//!
//! Phases are infallible by construction: no allocation happens and all
//! storage is committed up front. Invariant violations are collector bugs
//! and fail fatally.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};

use parking_lot::Mutex;

use crate::barrier::{BarrierScope, PassthroughBarrierSet};
use crate::copy::aligned_conjoint_words;
use crate::heap::{Heap, HeapAddr};
use crate::marker::Marker;
use crate::object::{BrooksPointer, NULL_REF};
use crate::phases::{GcPhaseId, GcPhaseScope};
use crate::roots::RootProcessor;
use crate::verifier::Verifier;
use crate::workers::{ClaimCursor, WorkerPolicy};

/// Why a full collection was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcCause {
    /// An allocation could not be satisfied.
    AllocationFailure,
    /// The embedder asked for a full collection.
    ExplicitRequest,
    /// Near-OOM last resort after a cancelled concurrent cycle.
    LastResort,
}

impl fmt::Display for GcCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GcCause::AllocationFailure => "allocation failure",
            GcCause::ExplicitRequest => "explicit request",
            GcCause::LastResort => "last resort",
        })
    }
}

/// The full-collection driver.
///
/// Must be invoked while all mutator threads are suspended at the global
/// safepoint, on the safepoint-coordinator thread.
pub struct FullGc<'heap> {
    heap: &'heap Heap,
}

impl<'heap> FullGc<'heap> {
    /// Create a driver for `heap`.
    pub fn new(heap: &'heap Heap) -> Self {
        Self { heap }
    }

    /// Run a complete full collection. Recovers from any state the
    /// concurrent collector was left in.
    pub fn do_full_gc(&self, cause: GcCause) {
        let heap = self.heap;
        assert!(!heap.is_full_gc_in_progress(), "full GC must not reenter");

        let nworkers = WorkerPolicy::calc_workers_for_fullgc(
            heap.config().max_workers,
            heap.config().parallel_fullgc_workers,
        );

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "sable::gc",
            %cause,
            workers = nworkers,
            used_words = heap.used(),
            "full GC start"
        );
        #[cfg(not(feature = "gc_logging"))]
        let _ = cause;

        if heap.config().verify_before_fullgc {
            Verifier::new(heap).verify_before_fullgc();
        }

        heap.set_full_gc_in_progress(true);

        {
            // Pre-collection heap dump hook point.
            let _phase = GcPhaseScope::new(heap.phase_timings(), GcPhaseId::FullGcHeapdumps);
        }

        {
            let _phase = GcPhaseScope::new(heap.phase_timings(), GcPhaseId::FullGcPrepare);
            self.prepare(nworkers);
        }

        // All GC-internal accesses want raw addresses while forwarding
        // headers hold planner output; restored on every exit path.
        let barrier_scope = BarrierScope::install(heap, Arc::new(PassthroughBarrierSet));

        if heap.config().use_tlab {
            heap.tlabs().make_parsable(heap);
        }

        fence(Ordering::SeqCst);
        {
            let _phase = GcPhaseScope::new(heap.phase_timings(), GcPhaseId::FullGcMark);
            self.phase1_mark_heap(nworkers);
        }

        heap.set_full_gc_move_in_progress(true);

        let worker_slices: Vec<Mutex<Vec<usize>>> =
            (0..nworkers).map(|_| Mutex::new(Vec::new())).collect();

        fence(Ordering::SeqCst);
        {
            let _phase =
                GcPhaseScope::new(heap.phase_timings(), GcPhaseId::FullGcCalculateAddresses);
            self.phase2_calculate_target_addresses(&worker_slices, nworkers);
        }

        fence(Ordering::SeqCst);
        {
            let _phase = GcPhaseScope::new(heap.phase_timings(), GcPhaseId::FullGcAdjustPointers);
            self.phase3_update_references(nworkers);
        }

        fence(Ordering::SeqCst);
        {
            let _phase = GcPhaseScope::new(heap.phase_timings(), GcPhaseId::FullGcCopyObjects);
            self.phase4_compact_objects(&worker_slices, nworkers);
        }

        heap.reset_words_allocated_since_mark();
        if heap.config().use_tlab {
            heap.tlabs().reset_accounting();
        }

        heap.set_full_gc_move_in_progress(false);
        heap.set_full_gc_in_progress(false);

        if heap.config().verify_after_fullgc {
            Verifier::new(heap).verify_after_fullgc();
        }

        {
            // Post-collection heap dump hook point.
            let _phase = GcPhaseScope::new(heap.phase_timings(), GcPhaseId::FullGcHeapdumps);
        }

        if heap.config().use_tlab {
            let _phase = GcPhaseScope::new(heap.phase_timings(), GcPhaseId::FullGcResizeTlabs);
            heap.tlabs().resize_all(heap);
        }

        drop(barrier_scope);
        heap.increment_full_gc_count();

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "sable::gc",
            used_words = heap.used(),
            free_regions = heap.free_region_count(),
            "full GC complete"
        );
    }

    /// Recover from any GC state and reset marking scratch state.
    fn prepare(&self, nworkers: usize) {
        let heap = self.heap;

        // a. Cancel concurrent mark, if in progress.
        if heap.is_concurrent_mark_in_progress() {
            heap.set_concurrent_mark_in_progress(false);
        }

        // b. Cancel evacuation, if in progress.
        if heap.is_evacuation_in_progress() {
            heap.set_evacuation_in_progress(false);
        }

        // c. Reset the next bitmap for new marking.
        heap.reset_next_mark_bitmap(nworkers);
        debug_assert!(heap.next_bitmap().is_clear());

        // d. Abandon reference discovery and clear discovered lists.
        let rp = heap.ref_processor();
        rp.disable_discovery();
        rp.abandon_partial_discovery();
        rp.verify_no_references_recorded();

        {
            let _lock = heap.lock();

            // e. Make sure all regions are active: the slider may move data
            // through any of them.
            heap.heap_region_iterate(|r| {
                if r.is_trash() {
                    r.recycle();
                }
                if r.is_empty_state() {
                    r.make_regular_bypass();
                }
                assert!(r.is_active(), "only active regions in heap now");
            });

            // f. Clear region marking state.
            heap.heap_region_iterate(|r| {
                r.set_next_tams(r.top());
                r.clear_live_data();
                r.set_concurrent_iteration_safe_limit(r.top());
            });
        }
    }

    /// Phase 1: mark the heap in stop-the-world mode.
    fn phase1_mark_heap(&self, nworkers: usize) {
        let heap = self.heap;
        let mut marker = Marker::new(heap);

        // This can be the last-resort collection; ignore the usual frequency
        // heuristics and only skip work that is explicitly disabled.
        marker.set_process_references(heap.config().ref_processing_enabled);
        marker.set_unload_classes(heap.config().class_unloading_enabled);

        let rp = heap.ref_processor();
        if marker.process_references() {
            rp.enable_discovery();
        }
        // Full GC clears everything softly reachable.
        rp.setup_policy(true);

        {
            let _roots = GcPhaseScope::new(heap.phase_timings(), GcPhaseId::FullGcRoots);
            marker.update_roots(nworkers);
            marker.mark_roots(nworkers);
        }
        marker.finish_mark_from_roots(nworkers);
        rp.disable_discovery();

        heap.swap_mark_bitmaps();
    }

    /// Phase 2: compute forwarding addresses with one sliding planner per
    /// worker over a private slice of claimed regions.
    fn phase2_calculate_target_addresses(
        &self,
        worker_slices: &[Mutex<Vec<usize>>],
        nworkers: usize,
    ) {
        let heap = self.heap;

        {
            let _lock = heap.lock();

            // Reclaim dead humongous objects wholesale.
            for index in 0..heap.num_regions() {
                let r = heap.region(index);
                if r.is_humongous_start() {
                    let obj = r.bottom() + BrooksPointer::word_size();
                    if !heap.is_marked_complete(obj) {
                        heap.trash_humongous_region_at(index);
                    }
                }
            }

            // Re-activate the regions just trashed: their storage must be
            // usable as slide targets.
            heap.heap_region_iterate(|r| {
                if r.is_trash() {
                    r.recycle();
                }
                if r.is_empty_state() {
                    r.make_regular_bypass();
                }
            });
        }

        let cursor = ClaimCursor::new(heap.num_regions());
        let claim_move_allowed = |cursor: &ClaimCursor| -> Option<usize> {
            while let Some(index) = cursor.claim_next() {
                if heap.region(index).is_move_allowed() {
                    return Some(index);
                }
            }
            None
        };

        heap.workers().run_task(nworkers, |worker_id| {
            let Some(first) = claim_move_allowed(&cursor) else {
                return;
            };
            let mut planner = CompactionPlanner::new(heap, first);
            let mut from_region = first;
            loop {
                worker_slices[worker_id].lock().push(from_region);
                planner.set_from_region(from_region);
                heap.marked_object_iterate(from_region, |obj| planner.do_object(obj));

                // Slid somewhere else? The from-region is drained and can
                // serve as a fresh destination.
                if !planner.is_compact_same_region() {
                    planner.add_empty_region(from_region);
                }
                match claim_move_allowed(&cursor) {
                    Some(next) => from_region = next,
                    None => break,
                }
            }
            planner.finish();
        });
    }

    /// Phase 3: rewrite every reference in roots and heap to its referent's
    /// forwarding address.
    fn phase3_update_references(&self, nworkers: usize) {
        let heap = self.heap;

        {
            let _roots = GcPhaseScope::new(heap.phase_timings(), GcPhaseId::FullGcRoots);
            heap.roots().derived_pointers().clear();
            let rp = RootProcessor::new(heap.roots(), true, true);
            heap.workers().run_task(nworkers, |worker_id| {
                rp.process_all_roots(worker_id, |slot| {
                    let obj = slot.load(Ordering::Relaxed);
                    if obj != NULL_REF {
                        debug_assert!(
                            heap.is_marked_complete(obj),
                            "root references unmarked object {obj}"
                        );
                        slot.store(BrooksPointer::get_raw(heap, obj), Ordering::Relaxed);
                    }
                });
            });
            heap.roots().derived_pointers().update_pointers();
        }

        let cursor = ClaimCursor::new(heap.num_regions());
        heap.workers().run_task(nworkers, |_worker_id| {
            while let Some(index) = cursor.claim_next() {
                // Humongous content is scanned through its start region.
                if heap.region(index).is_humongous_continuation() {
                    continue;
                }
                heap.marked_object_iterate(index, |obj| {
                    heap.for_each_ref_slot(obj, |slot| {
                        let target = heap.word(slot);
                        if target != NULL_REF {
                            debug_assert!(
                                heap.is_marked_complete(target),
                                "slot {slot} references unmarked object {target}"
                            );
                            heap.set_word(slot, BrooksPointer::get_raw(heap, target));
                        }
                    });
                });
            }
        });
    }

    /// Phase 4: replay each worker's slice, move the objects, re-initialize
    /// forwarding headers, then rebuild global region state.
    fn phase4_compact_objects(&self, worker_slices: &[Mutex<Vec<usize>>], nworkers: usize) {
        let heap = self.heap;

        heap.workers().run_task(nworkers, |worker_id| {
            let slice = worker_slices[worker_id].lock();
            for &index in slice.iter() {
                let r = heap.region(index);
                assert!(!r.is_humongous(), "humongous regions are never sliced");
                heap.marked_object_iterate(index, |obj| {
                    let size = heap.object_size(obj);
                    let destination = BrooksPointer::get_raw(heap, obj);
                    if destination != obj {
                        // Within a slice the slide is monotone left-ward, so
                        // an overlapping forward copy is safe.
                        aligned_conjoint_words(heap, obj, destination, size);
                    }
                    BrooksPointer::initialize(heap, destination);
                });
                r.set_top(r.new_top());
            }
        });

        // The complete TAMS pointers are about to be reset; the complete
        // bitmap must be cleared in sync.
        heap.reset_complete_mark_bitmap(nworkers);

        {
            let _lock = heap.lock();
            heap.clear_free_regions();
            let mut live_total = 0usize;

            for index in 0..heap.num_regions() {
                let r = heap.region(index);
                // Size-based walks are the rule until the next marking.
                r.set_complete_tams(r.bottom());

                // Regions the slicer never touched keep their extent.
                if r.is_humongous() || r.is_pinned() {
                    r.set_new_top(r.top());
                }

                let mut live = r.used();

                // Lingering non-empty cset regions are leftovers from the
                // cancelled concurrent cycle.
                if r.is_cset() && live != 0 {
                    r.make_regular_bypass();
                }

                if (r.is_regular() || r.is_cset()) && live == 0 {
                    r.make_trash();
                }

                if r.is_trash() {
                    live = 0;
                    r.recycle();
                }

                if r.is_alloc_allowed() {
                    if heap.collection_set().is_in(index) {
                        heap.collection_set().remove(index);
                    }
                    heap.add_free_region(index);
                }

                r.set_live_data(live);
                r.reset_alloc_stats();
                live_total += live;
            }

            heap.set_used(live_total);
        }

        heap.collection_set().clear();
        heap.clear_cancelled_gc();

        // Scratch bitmap ready for the next marking.
        heap.reset_next_mark_bitmap(nworkers);
    }
}

/// Sliding planner state for one worker's slice.
///
/// Destinations are the worker's own claimed regions, consumed in claim
/// order; drained from-regions queue up as fresh destinations. When the
/// queue runs dry the planner compacts within the current from-region,
/// which is safe because objects only ever shift toward lower addresses.
struct CompactionPlanner<'heap> {
    heap: &'heap Heap,
    empty_regions: VecDeque<usize>,
    to_region: usize,
    from_region: usize,
    compact_point: HeapAddr,
}

impl<'heap> CompactionPlanner<'heap> {
    fn new(heap: &'heap Heap, first_region: usize) -> Self {
        Self {
            heap,
            empty_regions: VecDeque::new(),
            to_region: first_region,
            from_region: first_region,
            compact_point: heap.region(first_region).bottom(),
        }
    }

    fn set_from_region(&mut self, index: usize) {
        self.from_region = index;
    }

    fn is_compact_same_region(&self) -> bool {
        self.from_region == self.to_region
    }

    fn add_empty_region(&mut self, index: usize) {
        self.empty_regions.push_back(index);
    }

    fn do_object(&mut self, obj: HeapAddr) {
        let heap = self.heap;
        debug_assert!(heap.is_marked_complete(obj), "planning an unmarked object");

        let need = heap.object_size(obj) + BrooksPointer::word_size();
        if self.compact_point + need > heap.region(self.to_region).end() {
            self.finish_region();

            // Object does not fit. Pick the next drained destination; out of
            // those, compact within the current from-region.
            let new_to = self
                .empty_regions
                .pop_front()
                .unwrap_or(self.from_region);
            assert_ne!(new_to, self.to_region, "must not reuse the same to-region");
            self.to_region = new_to;
            self.compact_point = heap.region(new_to).bottom();
        }

        debug_assert!(
            self.compact_point + need <= heap.region(self.to_region).end(),
            "object must fit the destination after a region switch"
        );
        BrooksPointer::set_raw(heap, obj, self.compact_point + BrooksPointer::word_size());
        self.compact_point += need;
    }

    fn finish_region(&mut self) {
        self.heap
            .region(self.to_region)
            .set_new_top(self.compact_point);
    }

    /// Final close: commit the current destination and mark every unused
    /// drained region empty.
    fn finish(mut self) {
        self.finish_region();
        while let Some(index) = self.empty_regions.pop_front() {
            let r = self.heap.region(index);
            r.set_new_top(r.bottom());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::GcConfig;
    use crate::object::tags;

    fn heap(workers: usize) -> Arc<Heap> {
        Heap::with_config(GcConfig {
            region_size_words: 100,
            region_count: 4,
            max_workers: workers,
            parallel_fullgc_workers: workers,
            verify_before_fullgc: true,
            verify_after_fullgc: true,
            use_tlab: false,
            ..GcConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_gc_cause_display() {
        assert_eq!(GcCause::AllocationFailure.to_string(), "allocation failure");
        assert_eq!(GcCause::LastResort.to_string(), "last resort");
    }

    #[test]
    fn test_empty_heap_full_gc() {
        let heap = heap(1);
        FullGc::new(&heap).do_full_gc(GcCause::ExplicitRequest);
        assert_eq!(heap.used(), 0);
        assert_eq!(heap.free_region_count(), 4);
        assert_eq!(heap.full_gc_count(), 1);
        assert!(!heap.is_full_gc_in_progress());
        assert!(!heap.is_full_gc_move_in_progress());
    }

    #[test]
    fn test_all_garbage_is_reclaimed() {
        let heap = heap(1);
        for _ in 0..20 {
            heap.allocate(9, 0, tags::OBJECT).unwrap();
        }
        assert_eq!(heap.used(), 200);
        FullGc::new(&heap).do_full_gc(GcCause::AllocationFailure);
        assert_eq!(heap.used(), 0, "no roots, everything dies");
        assert_eq!(heap.free_region_count(), 4);
    }

    #[test]
    fn test_rooted_objects_survive_and_pack() {
        let heap = heap(1);
        let stack = heap.roots().register_thread();
        let mut slots = Vec::new();
        for i in 0..10 {
            let obj = heap.allocate(9, 0, tags::OBJECT).unwrap();
            if i % 2 == 0 {
                slots.push(stack.add_slot(obj));
            }
        }
        FullGc::new(&heap).do_full_gc(GcCause::AllocationFailure);
        assert_eq!(heap.used(), 50, "five survivors of ten words each");
        // Survivors are packed from the bottom of region 0 in address order.
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(slot.load(Ordering::Relaxed), 1 + i * 10);
        }
    }

    #[test]
    fn test_barrier_restored_after_full_gc() {
        let heap = heap(1);
        assert_eq!(heap.barrier_set().name(), "brooks");
        FullGc::new(&heap).do_full_gc(GcCause::ExplicitRequest);
        assert_eq!(heap.barrier_set().name(), "brooks");
    }

    #[test]
    fn test_phase_timings_recorded() {
        let heap = heap(2);
        FullGc::new(&heap).do_full_gc(GcCause::ExplicitRequest);
        let timings = heap.phase_timings();
        assert_eq!(timings.count(GcPhaseId::FullGcPrepare), 1);
        assert_eq!(timings.count(GcPhaseId::FullGcMark), 1);
        assert_eq!(timings.count(GcPhaseId::FullGcCalculateAddresses), 1);
        assert_eq!(timings.count(GcPhaseId::FullGcAdjustPointers), 1);
        assert_eq!(timings.count(GcPhaseId::FullGcCopyObjects), 1);
        assert_eq!(timings.count(GcPhaseId::FullGcHeapdumps), 2);
        assert!(timings.count(GcPhaseId::FullGcRoots) >= 2);
    }
}
