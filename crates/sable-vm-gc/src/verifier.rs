//! Heap verification.
//!
//! Checks the structural invariants a collection must maintain. A failed
//! check is a collector bug; everything here fails fatally with enough
//! context to locate the offending region or object.

use crate::heap::{Heap, HeapAddr};
use crate::object::{BrooksPointer, NULL_REF};
use crate::region::RegionState;

/// Structural heap checker, run around full collections when configured.
pub struct Verifier<'heap> {
    heap: &'heap Heap,
}

impl<'heap> Verifier<'heap> {
    /// Create a verifier for `heap`.
    pub fn new(heap: &'heap Heap) -> Self {
        Self { heap }
    }

    /// Pre-collection checks: region structure only. The heap may be
    /// unparsable at this point (live TLABs, cancelled concurrent state).
    pub fn verify_before_fullgc(&self) {
        self.verify_region_sanity();
    }

    /// Post-collection checks: region structure, clean states, empty
    /// bitmaps, accounting, forwarding headers, and reference validity.
    pub fn verify_after_fullgc(&self) {
        let heap = self.heap;
        self.verify_region_sanity();

        let mut used_sum = 0usize;
        heap.heap_region_iterate(|r| {
            assert!(
                !matches!(r.state(), RegionState::Cset | RegionState::Trash),
                "region {} left in state {:?} after full GC",
                r.index(),
                r.state()
            );
            assert_eq!(
                r.top(),
                r.new_top(),
                "region {} top/new_top disagree after full GC",
                r.index()
            );
            used_sum += r.used();
        });
        assert_eq!(
            heap.collection_set().count(),
            0,
            "collection set not empty after full GC"
        );
        assert_eq!(heap.used(), used_sum, "heap used does not match region sum");
        assert!(
            heap.complete_bitmap().is_clear(),
            "complete bitmap not reset after full GC"
        );
        assert!(
            heap.next_bitmap().is_clear(),
            "next bitmap not reset after full GC"
        );

        for index in 0..heap.num_regions() {
            let r = heap.region(index);
            if r.is_humongous_continuation() {
                continue;
            }
            // Pinned regions legitimately retain dead objects whose slots
            // were not rewritten; check parsability and headers only.
            let check_refs = !r.is_pinned();
            self.verify_region_objects(index, check_refs);
        }

        // Free-set members must be allocatable.
        for index in 0..heap.num_regions() {
            if heap.is_free_region(index) {
                assert!(
                    heap.region(index).is_alloc_allowed(),
                    "free set contains non-allocatable region {index}"
                );
            }
        }
    }

    fn verify_region_sanity(&self) {
        let heap = self.heap;
        let mut previous: Option<RegionState> = None;
        heap.heap_region_iterate(|r| {
            assert!(
                r.bottom() <= r.top() && r.top() <= r.end(),
                "region {} top {} outside [{}, {}]",
                r.index(),
                r.top(),
                r.bottom(),
                r.end()
            );
            if r.is_humongous_continuation() {
                assert!(
                    matches!(
                        previous,
                        Some(RegionState::HumongousStart) | Some(RegionState::HumongousCont)
                    ),
                    "region {} continues no humongous object",
                    r.index()
                );
            }
            previous = Some(r.state());
        });
    }

    /// Walk region `index` by size and check every object header and
    /// forwarding word; optionally check that every reference points at a
    /// valid, self-forwarded object.
    fn verify_region_objects(&self, index: usize, check_refs: bool) {
        let heap = self.heap;
        let r = heap.region(index);
        let mut cursor = r.bottom();
        while cursor < r.top() {
            let obj = cursor + BrooksPointer::word_size();
            let header = heap.object_header(obj);
            assert!(
                header.size_words() >= 1,
                "unparsable object at {obj} in region {index}"
            );
            assert_eq!(
                BrooksPointer::get_raw(heap, obj),
                obj,
                "object {obj} still forwarded after full GC"
            );
            if check_refs {
                heap.for_each_ref_slot(obj, |slot| {
                    let target = heap.word(slot);
                    if target != NULL_REF {
                        self.verify_reference(obj, slot, target);
                    }
                });
            }
            cursor = obj + header.size_words();
        }
    }

    fn verify_reference(&self, obj: HeapAddr, slot: HeapAddr, target: HeapAddr) {
        let heap = self.heap;
        assert!(
            target < heap.capacity_words(),
            "object {obj} slot {slot} points outside the heap: {target}"
        );
        assert!(
            heap.region_of(target).is_active(),
            "object {obj} slot {slot} points into inactive region: {target}"
        );
        assert_eq!(
            BrooksPointer::get_raw(heap, target),
            target,
            "object {obj} slot {slot} points at forwarded object {target}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{GcConfig, Heap};
    use crate::mark_compact::{FullGc, GcCause};
    use crate::object::tags;
    use std::sync::Arc;

    fn heap() -> Arc<Heap> {
        Heap::with_config(GcConfig {
            region_size_words: 100,
            region_count: 4,
            max_workers: 2,
            use_tlab: false,
            ..GcConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_fresh_heap_verifies() {
        let heap = heap();
        Verifier::new(&heap).verify_before_fullgc();
    }

    #[test]
    fn test_post_gc_heap_verifies() {
        let heap = heap();
        let stack = heap.roots().register_thread();
        for i in 0..12 {
            let obj = heap.allocate(9, 0, tags::OBJECT).unwrap();
            if i % 3 == 0 {
                stack.add_slot(obj);
            }
        }
        FullGc::new(&heap).do_full_gc(GcCause::ExplicitRequest);
        Verifier::new(&heap).verify_after_fullgc();
    }

    #[test]
    #[should_panic(expected = "still forwarded after full GC")]
    fn test_detects_leftover_forwarding() {
        let heap = heap();
        let stack = heap.roots().register_thread();
        let obj = heap.allocate(9, 0, tags::OBJECT).unwrap();
        let slot = stack.add_slot(obj);
        FullGc::new(&heap).do_full_gc(GcCause::ExplicitRequest);

        let survivor = slot.load(std::sync::atomic::Ordering::Relaxed);
        BrooksPointer::set_raw(&heap, survivor, survivor + 8);
        Verifier::new(&heap).verify_after_fullgc();
    }
}
