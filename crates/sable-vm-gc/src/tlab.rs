//! Thread-local allocation buffers.
//!
//! A TLAB is a privately owned `[start, end)` slice of a Regular region with
//! its own bump cursor, so mutator threads allocate without touching shared
//! state. The collector needs two things from TLABs: before marking, every
//! buffer's unused tail must be formatted as a filler object so heap walks
//! parse (`make_parsable`); after a full collection the buffers are gone and
//! the desired size is recomputed from the refill statistics.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::heap::{GcError, Heap, HeapAddr};
use crate::object::{BrooksPointer, ObjectHeader, tags};

/// Smallest TLAB the registry will hand out, in words.
const MIN_TLAB_WORDS: usize = 4;

/// Handle to a requested TLAB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlabId(usize);

struct TlabEntry {
    start: HeapAddr,
    end: HeapAddr,
    cursor: HeapAddr,
}

/// All live TLABs plus sizing statistics.
pub struct TlabRegistry {
    entries: Mutex<Vec<TlabEntry>>,
    desired_size: AtomicUsize,
    refills: AtomicUsize,
    refill_words: AtomicUsize,
}

impl TlabRegistry {
    pub(crate) fn new(desired_size: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            desired_size: AtomicUsize::new(desired_size),
            refills: AtomicUsize::new(0),
            refill_words: AtomicUsize::new(0),
        }
    }

    /// Current TLAB size handed out on refill, in words.
    pub fn desired_size(&self) -> usize {
        self.desired_size.load(Ordering::Relaxed)
    }

    /// Number of live TLABs.
    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Reserve a fresh TLAB out of the heap.
    pub fn request(&self, heap: &Heap) -> Result<TlabId, GcError> {
        let words = self.desired_size();
        let start = Self::reserve_words(heap, words)?;
        let region = heap.region_of(start);
        region.increase_tlab_allocs(words);
        heap.increase_used(words);
        self.refills.fetch_add(1, Ordering::Relaxed);
        self.refill_words.fetch_add(words, Ordering::Relaxed);
        let mut entries = self.entries.lock();
        entries.push(TlabEntry {
            start,
            end: start + words,
            cursor: start,
        });
        Ok(TlabId(entries.len() - 1))
    }

    fn reserve_words(heap: &Heap, words: usize) -> Result<HeapAddr, GcError> {
        for index in 0..heap.num_regions() {
            let r = heap.region(index);
            if r.is_regular() {
                if let Some(start) = r.try_allocate(words) {
                    return Ok(start);
                }
            }
        }
        loop {
            let Some(index) = heap.pop_free_region() else {
                return Err(GcError::OutOfMemory {
                    requested: words,
                    available: 0,
                });
            };
            let r = heap.region(index);
            if r.is_empty_state() {
                r.make_regular_allocation();
            }
            if r.is_regular() {
                if let Some(start) = r.try_allocate(words) {
                    return Ok(start);
                }
            }
        }
    }

    /// Bump-allocate an object inside a TLAB. Fails when the buffer cannot
    /// hold the object; the caller is expected to request a new TLAB.
    pub fn allocate(
        &self,
        heap: &Heap,
        id: TlabId,
        payload_words: usize,
        ref_count: usize,
        tag: u8,
    ) -> Result<HeapAddr, GcError> {
        let mut entries = self.entries.lock();
        let entry = &mut entries[id.0];
        let mut size = payload_words;
        let need = size + BrooksPointer::word_size();
        if entry.cursor + need > entry.end {
            return Err(GcError::OutOfMemory {
                requested: need,
                available: entry.end - entry.cursor,
            });
        }
        // Never leave a one-word tail: it cannot hold a filler object. Pad
        // the allocation into the header size instead.
        if entry.end - (entry.cursor + need) == 1 {
            size += 1;
        }
        let fwd = entry.cursor;
        entry.cursor = fwd + size + BrooksPointer::word_size();
        drop(entries);

        let header = ObjectHeader::new(size, ref_count, tag);
        let obj = fwd + BrooksPointer::word_size();
        for w in obj..obj + size {
            heap.set_word(w, 0);
        }
        heap.set_word(obj, header.raw());
        BrooksPointer::initialize(heap, obj);
        Ok(obj)
    }

    /// Retire every TLAB: format unused tails as filler objects so the heap
    /// is parsable, and exhaust the buffers.
    pub fn make_parsable(&self, heap: &Heap) {
        let mut entries = self.entries.lock();
        for entry in entries.iter_mut() {
            let unused = entry.end - entry.cursor;
            assert_ne!(unused, 1, "unfillable one-word TLAB tail");
            if unused >= 2 {
                let fwd = entry.cursor;
                let obj = fwd + BrooksPointer::word_size();
                let header = ObjectHeader::new(unused - 1, 0, tags::FILLER);
                heap.set_word(obj, header.raw());
                BrooksPointer::initialize(heap, obj);
            }
            entry.cursor = entry.end;
        }
    }

    /// Recompute the desired TLAB size from refill statistics and reset
    /// them. Called after a full collection.
    pub fn resize_all(&self, heap: &Heap) {
        let refills = self.refills.swap(0, Ordering::Relaxed);
        let words = self.refill_words.swap(0, Ordering::Relaxed);
        if refills > 0 {
            let avg = words / refills;
            let max = heap.region_size_words() / 4;
            self.desired_size
                .store(avg.clamp(MIN_TLAB_WORDS, max.max(MIN_TLAB_WORDS)), Ordering::Relaxed);
        }
    }

    /// Drop all TLABs. After a full collection the buffers point into
    /// compacted storage and must not be reused; mutators request fresh
    /// ones on resume.
    pub fn reset_accounting(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::GcConfig;
    use crate::object::NULL_REF;

    fn heap() -> std::sync::Arc<Heap> {
        Heap::with_config(GcConfig {
            region_size_words: 100,
            region_count: 2,
            tlab_size_words: 20,
            use_tlab: true,
            ..GcConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_request_reserves_heap_words() {
        let heap = heap();
        let id = heap.tlabs().request(&heap).unwrap();
        assert_eq!(heap.tlabs().live_count(), 1);
        assert_eq!(heap.used(), 20, "whole buffer counts as used");

        let obj = heap.tlabs().allocate(&heap, id, 5, 1, tags::OBJECT).unwrap();
        assert_eq!(BrooksPointer::get_raw(&heap, obj), obj);
        assert_eq!(heap.get_ref(obj, 0), NULL_REF);
    }

    #[test]
    fn test_allocate_fails_when_exhausted() {
        let heap = heap();
        let id = heap.tlabs().request(&heap).unwrap();
        // 20-word TLAB: a 12+1 word object fits, another cannot.
        heap.tlabs().allocate(&heap, id, 12, 0, tags::OBJECT).unwrap();
        assert!(matches!(
            heap.tlabs().allocate(&heap, id, 12, 0, tags::OBJECT),
            Err(GcError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn test_make_parsable_writes_filler() {
        let heap = heap();
        let id = heap.tlabs().request(&heap).unwrap();
        let obj = heap.tlabs().allocate(&heap, id, 5, 0, tags::OBJECT).unwrap();
        heap.tlabs().make_parsable(&heap);

        // Walk the region by size: object then filler covering the tail.
        let r = heap.region_of(obj);
        let mut seen = Vec::new();
        let mut cursor = r.bottom();
        while cursor < r.top() {
            let o = cursor + 1;
            seen.push(heap.object_header(o).tag());
            cursor = o + heap.object_size(o);
        }
        assert_eq!(seen, vec![tags::OBJECT, tags::FILLER]);
    }

    #[test]
    fn test_no_one_word_tail() {
        let heap = heap();
        let id = heap.tlabs().request(&heap).unwrap();
        // An 18-word payload would leave exactly one word; the pad absorbs it.
        let obj = heap.tlabs().allocate(&heap, id, 18, 0, tags::OBJECT).unwrap();
        assert_eq!(heap.object_size(obj), 19);
        heap.tlabs().make_parsable(&heap); // must not hit the one-word assert
    }

    #[test]
    fn test_resize_tracks_average_refill() {
        let heap = heap();
        heap.tlabs().request(&heap).unwrap();
        heap.tlabs().request(&heap).unwrap();
        heap.tlabs().resize_all(&heap);
        assert_eq!(heap.tlabs().desired_size(), 20);
        heap.tlabs().reset_accounting();
        assert_eq!(heap.tlabs().live_count(), 0);
    }
}
