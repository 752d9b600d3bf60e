//! The region-based heap.
//!
//! ## Design
//!
//! - **Word-addressed storage**: the heap is one contiguous array of machine
//!   words addressed by index (`HeapAddr`); address 0 doubles as the null
//!   reference because objects always sit one word above their forwarding
//!   header.
//! - **Regions**: equal-capacity slices of the storage with independent
//!   lifecycle states, allocation watermarks, and TAMS marks.
//! - **Two mark bitmaps**: `next` (scratch for the marking in progress) and
//!   `complete` (authoritative liveness from the last finished marking);
//!   `swap_mark_bitmaps` flips their roles and every region's TAMS pair.
//! - **Free set / collection set**: global region classification rebuilt by
//!   full GC.
//! - **Atomic words**: all storage traffic is `Relaxed`; the collector
//!   separates phases with `SeqCst` fences, so readers in phase N+1 observe
//!   writers from phase N without per-object synchronization.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard, RwLock};
use thiserror::Error;

use crate::barrier::{BarrierSet, BrooksBarrierSet};
use crate::bitmap::MarkBitmap;
use crate::object::{BrooksPointer, NULL_REF, ObjectHeader};
use crate::phases::PhaseTimings;
use crate::refproc::ReferenceProcessor;
use crate::region::Region;
use crate::roots::RootSet;
use crate::tlab::TlabRegistry;
use crate::workers::WorkerPool;

/// A heap address: a word index into the heap storage.
pub type HeapAddr = usize;

/// Errors from heap setup and the allocation surface. Collection phases
/// themselves are infallible; their invariants are asserted.
#[derive(Debug, Error)]
pub enum GcError {
    /// No region can satisfy the request.
    #[error("out of memory: requested {requested} words, {available} free words")]
    OutOfMemory {
        /// Words requested, including the forwarding header.
        requested: usize,
        /// Free words remaining in the free set.
        available: usize,
    },
    /// The object exceeds a single region and must use the humongous path,
    /// or vice versa.
    #[error("object of {words} words does not fit the {path} allocation path")]
    WrongAllocationPath {
        /// Total footprint in words.
        words: usize,
        /// The path that was attempted.
        path: &'static str,
    },
    /// Configuration rejected at heap construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Heap and collector configuration.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Capacity of every region, in words.
    pub region_size_words: usize,
    /// Number of regions.
    pub region_count: usize,
    /// Upper bound on GC worker threads.
    pub max_workers: usize,
    /// Gang size for full GC; 0 delegates to the worker policy.
    pub parallel_fullgc_workers: usize,
    /// Run the heap verifier before every full collection.
    pub verify_before_fullgc: bool,
    /// Run the heap verifier after every full collection.
    pub verify_after_fullgc: bool,
    /// Process soft/weak references during marking. When disabled, referent
    /// slots are traced as strong edges.
    pub ref_processing_enabled: bool,
    /// Purge code roots whose holder died during marking.
    pub class_unloading_enabled: bool,
    /// Allocate through thread-local allocation buffers.
    pub use_tlab: bool,
    /// Initial TLAB size, in words.
    pub tlab_size_words: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            region_size_words: 1024,
            region_count: 64,
            max_workers: 4,
            parallel_fullgc_workers: 0,
            verify_before_fullgc: false,
            verify_after_fullgc: false,
            ref_processing_enabled: true,
            class_unloading_enabled: true,
            use_tlab: true,
            tlab_size_words: 64,
        }
    }
}

impl GcConfig {
    fn validate(&self) -> Result<(), GcError> {
        if self.region_size_words < 8 {
            return Err(GcError::InvalidConfig(format!(
                "region_size_words must be at least 8, got {}",
                self.region_size_words
            )));
        }
        if self.region_count == 0 {
            return Err(GcError::InvalidConfig("region_count must be nonzero".into()));
        }
        if self.max_workers == 0 {
            return Err(GcError::InvalidConfig("max_workers must be nonzero".into()));
        }
        if self.use_tlab
            && (self.tlab_size_words < 4 || self.tlab_size_words > self.region_size_words)
        {
            return Err(GcError::InvalidConfig(format!(
                "tlab_size_words must be in [4, region_size_words], got {}",
                self.tlab_size_words
            )));
        }
        self.region_size_words
            .checked_mul(self.region_count)
            .ok_or_else(|| GcError::InvalidConfig("heap size overflows".into()))?;
        Ok(())
    }
}

/// The set of regions selected for concurrent evacuation.
///
/// Full GC does not evacuate through the cset, but it must be able to clean
/// one up after a cancelled concurrent cycle.
pub struct CollectionSet {
    members: Box<[AtomicBool]>,
    count: AtomicUsize,
}

impl CollectionSet {
    fn new(region_count: usize) -> Self {
        let members = (0..region_count)
            .map(|_| AtomicBool::new(false))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            members,
            count: AtomicUsize::new(0),
        }
    }

    /// Whether region `index` is in the collection set.
    pub fn is_in(&self, index: usize) -> bool {
        self.members[index].load(Ordering::Relaxed)
    }

    /// Add region `index`.
    pub fn add(&self, index: usize) {
        if !self.members[index].swap(true, Ordering::Relaxed) {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove region `index`.
    pub fn remove(&self, index: usize) {
        if self.members[index].swap(false, Ordering::Relaxed) {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Drop every member.
    pub fn clear(&self) {
        for m in &self.members {
            m.store(false, Ordering::Relaxed);
        }
        self.count.store(0, Ordering::Relaxed);
    }

    /// Number of member regions.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

/// The heap: storage, regions, bitmaps, global sets and flags, and the
/// subsystems the collector consumes (roots, reference processor, TLABs,
/// barrier set, worker pool, phase timings).
pub struct Heap {
    config: GcConfig,
    storage: Box<[AtomicUsize]>,
    regions: Box<[Region]>,
    bitmaps: [MarkBitmap; 2],
    next_bitmap_index: AtomicUsize,
    free_set: Mutex<BTreeSet<usize>>,
    collection_set: CollectionSet,
    used: AtomicUsize,
    words_allocated_since_mark: AtomicUsize,
    full_gc_count: AtomicUsize,

    cancelled_gc: AtomicBool,
    concurrent_mark_in_progress: AtomicBool,
    evacuation_in_progress: AtomicBool,
    full_gc_in_progress: AtomicBool,
    full_gc_move_in_progress: AtomicBool,

    lock: Mutex<()>,
    barrier: RwLock<Arc<dyn BarrierSet>>,
    ref_processor: ReferenceProcessor,
    roots: RootSet,
    tlabs: TlabRegistry,
    workers: WorkerPool,
    phase_timings: PhaseTimings,
}

impl Heap {
    /// Create a heap with the default configuration.
    pub fn new() -> Arc<Self> {
        Self::with_config(GcConfig::default()).expect("default config is valid")
    }

    /// Create a heap with `config`. All regions start Empty and free.
    pub fn with_config(config: GcConfig) -> Result<Arc<Self>, GcError> {
        config.validate()?;
        let total_words = config.region_size_words * config.region_count;
        let storage = (0..total_words)
            .map(|_| AtomicUsize::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let regions = (0..config.region_count)
            .map(|i| {
                let bottom = i * config.region_size_words;
                Region::new(i, bottom, bottom + config.region_size_words)
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let free_set = (0..config.region_count).collect::<BTreeSet<_>>();
        let collection_set = CollectionSet::new(config.region_count);
        let workers = WorkerPool::new(config.max_workers);
        let tlabs = TlabRegistry::new(config.tlab_size_words);
        Ok(Arc::new(Self {
            storage,
            regions,
            bitmaps: [MarkBitmap::new(total_words), MarkBitmap::new(total_words)],
            next_bitmap_index: AtomicUsize::new(0),
            free_set: Mutex::new(free_set),
            collection_set,
            used: AtomicUsize::new(0),
            words_allocated_since_mark: AtomicUsize::new(0),
            full_gc_count: AtomicUsize::new(0),
            cancelled_gc: AtomicBool::new(false),
            concurrent_mark_in_progress: AtomicBool::new(false),
            evacuation_in_progress: AtomicBool::new(false),
            full_gc_in_progress: AtomicBool::new(false),
            full_gc_move_in_progress: AtomicBool::new(false),
            lock: Mutex::new(()),
            barrier: RwLock::new(Arc::new(BrooksBarrierSet)),
            ref_processor: ReferenceProcessor::new(),
            roots: RootSet::new(),
            tlabs,
            workers,
            phase_timings: PhaseTimings::new(),
            config,
        }))
    }

    /// The active configuration.
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    // ── Storage access ────────────────────────────────────────────────────

    /// Read the word at `addr`.
    #[inline]
    pub fn word(&self, addr: HeapAddr) -> usize {
        self.storage[addr].load(Ordering::Relaxed)
    }

    /// Write the word at `addr`.
    #[inline]
    pub fn set_word(&self, addr: HeapAddr, value: usize) {
        self.storage[addr].store(value, Ordering::Relaxed);
    }

    pub(crate) fn storage(&self) -> &[AtomicUsize] {
        &self.storage
    }

    /// Total heap capacity in words.
    pub fn capacity_words(&self) -> usize {
        self.storage.len()
    }

    // ── Regions ───────────────────────────────────────────────────────────

    /// Number of regions.
    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    /// Region capacity in words.
    pub fn region_size_words(&self) -> usize {
        self.config.region_size_words
    }

    /// The region at `index`.
    pub fn region(&self, index: usize) -> &Region {
        &self.regions[index]
    }

    /// Index of the region containing `addr`.
    pub fn region_index_of(&self, addr: HeapAddr) -> usize {
        addr / self.config.region_size_words
    }

    /// The region containing `addr`.
    pub fn region_of(&self, addr: HeapAddr) -> &Region {
        self.region(self.region_index_of(addr))
    }

    /// Iterate all regions in index order.
    pub fn heap_region_iterate(&self, mut f: impl FnMut(&Region)) {
        for r in self.regions.iter() {
            f(r);
        }
    }

    // ── Object access ─────────────────────────────────────────────────────

    /// Decode the header of the object at `obj`.
    #[inline]
    pub fn object_header(&self, obj: HeapAddr) -> ObjectHeader {
        ObjectHeader::from_raw(self.word(obj))
    }

    /// Payload size in words of the object at `obj`.
    #[inline]
    pub fn object_size(&self, obj: HeapAddr) -> usize {
        self.object_header(obj).size_words()
    }

    /// Address of reference slot `i` of `obj`.
    #[inline]
    pub fn ref_slot_addr(&self, obj: HeapAddr, i: usize) -> HeapAddr {
        debug_assert!(i < self.object_header(obj).ref_count());
        obj + 1 + i
    }

    /// Read reference slot `i` of `obj`.
    pub fn get_ref(&self, obj: HeapAddr, i: usize) -> HeapAddr {
        self.word(self.ref_slot_addr(obj, i))
    }

    /// Write reference slot `i` of `obj`.
    pub fn set_ref(&self, obj: HeapAddr, i: usize, target: HeapAddr) {
        self.set_word(self.ref_slot_addr(obj, i), target);
    }

    /// Visit the address of every reference slot of `obj`.
    pub fn for_each_ref_slot(&self, obj: HeapAddr, mut f: impl FnMut(HeapAddr)) {
        let refs = self.object_header(obj).ref_count();
        for i in 0..refs {
            f(obj + 1 + i);
        }
    }

    // ── Bitmaps and liveness ──────────────────────────────────────────────

    /// The bitmap being marked into by the in-progress cycle.
    pub fn next_bitmap(&self) -> &MarkBitmap {
        &self.bitmaps[self.next_bitmap_index.load(Ordering::Relaxed)]
    }

    /// The authoritative bitmap of the last completed marking.
    pub fn complete_bitmap(&self) -> &MarkBitmap {
        &self.bitmaps[1 - self.next_bitmap_index.load(Ordering::Relaxed)]
    }

    /// Swap the roles of the two bitmaps and every region's TAMS pair, so
    /// `complete` reflects the marking that just finished.
    pub fn swap_mark_bitmaps(&self) {
        let cur = self.next_bitmap_index.load(Ordering::Relaxed);
        self.next_bitmap_index.store(1 - cur, Ordering::Relaxed);
        for r in self.regions.iter() {
            r.swap_tams();
        }
    }

    /// Mark `obj` in the next bitmap; true if this call won the race.
    #[inline]
    pub fn mark_next(&self, obj: HeapAddr) -> bool {
        self.next_bitmap().mark(obj)
    }

    /// Liveness according to the completed marking: bitmap-tracked below the
    /// region's TAMS, implicitly live above it.
    #[inline]
    pub fn is_marked_complete(&self, obj: HeapAddr) -> bool {
        if obj >= self.region_of(obj).complete_tams() {
            return true;
        }
        self.complete_bitmap().is_marked(obj)
    }

    /// Liveness according to the in-progress marking.
    #[inline]
    pub fn is_marked_next(&self, obj: HeapAddr) -> bool {
        if obj >= self.region_of(obj).next_tams() {
            return true;
        }
        self.next_bitmap().is_marked(obj)
    }

    /// Whether `obj` was allocated after the completed marking began.
    pub fn allocated_after_complete_mark_start(&self, obj: HeapAddr) -> bool {
        obj >= self.region_of(obj).complete_tams()
    }

    /// Clear the next bitmap with a parallel gang of `nworkers`.
    pub fn reset_next_mark_bitmap(&self, nworkers: usize) {
        self.reset_bitmap(self.next_bitmap(), nworkers);
    }

    /// Clear the complete bitmap with a parallel gang of `nworkers`.
    pub fn reset_complete_mark_bitmap(&self, nworkers: usize) {
        self.reset_bitmap(self.complete_bitmap(), nworkers);
    }

    fn reset_bitmap(&self, bitmap: &MarkBitmap, nworkers: usize) {
        let words = bitmap.word_count();
        let n = nworkers.max(1);
        let chunk = words.div_ceil(n).max(1);
        self.workers.run_task(n, |worker_id| {
            let from = (worker_id * chunk).min(words);
            let to = (from + chunk).min(words);
            bitmap.clear_word_range(from, to);
        });
    }

    /// Visit every live object of the region, in address order: objects
    /// below the region's complete TAMS via the bitmap, objects above it via
    /// a size walk (they are implicitly live).
    pub fn marked_object_iterate(&self, region_index: usize, mut f: impl FnMut(HeapAddr)) {
        let r = self.region(region_index);
        let top = r.top();
        let limit = r.complete_tams().min(top);
        self.complete_bitmap()
            .iter_marked(r.bottom(), limit, |addr| f(addr));
        let mut cursor = limit;
        while cursor < top {
            let obj = cursor + BrooksPointer::word_size();
            let size = self.object_size(obj);
            debug_assert!(size >= 1, "unparsable object at {obj}");
            f(obj);
            cursor = obj + size;
        }
    }

    // ── Allocation ────────────────────────────────────────────────────────

    /// Allocate an ordinary object: `payload_words` of payload (header word
    /// included) with `ref_count` leading reference slots, zero-initialized,
    /// forwarding header pointing at itself.
    pub fn allocate(
        &self,
        payload_words: usize,
        ref_count: usize,
        tag: u8,
    ) -> Result<HeapAddr, GcError> {
        let header = ObjectHeader::new(payload_words, ref_count, tag);
        let need = payload_words + BrooksPointer::word_size();
        if need > self.config.region_size_words {
            return Err(GcError::WrongAllocationPath {
                words: need,
                path: "regular",
            });
        }
        for r in self.regions.iter() {
            if r.is_regular() {
                if let Some(fwd) = r.try_allocate(need) {
                    return Ok(self.install_object(r, fwd, header));
                }
            }
        }
        loop {
            let Some(index) = self.pop_free_region() else {
                return Err(GcError::OutOfMemory {
                    requested: need,
                    available: self.free_region_count() * self.config.region_size_words,
                });
            };
            let r = self.region(index);
            // The free set may hold partially used Regular regions after a
            // collection rebuilt it.
            if r.is_empty_state() {
                r.make_regular_allocation();
            }
            if r.is_regular() {
                if let Some(fwd) = r.try_allocate(need) {
                    return Ok(self.install_object(r, fwd, header));
                }
            }
        }
    }

    fn install_object(&self, r: &Region, fwd: HeapAddr, header: ObjectHeader) -> HeapAddr {
        let obj = fwd + BrooksPointer::word_size();
        let size = header.size_words();
        for w in obj..obj + size {
            self.set_word(w, 0);
        }
        self.set_word(obj, header.raw());
        BrooksPointer::initialize(self, obj);
        let need = size + BrooksPointer::word_size();
        r.increase_shared_allocs(need);
        self.increase_used(need);
        self.words_allocated_since_mark
            .fetch_add(need, Ordering::Relaxed);
        obj
    }

    /// Allocate a humongous object spanning one HumongousStart region and as
    /// many HumongousCont regions as needed. The regions must be contiguous
    /// and Empty.
    pub fn allocate_humongous(
        &self,
        payload_words: usize,
        ref_count: usize,
        tag: u8,
    ) -> Result<HeapAddr, GcError> {
        let header = ObjectHeader::new(payload_words, ref_count, tag);
        let need = payload_words + BrooksPointer::word_size();
        let rsz = self.config.region_size_words;
        if need <= rsz {
            return Err(GcError::WrongAllocationPath {
                words: need,
                path: "humongous",
            });
        }
        let nregions = need.div_ceil(rsz);
        let start = {
            let mut free = self.free_set.lock();
            let mut run_start = 0;
            let mut run_len = 0;
            let mut found = None;
            for index in 0..self.regions.len() {
                if self.regions[index].is_empty_state() && free.contains(&index) {
                    if run_len == 0 {
                        run_start = index;
                    }
                    run_len += 1;
                    if run_len == nregions {
                        found = Some(run_start);
                        break;
                    }
                } else {
                    run_len = 0;
                }
            }
            let Some(start) = found else {
                return Err(GcError::OutOfMemory {
                    requested: need,
                    available: free.len() * rsz,
                });
            };
            for i in 0..nregions {
                free.remove(&(start + i));
            }
            start
        };

        let start_region = self.region(start);
        start_region.make_humongous_start();
        for i in 1..nregions {
            self.region(start + i).make_humongous_cont();
        }
        let mut remaining = need;
        for i in 0..nregions {
            let r = self.region(start + i);
            let take = remaining.min(rsz);
            r.set_top(r.bottom() + take);
            remaining -= take;
        }
        debug_assert_eq!(remaining, 0);

        let fwd = start_region.bottom();
        let obj = fwd + BrooksPointer::word_size();
        for w in obj..obj + header.size_words() {
            self.set_word(w, 0);
        }
        self.set_word(obj, header.raw());
        BrooksPointer::initialize(self, obj);
        start_region.increase_shared_allocs(need);
        self.increase_used(need);
        self.words_allocated_since_mark
            .fetch_add(need, Ordering::Relaxed);
        Ok(obj)
    }

    /// Trash a humongous object's whole region chain. The regions keep their
    /// Trash state until recycled.
    pub fn trash_humongous_region_at(&self, start: usize) {
        let r = self.region(start);
        assert!(
            r.is_humongous_start(),
            "region {start} is not a humongous start"
        );
        let mut index = start;
        loop {
            let region = self.region(index);
            self.decrease_used(region.used());
            region.make_trash();
            index += 1;
            if index >= self.regions.len() || !self.region(index).is_humongous_continuation() {
                break;
            }
        }
    }

    // ── Free set and collection set ───────────────────────────────────────

    /// Insert region `index` into the free set.
    pub fn add_free_region(&self, index: usize) {
        self.free_set.lock().insert(index);
    }

    /// Remove every region from the free set.
    pub fn clear_free_regions(&self) {
        self.free_set.lock().clear();
    }

    /// Take the lowest-numbered free region, if any.
    pub fn pop_free_region(&self) -> Option<usize> {
        self.free_set.lock().pop_first()
    }

    /// Number of free regions.
    pub fn free_region_count(&self) -> usize {
        self.free_set.lock().len()
    }

    /// Whether region `index` is in the free set.
    pub fn is_free_region(&self, index: usize) -> bool {
        self.free_set.lock().contains(&index)
    }

    /// The collection set.
    pub fn collection_set(&self) -> &CollectionSet {
        &self.collection_set
    }

    /// Move a Regular region into the collection set (embedder/test surface
    /// standing in for the concurrent collector's selection).
    pub fn add_to_collection_set(&self, index: usize) {
        self.region(index).make_cset();
        self.collection_set.add(index);
    }

    // ── Pinning ───────────────────────────────────────────────────────────

    /// Pin the region holding `obj`; its objects will not move.
    pub fn pin(&self, obj: HeapAddr) {
        self.region_of(obj).make_pinned();
    }

    /// Release the pin on the region holding `obj`.
    pub fn unpin(&self, obj: HeapAddr) {
        self.region_of(obj).make_unpinned();
    }

    // ── Aggregate accounting ──────────────────────────────────────────────

    /// Words in use across all regions.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Overwrite the used counter (full-GC finalization).
    pub fn set_used(&self, words: usize) {
        self.used.store(words, Ordering::Relaxed);
    }

    pub(crate) fn increase_used(&self, words: usize) {
        self.used.fetch_add(words, Ordering::Relaxed);
    }

    pub(crate) fn decrease_used(&self, words: usize) {
        self.used.fetch_sub(words, Ordering::Relaxed);
    }

    /// Words allocated since the last marking began.
    pub fn words_allocated_since_mark(&self) -> usize {
        self.words_allocated_since_mark.load(Ordering::Relaxed)
    }

    /// Reset the allocated-since-mark counter.
    pub fn reset_words_allocated_since_mark(&self) {
        self.words_allocated_since_mark.store(0, Ordering::Relaxed);
    }

    /// Number of completed full collections.
    pub fn full_gc_count(&self) -> usize {
        self.full_gc_count.load(Ordering::Relaxed)
    }

    pub(crate) fn increment_full_gc_count(&self) {
        self.full_gc_count.fetch_add(1, Ordering::Relaxed);
    }

    // ── Collector flags ───────────────────────────────────────────────────

    /// Request cancellation of the concurrent cycle.
    pub fn cancel_gc(&self) {
        self.cancelled_gc.store(true, Ordering::Relaxed);
    }

    /// Whether a cancellation is pending.
    pub fn is_gc_cancelled(&self) -> bool {
        self.cancelled_gc.load(Ordering::Relaxed)
    }

    /// Clear the cancellation flag (only on successful completion).
    pub fn clear_cancelled_gc(&self) {
        self.cancelled_gc.store(false, Ordering::Relaxed);
    }

    /// Whether a concurrent marking is (still) in progress.
    pub fn is_concurrent_mark_in_progress(&self) -> bool {
        self.concurrent_mark_in_progress.load(Ordering::Relaxed)
    }

    /// Set the concurrent-marking flag.
    pub fn set_concurrent_mark_in_progress(&self, value: bool) {
        self.concurrent_mark_in_progress
            .store(value, Ordering::Relaxed);
    }

    /// Whether a concurrent evacuation is (still) in progress.
    pub fn is_evacuation_in_progress(&self) -> bool {
        self.evacuation_in_progress.load(Ordering::Relaxed)
    }

    /// Set the evacuation flag.
    pub fn set_evacuation_in_progress(&self, value: bool) {
        self.evacuation_in_progress.store(value, Ordering::Relaxed);
    }

    /// Whether a full collection is running (phases 1-4).
    pub fn is_full_gc_in_progress(&self) -> bool {
        self.full_gc_in_progress.load(Ordering::Relaxed)
    }

    pub(crate) fn set_full_gc_in_progress(&self, value: bool) {
        self.full_gc_in_progress.store(value, Ordering::Relaxed);
    }

    /// Whether the moving part of a full collection is running (phases 2-4).
    pub fn is_full_gc_move_in_progress(&self) -> bool {
        self.full_gc_move_in_progress.load(Ordering::Relaxed)
    }

    pub(crate) fn set_full_gc_move_in_progress(&self, value: bool) {
        self.full_gc_move_in_progress.store(value, Ordering::Relaxed);
    }

    // ── Subsystems ────────────────────────────────────────────────────────

    /// Acquire the heap lock. Serializes the prepare step, the humongous
    /// reclaim, and the post-compact finalization.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    /// The currently installed barrier set.
    pub fn barrier_set(&self) -> Arc<dyn BarrierSet> {
        self.barrier.read().clone()
    }

    /// Install `barrier`, returning the previous one.
    pub fn set_barrier_set(&self, barrier: Arc<dyn BarrierSet>) -> Arc<dyn BarrierSet> {
        std::mem::replace(&mut *self.barrier.write(), barrier)
    }

    /// Resolve `obj` through the installed read barrier.
    pub fn resolve(&self, obj: HeapAddr) -> HeapAddr {
        if obj == NULL_REF {
            return NULL_REF;
        }
        self.barrier.read().read_barrier(self, obj)
    }

    /// The reference processor.
    pub fn ref_processor(&self) -> &ReferenceProcessor {
        &self.ref_processor
    }

    /// The root set.
    pub fn roots(&self) -> &RootSet {
        &self.roots
    }

    /// The worker pool.
    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Phase-timing table of the most recent collections.
    pub fn phase_timings(&self) -> &PhaseTimings {
        &self.phase_timings
    }

    /// The TLAB registry.
    pub fn tlabs(&self) -> &TlabRegistry {
        &self.tlabs
    }
}
