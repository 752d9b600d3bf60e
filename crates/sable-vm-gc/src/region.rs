//! Heap regions — the unit of heap partitioning.
//!
//! A region is a fixed-size slice of the heap with its own state, allocation
//! watermarks, live-data counter, and top-at-mark-start (TAMS) watermarks.
//! States form a small machine:
//!
//! ```text
//! Empty ── make_regular_* ──▶ Regular ── make_trash ──▶ Trash ── recycle ──▶ Empty
//! Regular ── make_cset ──▶ Cset ── (post-compact) ──▶ Regular | Trash
//! HumongousStart / HumongousCont : multi-region objects
//! Pinned : holds an immovable object
//! ```
//!
//! A region is *move-allowed* (its objects may be relocated by a sliding
//! compaction) iff it is Regular or Cset. Illegal transitions panic — they
//! indicate a collector bug, not a recoverable condition.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::heap::HeapAddr;

/// Region lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// No data; backing storage available for allocation.
    Empty = 0,
    /// Ordinary region with objects and a bump pointer.
    Regular = 1,
    /// First region of a multi-region (humongous) object.
    HumongousStart = 2,
    /// Continuation region of a humongous object.
    HumongousCont = 3,
    /// Selected for evacuation by the concurrent collector.
    Cset = 4,
    /// Contains only garbage; awaiting recycling.
    Trash = 5,
    /// Contains an immovable object; excluded from compaction.
    Pinned = 6,
}

impl RegionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RegionState::Empty,
            1 => RegionState::Regular,
            2 => RegionState::HumongousStart,
            3 => RegionState::HumongousCont,
            4 => RegionState::Cset,
            5 => RegionState::Trash,
            6 => RegionState::Pinned,
            _ => unreachable!("corrupt region state byte: {v}"),
        }
    }
}

/// One fixed-size heap region.
///
/// All fields are atomics so the region table can be shared across GC
/// workers; phase structure (not per-field locking) provides the actual
/// exclusion guarantees.
pub struct Region {
    index: usize,
    bottom: HeapAddr,
    end: HeapAddr,
    top: AtomicUsize,
    new_top: AtomicUsize,
    state: AtomicU8,
    live_data: AtomicUsize,
    shared_allocs: AtomicUsize,
    tlab_allocs: AtomicUsize,
    complete_tams: AtomicUsize,
    next_tams: AtomicUsize,
    iteration_safe_limit: AtomicUsize,
}

impl Region {
    /// Create an empty region covering `[bottom, end)`.
    pub fn new(index: usize, bottom: HeapAddr, end: HeapAddr) -> Self {
        assert!(bottom < end, "region {index} has no capacity");
        Self {
            index,
            bottom,
            end,
            top: AtomicUsize::new(bottom),
            new_top: AtomicUsize::new(bottom),
            state: AtomicU8::new(RegionState::Empty as u8),
            live_data: AtomicUsize::new(0),
            shared_allocs: AtomicUsize::new(0),
            tlab_allocs: AtomicUsize::new(0),
            complete_tams: AtomicUsize::new(bottom),
            next_tams: AtomicUsize::new(bottom),
            iteration_safe_limit: AtomicUsize::new(bottom),
        }
    }

    /// Region index in the heap's region table.
    pub fn index(&self) -> usize {
        self.index
    }

    /// First word of the region.
    pub fn bottom(&self) -> HeapAddr {
        self.bottom
    }

    /// One past the last word of the region.
    pub fn end(&self) -> HeapAddr {
        self.end
    }

    /// Current allocation high-water mark.
    pub fn top(&self) -> HeapAddr {
        self.top.load(Ordering::Relaxed)
    }

    /// Set the high-water mark. Used by the mover when committing the
    /// planner's output.
    pub fn set_top(&self, top: HeapAddr) {
        debug_assert!(top >= self.bottom && top <= self.end);
        self.top.store(top, Ordering::Relaxed);
    }

    /// Planner output: where `top` will be after objects are moved.
    pub fn new_top(&self) -> HeapAddr {
        self.new_top.load(Ordering::Relaxed)
    }

    /// Record the planner's post-move high-water mark.
    pub fn set_new_top(&self, new_top: HeapAddr) {
        debug_assert!(new_top >= self.bottom && new_top <= self.end);
        self.new_top.store(new_top, Ordering::Relaxed);
    }

    /// Words currently in use (`top - bottom`).
    pub fn used(&self) -> usize {
        self.top() - self.bottom
    }

    /// Region capacity in words.
    pub fn capacity(&self) -> usize {
        self.end - self.bottom
    }

    // ── State queries ─────────────────────────────────────────────────────

    /// Current lifecycle state.
    pub fn state(&self) -> RegionState {
        RegionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Whether the region is Empty.
    pub fn is_empty_state(&self) -> bool {
        self.state() == RegionState::Empty
    }

    /// Whether the region is Regular.
    pub fn is_regular(&self) -> bool {
        self.state() == RegionState::Regular
    }

    /// Whether the region is in the collection set.
    pub fn is_cset(&self) -> bool {
        self.state() == RegionState::Cset
    }

    /// Whether the region is Trash.
    pub fn is_trash(&self) -> bool {
        self.state() == RegionState::Trash
    }

    /// Whether the region is Pinned.
    pub fn is_pinned(&self) -> bool {
        self.state() == RegionState::Pinned
    }

    /// Whether the region starts a humongous object.
    pub fn is_humongous_start(&self) -> bool {
        self.state() == RegionState::HumongousStart
    }

    /// Whether the region continues a humongous object.
    pub fn is_humongous_continuation(&self) -> bool {
        self.state() == RegionState::HumongousCont
    }

    /// Whether the region belongs to a humongous object.
    pub fn is_humongous(&self) -> bool {
        matches!(
            self.state(),
            RegionState::HumongousStart | RegionState::HumongousCont
        )
    }

    /// Whether a sliding compaction may relocate objects out of (and into)
    /// this region.
    pub fn is_move_allowed(&self) -> bool {
        matches!(self.state(), RegionState::Regular | RegionState::Cset)
    }

    /// Whether new allocations may land here.
    pub fn is_alloc_allowed(&self) -> bool {
        matches!(self.state(), RegionState::Empty | RegionState::Regular)
    }

    /// Whether the region's backing storage holds (or may receive) data.
    pub fn is_active(&self) -> bool {
        !matches!(self.state(), RegionState::Empty | RegionState::Trash)
    }

    // ── State transitions ─────────────────────────────────────────────────

    fn transition(&self, allowed: &[RegionState], to: RegionState) {
        let from = self.state();
        assert!(
            allowed.contains(&from),
            "illegal region state transition: region {} {:?} -> {:?}",
            self.index,
            from,
            to,
        );
        self.state.store(to as u8, Ordering::Relaxed);
    }

    /// Empty → Regular, taken on the normal allocation path.
    pub fn make_regular_allocation(&self) {
        self.transition(&[RegionState::Empty], RegionState::Regular);
    }

    /// Force the region Regular, bypassing allocation bookkeeping. Used by
    /// full GC to activate every region (sliding may write anywhere) and to
    /// demote leftover cset regions.
    pub fn make_regular_bypass(&self) {
        self.transition(
            &[RegionState::Empty, RegionState::Trash, RegionState::Cset],
            RegionState::Regular,
        );
    }

    /// Select the region for concurrent evacuation.
    pub fn make_cset(&self) {
        self.transition(&[RegionState::Regular], RegionState::Cset);
    }

    /// Declare every object in the region dead.
    pub fn make_trash(&self) {
        self.transition(
            &[
                RegionState::Regular,
                RegionState::Cset,
                RegionState::HumongousStart,
                RegionState::HumongousCont,
            ],
            RegionState::Trash,
        );
    }

    /// Trash → Empty: reset all watermarks and statistics so the region is
    /// indistinguishable from a never-used one.
    pub fn recycle(&self) {
        self.transition(&[RegionState::Trash], RegionState::Empty);
        self.top.store(self.bottom, Ordering::Relaxed);
        self.new_top.store(self.bottom, Ordering::Relaxed);
        self.complete_tams.store(self.bottom, Ordering::Relaxed);
        self.next_tams.store(self.bottom, Ordering::Relaxed);
        self.iteration_safe_limit.store(self.bottom, Ordering::Relaxed);
        self.live_data.store(0, Ordering::Relaxed);
        self.reset_alloc_stats();
    }

    /// Pin the region: its objects must not move.
    pub fn make_pinned(&self) {
        self.transition(&[RegionState::Regular], RegionState::Pinned);
    }

    /// Release a pin.
    pub fn make_unpinned(&self) {
        self.transition(&[RegionState::Pinned], RegionState::Regular);
    }

    /// First region of a humongous allocation.
    pub fn make_humongous_start(&self) {
        self.transition(&[RegionState::Empty, RegionState::Regular], RegionState::HumongousStart);
    }

    /// Continuation region of a humongous allocation.
    pub fn make_humongous_cont(&self) {
        self.transition(&[RegionState::Empty, RegionState::Regular], RegionState::HumongousCont);
    }

    // ── Allocation ────────────────────────────────────────────────────────

    /// Reserve `words` words at `top`, returning the old `top` on success.
    /// Lock-free; used by both the shared allocation path and TLAB refills.
    pub fn try_allocate(&self, words: usize) -> Option<HeapAddr> {
        let mut current = self.top.load(Ordering::Relaxed);
        loop {
            let new_top = current.checked_add(words)?;
            if new_top > self.end {
                return None;
            }
            match self.top.compare_exchange_weak(
                current,
                new_top,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(current),
                Err(actual) => current = actual,
            }
        }
    }

    // ── Live data and allocation statistics ───────────────────────────────

    /// Live words recorded by the most recent marking.
    pub fn live_data(&self) -> usize {
        self.live_data.load(Ordering::Relaxed)
    }

    /// Overwrite the live-data counter.
    pub fn set_live_data(&self, words: usize) {
        self.live_data.store(words, Ordering::Relaxed);
    }

    /// Accumulate live words during marking.
    pub fn increase_live_data(&self, words: usize) {
        self.live_data.fetch_add(words, Ordering::Relaxed);
    }

    /// Zero the live-data counter.
    pub fn clear_live_data(&self) {
        self.live_data.store(0, Ordering::Relaxed);
    }

    /// Words allocated through the shared (non-TLAB) path.
    pub fn shared_allocs(&self) -> usize {
        self.shared_allocs.load(Ordering::Relaxed)
    }

    /// Words handed out as TLABs.
    pub fn tlab_allocs(&self) -> usize {
        self.tlab_allocs.load(Ordering::Relaxed)
    }

    pub(crate) fn increase_shared_allocs(&self, words: usize) {
        self.shared_allocs.fetch_add(words, Ordering::Relaxed);
    }

    pub(crate) fn increase_tlab_allocs(&self, words: usize) {
        self.tlab_allocs.fetch_add(words, Ordering::Relaxed);
    }

    /// Reset allocation statistics (post-collection accounting).
    pub fn reset_alloc_stats(&self) {
        self.shared_allocs.store(0, Ordering::Relaxed);
        self.tlab_allocs.store(0, Ordering::Relaxed);
    }

    // ── Top-at-mark-start watermarks ──────────────────────────────────────

    /// TAMS of the completed marking: objects at or above it are implicitly
    /// live and not tracked in the complete bitmap.
    pub fn complete_tams(&self) -> HeapAddr {
        self.complete_tams.load(Ordering::Relaxed)
    }

    /// Set the completed-marking TAMS.
    pub fn set_complete_tams(&self, tams: HeapAddr) {
        self.complete_tams.store(tams, Ordering::Relaxed);
    }

    /// TAMS of the in-progress marking.
    pub fn next_tams(&self) -> HeapAddr {
        self.next_tams.load(Ordering::Relaxed)
    }

    /// Set the in-progress-marking TAMS.
    pub fn set_next_tams(&self, tams: HeapAddr) {
        self.next_tams.store(tams, Ordering::Relaxed);
    }

    /// Swap the two TAMS watermarks; part of the heap-wide bitmap swap.
    pub fn swap_tams(&self) {
        let complete = self.complete_tams.load(Ordering::Relaxed);
        let next = self.next_tams.load(Ordering::Relaxed);
        self.complete_tams.store(next, Ordering::Relaxed);
        self.next_tams.store(complete, Ordering::Relaxed);
    }

    /// Limit up to which concurrent iteration may safely walk this region.
    pub fn concurrent_iteration_safe_limit(&self) -> HeapAddr {
        self.iteration_safe_limit.load(Ordering::Relaxed)
    }

    /// Reset the concurrent-iteration limit.
    pub fn set_concurrent_iteration_safe_limit(&self, limit: HeapAddr) {
        self.iteration_safe_limit.store(limit, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> Region {
        Region::new(0, 100, 200)
    }

    #[test]
    fn test_new_region_is_empty() {
        let r = region();
        assert_eq!(r.state(), RegionState::Empty);
        assert_eq!(r.top(), 100);
        assert_eq!(r.used(), 0);
        assert_eq!(r.capacity(), 100);
        assert!(r.is_alloc_allowed());
        assert!(!r.is_move_allowed());
    }

    #[test]
    fn test_regular_trash_recycle_cycle() {
        let r = region();
        r.make_regular_allocation();
        assert!(r.is_regular());
        assert!(r.is_move_allowed());

        r.try_allocate(10).unwrap();
        assert_eq!(r.used(), 10);

        r.make_trash();
        assert!(r.is_trash());
        assert!(!r.is_active());

        r.recycle();
        assert!(r.is_empty_state());
        assert_eq!(r.used(), 0, "recycle must reset top");
        assert_eq!(r.complete_tams(), r.bottom());
        assert_eq!(r.next_tams(), r.bottom());
    }

    #[test]
    fn test_cset_is_move_allowed_and_demotable() {
        let r = region();
        r.make_regular_allocation();
        r.make_cset();
        assert!(r.is_cset());
        assert!(r.is_move_allowed());
        assert!(!r.is_alloc_allowed());

        r.make_regular_bypass();
        assert!(r.is_regular());
    }

    #[test]
    fn test_pinned_region_is_not_move_allowed() {
        let r = region();
        r.make_regular_allocation();
        r.make_pinned();
        assert!(r.is_pinned());
        assert!(!r.is_move_allowed());
        assert!(!r.is_alloc_allowed());

        r.make_unpinned();
        assert!(r.is_move_allowed());
    }

    #[test]
    fn test_humongous_states() {
        let start = Region::new(0, 0, 100);
        let cont = Region::new(1, 100, 200);
        start.make_humongous_start();
        cont.make_humongous_cont();
        assert!(start.is_humongous() && cont.is_humongous());
        assert!(!start.is_move_allowed());
        assert!(!cont.is_move_allowed());

        start.make_trash();
        cont.make_trash();
        start.recycle();
        cont.recycle();
        assert!(start.is_empty_state() && cont.is_empty_state());
    }

    #[test]
    #[should_panic(expected = "illegal region state transition")]
    fn test_illegal_transition_panics() {
        let r = region();
        r.make_cset(); // Empty -> Cset is not a legal edge
    }

    #[test]
    fn test_try_allocate_respects_end() {
        let r = region();
        r.make_regular_allocation();
        assert_eq!(r.try_allocate(60), Some(100));
        assert_eq!(r.try_allocate(40), Some(160));
        assert_eq!(r.try_allocate(1), None, "region is exactly full");
    }

    #[test]
    fn test_swap_tams() {
        let r = region();
        r.set_complete_tams(110);
        r.set_next_tams(150);
        r.swap_tams();
        assert_eq!(r.complete_tams(), 150);
        assert_eq!(r.next_tams(), 110);
    }
}
