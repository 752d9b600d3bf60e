//! Read-barrier sets.
//!
//! The mutator-facing access path resolves object addresses through the
//! heap's installed barrier. In steady state that is the Brooks barrier
//! (follow the forwarding word, so reads always land on the canonical copy).
//! Full GC swaps in a passthrough barrier for its duration: during phases
//! 2-4 the forwarding word holds planner output, not a relocation target,
//! and every GC-internal access wants the raw address.

use std::sync::Arc;

use crate::heap::{Heap, HeapAddr};
use crate::object::BrooksPointer;

/// A pluggable read-barrier implementation.
pub trait BarrierSet: Send + Sync {
    /// Resolve `obj` to the address reads should use. `obj` is non-null.
    fn read_barrier(&self, heap: &Heap, obj: HeapAddr) -> HeapAddr;

    /// Name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Steady-state barrier: resolve through the forwarding header.
pub struct BrooksBarrierSet;

impl BarrierSet for BrooksBarrierSet {
    #[inline]
    fn read_barrier(&self, heap: &Heap, obj: HeapAddr) -> HeapAddr {
        BrooksPointer::get_raw(heap, obj)
    }

    fn name(&self) -> &'static str {
        "brooks"
    }
}

/// Full-GC barrier: identity. Forwarding words hold compaction-planner
/// output while this barrier is installed, so resolving through them would
/// be wrong.
pub struct PassthroughBarrierSet;

impl BarrierSet for PassthroughBarrierSet {
    #[inline]
    fn read_barrier(&self, _heap: &Heap, obj: HeapAddr) -> HeapAddr {
        obj
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

/// Scoped barrier swap: installs a barrier on construction and restores the
/// previous one on drop, on every exit path.
pub struct BarrierScope<'heap> {
    heap: &'heap Heap,
    previous: Option<Arc<dyn BarrierSet>>,
}

impl<'heap> BarrierScope<'heap> {
    /// Install `barrier` for the lifetime of the returned scope.
    pub fn install(heap: &'heap Heap, barrier: Arc<dyn BarrierSet>) -> Self {
        let previous = heap.set_barrier_set(barrier);
        Self {
            heap,
            previous: Some(previous),
        }
    }
}

impl Drop for BarrierScope<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.heap.set_barrier_set(previous);
        }
    }
}
