//! Phase timing instrumentation.
//!
//! Every externally visible step of a full collection runs inside a
//! [`GcPhaseScope`], which records wall time into the heap's
//! [`PhaseTimings`] table and, with the `gc_logging` feature, emits a
//! structured tracing event when the scope closes.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Identifiers for the timed steps of a full collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GcPhaseId {
    /// Heap dump hooks around the collection.
    FullGcHeapdumps,
    /// State reset before marking.
    FullGcPrepare,
    /// Phase 1: stop-the-world marking.
    FullGcMark,
    /// Root-set scans (inside phases 1 and 3).
    FullGcRoots,
    /// Phase 2: computing forwarding addresses.
    FullGcCalculateAddresses,
    /// Phase 3: rewriting references.
    FullGcAdjustPointers,
    /// Phase 4: moving objects and rebuilding region state.
    FullGcCopyObjects,
    /// TLAB resizing after the collection.
    FullGcResizeTlabs,
}

impl GcPhaseId {
    /// Stable event tag for this phase.
    pub fn tag(self) -> &'static str {
        match self {
            GcPhaseId::FullGcHeapdumps => "full_gc_heapdumps",
            GcPhaseId::FullGcPrepare => "full_gc_prepare",
            GcPhaseId::FullGcMark => "full_gc_mark",
            GcPhaseId::FullGcRoots => "full_gc_roots",
            GcPhaseId::FullGcCalculateAddresses => "full_gc_calculate_addresses",
            GcPhaseId::FullGcAdjustPointers => "full_gc_adjust_pointers",
            GcPhaseId::FullGcCopyObjects => "full_gc_copy_objects",
            GcPhaseId::FullGcResizeTlabs => "full_gc_resize_tlabs",
        }
    }
}

/// Accumulated wall time per phase.
pub struct PhaseTimings {
    totals: Mutex<FxHashMap<GcPhaseId, (Duration, usize)>>,
}

impl PhaseTimings {
    pub(crate) fn new() -> Self {
        Self {
            totals: Mutex::new(FxHashMap::default()),
        }
    }

    /// Record one completed run of `phase`.
    pub fn record(&self, phase: GcPhaseId, elapsed: Duration) {
        let mut totals = self.totals.lock();
        let entry = totals.entry(phase).or_insert((Duration::ZERO, 0));
        entry.0 += elapsed;
        entry.1 += 1;
    }

    /// Total time spent in `phase` across all collections.
    pub fn total(&self, phase: GcPhaseId) -> Duration {
        self.totals
            .lock()
            .get(&phase)
            .map(|(d, _)| *d)
            .unwrap_or(Duration::ZERO)
    }

    /// How many times `phase` ran.
    pub fn count(&self, phase: GcPhaseId) -> usize {
        self.totals.lock().get(&phase).map(|(_, n)| *n).unwrap_or(0)
    }
}

/// RAII scope timing one phase.
pub struct GcPhaseScope<'t> {
    timings: &'t PhaseTimings,
    phase: GcPhaseId,
    start: Instant,
}

impl<'t> GcPhaseScope<'t> {
    /// Open a scope for `phase`.
    pub fn new(timings: &'t PhaseTimings, phase: GcPhaseId) -> Self {
        Self {
            timings,
            phase,
            start: Instant::now(),
        }
    }
}

impl Drop for GcPhaseScope<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        self.timings.record(self.phase, elapsed);

        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "sable::gc",
            phase = self.phase.tag(),
            micros = elapsed.as_micros() as u64,
            "phase complete"
        );
    }
}
