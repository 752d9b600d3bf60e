//! Reference processing.
//!
//! Weak and soft reference objects carry their referent in slot 0. While
//! discovery is enabled, a marker that reaches a reference object registers
//! it here instead of tracing the referent, and the discovered lists are
//! resolved after marking reaches its fixpoint: dead referents are cleared,
//! soft referents survive when the snapshot policy retains them.
//!
//! Full GC snapshots the policy as clear-everything: it is the last resort,
//! and softly reachable memory must go.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::heap::HeapAddr;

/// Discovery state and discovered reference lists.
pub struct ReferenceProcessor {
    discovery_enabled: AtomicBool,
    clear_soft_refs: AtomicBool,
    discovered: Mutex<Vec<HeapAddr>>,
}

impl ReferenceProcessor {
    pub(crate) fn new() -> Self {
        Self {
            discovery_enabled: AtomicBool::new(false),
            clear_soft_refs: AtomicBool::new(false),
            discovered: Mutex::new(Vec::new()),
        }
    }

    /// Allow markers to discover reference objects.
    pub fn enable_discovery(&self) {
        self.discovery_enabled.store(true, Ordering::Relaxed);
    }

    /// Stop discovery.
    pub fn disable_discovery(&self) {
        self.discovery_enabled.store(false, Ordering::Relaxed);
    }

    /// Whether discovery is active.
    pub fn is_discovery_enabled(&self) -> bool {
        self.discovery_enabled.load(Ordering::Relaxed)
    }

    /// Drop everything discovered by an abandoned cycle.
    pub fn abandon_partial_discovery(&self) {
        self.discovered.lock().clear();
    }

    /// Assert that no discovery leaked across a cycle boundary.
    pub fn verify_no_references_recorded(&self) {
        assert!(
            self.discovered.lock().is_empty(),
            "discovered references recorded outside a marking cycle"
        );
    }

    /// Snapshot the soft-reference policy for the coming cycle.
    pub fn setup_policy(&self, clear_all_soft_refs: bool) {
        self.clear_soft_refs
            .store(clear_all_soft_refs, Ordering::Relaxed);
    }

    /// The snapshot taken by `setup_policy`.
    pub fn should_clear_soft_refs(&self) -> bool {
        self.clear_soft_refs.load(Ordering::Relaxed)
    }

    /// Register a reference object found by a marker. Returns `true` when
    /// the object was discovered (and the marker must not trace slot 0),
    /// `false` when discovery is off and the referent is a strong edge.
    pub fn discover(&self, reference_obj: HeapAddr) -> bool {
        if !self.is_discovery_enabled() {
            return false;
        }
        self.discovered.lock().push(reference_obj);
        true
    }

    /// Take the discovered list for processing.
    pub fn take_discovered(&self) -> Vec<HeapAddr> {
        std::mem::take(&mut *self.discovered.lock())
    }

    /// Number of currently discovered references.
    pub fn discovered_count(&self) -> usize {
        self.discovered.lock().len()
    }
}
