//! Root set and parallel root processing.
//!
//! Roots come in groups: per-thread stack slots, class-loader-data slots,
//! weak handles, and code blobs (whose embedded object slots additionally
//! need relocation fixups when rewritten). The root processor snapshots the
//! groups and distributes them across GC workers with a claim cursor, so
//! each group is visited by exactly one worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::heap::HeapAddr;
use crate::object::NULL_REF;
use crate::workers::ClaimCursor;

/// A single root slot holding an object address (or null).
///
/// Slots are handed out as `Arc`s so embedder code can observe the rewrite
/// a collection performed.
pub type RootSlot = Arc<AtomicUsize>;

/// Kinds of root groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// A mutator thread's stack.
    ThreadStack,
    /// Class-loader-data strong roots.
    ClassLoaderData,
    /// Weak handles — not traced during marking, cleared when dead.
    WeakHandles,
}

/// An ordered group of root slots.
pub struct RootGroup {
    kind: RootKind,
    slots: RwLock<Vec<RootSlot>>,
}

impl RootGroup {
    fn new(kind: RootKind) -> Self {
        Self {
            kind,
            slots: RwLock::new(Vec::new()),
        }
    }

    /// This group's kind.
    pub fn kind(&self) -> RootKind {
        self.kind
    }

    /// Register a slot holding `addr`.
    pub fn add_slot(&self, addr: HeapAddr) -> RootSlot {
        let slot = Arc::new(AtomicUsize::new(addr));
        self.slots.write().push(slot.clone());
        slot
    }

    /// Visit every slot.
    pub fn for_each_slot(&self, mut f: impl FnMut(&AtomicUsize)) {
        for slot in self.slots.read().iter() {
            f(slot);
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether the group has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

/// A compiled-code blob with embedded object references.
///
/// The `holder` stands in for the class whose compiled code this is; class
/// unloading drops blobs whose holder died. Every rewrite of the embedded
/// slots bumps `relocation_fixups` (the stand-in for patching the actual
/// instruction stream).
pub struct CodeBlob {
    holder: RootSlot,
    oops: Vec<RootSlot>,
    relocation_fixups: AtomicUsize,
}

impl CodeBlob {
    fn new(holder: HeapAddr, oops: &[HeapAddr]) -> Self {
        Self {
            holder: Arc::new(AtomicUsize::new(holder)),
            oops: oops
                .iter()
                .map(|&a| Arc::new(AtomicUsize::new(a)))
                .collect(),
            relocation_fixups: AtomicUsize::new(0),
        }
    }

    /// The holder slot.
    pub fn holder(&self) -> &RootSlot {
        &self.holder
    }

    /// The embedded object slots.
    pub fn oops(&self) -> &[RootSlot] {
        &self.oops
    }

    /// How many times this blob's slots were rewritten with fixups.
    pub fn relocation_fixups(&self) -> usize {
        self.relocation_fixups.load(Ordering::Relaxed)
    }

    fn apply(&self, include_holder: bool, f: &mut dyn FnMut(&AtomicUsize)) {
        if include_holder {
            f(&self.holder);
        }
        for slot in &self.oops {
            f(slot);
        }
        self.relocation_fixups.fetch_add(1, Ordering::Relaxed);
    }
}

/// A derived pointer: a root slot holding an interior address at a fixed
/// offset from a base object. The table is cleared (offsets captured)
/// before root adjustment and re-applied after, because adjustment only
/// understands object-start addresses.
struct DerivedEntry {
    base: RootSlot,
    derived: RootSlot,
    offset: AtomicUsize,
}

/// Registry of derived pointers.
pub struct DerivedPointerTable {
    entries: Mutex<Vec<DerivedEntry>>,
}

impl DerivedPointerTable {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register `derived` as `base + (derived - base)`.
    pub fn register(&self, base: RootSlot, derived: RootSlot) {
        let offset = derived.load(Ordering::Relaxed) - base.load(Ordering::Relaxed);
        self.entries.lock().push(DerivedEntry {
            base,
            derived,
            offset: AtomicUsize::new(offset),
        });
    }

    /// Capture current offsets. Must run before the base slots are adjusted.
    pub fn clear(&self) {
        for entry in self.entries.lock().iter() {
            let base = entry.base.load(Ordering::Relaxed);
            let derived = entry.derived.load(Ordering::Relaxed);
            entry.offset.store(derived - base, Ordering::Relaxed);
        }
    }

    /// Recompute every derived slot from its (already adjusted) base.
    pub fn update_pointers(&self) {
        for entry in self.entries.lock().iter() {
            let base = entry.base.load(Ordering::Relaxed);
            if base != NULL_REF {
                entry
                    .derived
                    .store(base + entry.offset.load(Ordering::Relaxed), Ordering::Relaxed);
            }
        }
    }

    /// Number of registered derived pointers.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// All roots known to the runtime.
pub struct RootSet {
    thread_stacks: RwLock<Vec<Arc<RootGroup>>>,
    cld: Arc<RootGroup>,
    weak: Arc<RootGroup>,
    code_blobs: RwLock<Vec<Arc<CodeBlob>>>,
    derived: DerivedPointerTable,
}

impl RootSet {
    pub(crate) fn new() -> Self {
        Self {
            thread_stacks: RwLock::new(Vec::new()),
            cld: Arc::new(RootGroup::new(RootKind::ClassLoaderData)),
            weak: Arc::new(RootGroup::new(RootKind::WeakHandles)),
            code_blobs: RwLock::new(Vec::new()),
            derived: DerivedPointerTable::new(),
        }
    }

    /// Register a mutator thread's stack as a root group.
    pub fn register_thread(&self) -> Arc<RootGroup> {
        let group = Arc::new(RootGroup::new(RootKind::ThreadStack));
        self.thread_stacks.write().push(group.clone());
        group
    }

    /// The class-loader-data root group.
    pub fn cld_roots(&self) -> &Arc<RootGroup> {
        &self.cld
    }

    /// The weak-handle root group.
    pub fn weak_handles(&self) -> &Arc<RootGroup> {
        &self.weak
    }

    /// Register a code blob with its holder and embedded slots.
    pub fn register_code_blob(&self, holder: HeapAddr, oops: &[HeapAddr]) -> Arc<CodeBlob> {
        let blob = Arc::new(CodeBlob::new(holder, oops));
        self.code_blobs.write().push(blob.clone());
        blob
    }

    /// Snapshot of the registered code blobs.
    pub fn code_blobs(&self) -> Vec<Arc<CodeBlob>> {
        self.code_blobs.read().clone()
    }

    /// Drop every code blob for which `dead(holder_addr)` holds. Returns the
    /// number purged.
    pub fn purge_code_blobs(&self, dead: impl Fn(HeapAddr) -> bool) -> usize {
        let mut blobs = self.code_blobs.write();
        let before = blobs.len();
        blobs.retain(|blob| {
            let holder = blob.holder.load(Ordering::Relaxed);
            holder == NULL_REF || !dead(holder)
        });
        before - blobs.len()
    }

    /// The derived-pointer table.
    pub fn derived_pointers(&self) -> &DerivedPointerTable {
        &self.derived
    }
}

/// One claimable unit of root-processing work.
enum RootWork {
    Slots(Arc<RootGroup>),
    Code(Arc<CodeBlob>),
}

/// Snapshots the root groups and fans them out over workers.
pub struct RootProcessor {
    work: Vec<RootWork>,
    cursor: ClaimCursor,
    include_code_holders: bool,
}

impl RootProcessor {
    /// Snapshot `roots`. Weak handles are included only when `include_weak`
    /// is set — marking treats them specially, adjustment does not. Code
    /// blob *holders* are skipped when `include_code_holders` is unset, so
    /// a marking pass with class unloading enabled lets dead holders die.
    pub fn new(roots: &RootSet, include_weak: bool, include_code_holders: bool) -> Self {
        let mut work = Vec::new();
        for group in roots.thread_stacks.read().iter() {
            work.push(RootWork::Slots(group.clone()));
        }
        work.push(RootWork::Slots(roots.cld.clone()));
        if include_weak {
            work.push(RootWork::Slots(roots.weak.clone()));
        }
        for blob in roots.code_blobs.read().iter() {
            work.push(RootWork::Code(blob.clone()));
        }
        let cursor = ClaimCursor::new(work.len());
        Self {
            work,
            cursor,
            include_code_holders,
        }
    }

    /// Apply `f` to every root slot of every group this worker claims.
    /// Claiming guarantees each group is processed exactly once across the
    /// gang.
    pub fn process_all_roots(&self, _worker_id: usize, mut f: impl FnMut(&AtomicUsize)) {
        while let Some(index) = self.cursor.claim_next() {
            match &self.work[index] {
                RootWork::Slots(group) => group.for_each_slot(&mut f),
                RootWork::Code(blob) => blob.apply(self.include_code_holders, &mut f),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_groups_and_slots() {
        let roots = RootSet::new();
        let stack = roots.register_thread();
        let slot = stack.add_slot(42);
        assert_eq!(stack.kind(), RootKind::ThreadStack);
        assert_eq!(stack.len(), 1);
        assert_eq!(slot.load(Ordering::Relaxed), 42);
    }

    #[test]
    fn test_processor_visits_each_group_once() {
        let roots = RootSet::new();
        let s1 = roots.register_thread();
        let s2 = roots.register_thread();
        s1.add_slot(1);
        s1.add_slot(2);
        s2.add_slot(3);
        roots.cld_roots().add_slot(4);
        roots.weak_handles().add_slot(5);

        let rp = RootProcessor::new(&roots, true, true);
        let visited = AtomicUsize::new(0);
        rp.process_all_roots(0, |_slot| {
            visited.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(visited.load(Ordering::Relaxed), 5);

        // Cursor is exhausted: a second worker sees nothing.
        rp.process_all_roots(1, |_slot| panic!("no work may remain"));
    }

    #[test]
    fn test_processor_can_exclude_weak_handles() {
        let roots = RootSet::new();
        roots.weak_handles().add_slot(7);
        let rp = RootProcessor::new(&roots, false, true);
        rp.process_all_roots(0, |slot| {
            assert_ne!(slot.load(Ordering::Relaxed), 7, "weak handle visited");
        });
    }

    #[test]
    fn test_code_blob_fixups_counted() {
        let roots = RootSet::new();
        let blob = roots.register_code_blob(10, &[20, 30]);
        let rp = RootProcessor::new(&roots, false, true);
        let visited = AtomicUsize::new(0);
        rp.process_all_roots(0, |_| {
            visited.fetch_add(1, Ordering::Relaxed);
        });
        // holder + two oops
        assert_eq!(visited.load(Ordering::Relaxed), 3);
        assert_eq!(blob.relocation_fixups(), 1);
    }

    #[test]
    fn test_purge_code_blobs() {
        let roots = RootSet::new();
        roots.register_code_blob(10, &[]);
        roots.register_code_blob(20, &[]);
        let purged = roots.purge_code_blobs(|holder| holder == 10);
        assert_eq!(purged, 1);
        assert_eq!(roots.code_blobs().len(), 1);
    }

    #[test]
    fn test_derived_pointer_round_trip() {
        let roots = RootSet::new();
        let base = roots.register_thread().add_slot(100);
        let derived: RootSlot = Arc::new(AtomicUsize::new(103));
        roots.derived_pointers().register(base.clone(), derived.clone());

        roots.derived_pointers().clear();
        base.store(500, Ordering::Relaxed); // the "adjustment"
        roots.derived_pointers().update_pointers();
        assert_eq!(derived.load(Ordering::Relaxed), 503);
    }
}
