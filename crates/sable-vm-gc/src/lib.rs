//! # Sable VM Garbage Collector
//!
//! Region-based collector for a managed-object heap, built around a
//! concurrent evacuating design with a stop-the-world sliding mark-compact
//! fallback. This crate carries the fallback path and everything it needs:
//! when the concurrent collector cannot make progress (near-OOM, cancelled
//! cycle), [`FullGc`] reclaims every dead object and eliminates
//! fragmentation regardless of the state the heap was left in.
//!
//! ## Design
//!
//! - **Regions**: the heap is split into equal-capacity regions with a
//!   small lifecycle state machine (Empty / Regular / Cset / Trash /
//!   Humongous / Pinned)
//! - **Brooks forwarding headers**: every object carries one extra word
//!   that self-references at rest and holds the planned destination while a
//!   compaction is in flight
//! - **Two mark bitmaps + TAMS**: marking writes a scratch bitmap which is
//!   swapped to authoritative at the end of the cycle; objects allocated
//!   after top-at-mark-start are implicitly live
//! - **Four STW phases**: mark, compute addresses (parallel region-sliced
//!   sliding), adjust pointers, copy objects
//! - **Claim-based parallelism**: work is distributed over a fixed worker
//!   gang by atomic fetch-increment claiming; phase 4 replays the phase-2
//!   slice assignment so writers never overlap

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod barrier;
pub mod bitmap;
pub mod copy;
pub mod heap;
pub mod mark_compact;
pub mod marker;
pub mod object;
pub mod phases;
pub mod refproc;
pub mod region;
pub mod roots;
pub mod tlab;
pub mod verifier;
pub mod workers;

pub use barrier::{BarrierScope, BarrierSet, BrooksBarrierSet, PassthroughBarrierSet};
pub use bitmap::MarkBitmap;
pub use copy::aligned_conjoint_words;
pub use heap::{CollectionSet, GcConfig, GcError, Heap, HeapAddr};
pub use mark_compact::{FullGc, GcCause};
pub use marker::Marker;
pub use object::{BrooksPointer, NULL_REF, ObjectHeader, tags};
pub use phases::{GcPhaseId, GcPhaseScope, PhaseTimings};
pub use refproc::ReferenceProcessor;
pub use region::{Region, RegionState};
pub use roots::{CodeBlob, DerivedPointerTable, RootGroup, RootKind, RootProcessor, RootSet, RootSlot};
pub use tlab::{TlabId, TlabRegistry};
pub use verifier::Verifier;
pub use workers::{ClaimCursor, WorkerPolicy, WorkerPool};
