//! Bulk word copies over heap storage.

use crate::heap::{Heap, HeapAddr};

/// Copy `count` words from `src` to `dst` with memmove semantics: the
/// ranges may overlap in either direction.
///
/// Sliding compaction only ever moves objects toward lower addresses
/// (`dst <= src`), for which the forward loop is the one that matters; the
/// backward case is kept so the primitive is safe for any caller.
pub fn aligned_conjoint_words(heap: &Heap, src: HeapAddr, dst: HeapAddr, count: usize) {
    if src == dst || count == 0 {
        return;
    }
    let storage = heap.storage();
    use std::sync::atomic::Ordering::Relaxed;
    if dst < src {
        for i in 0..count {
            storage[dst + i].store(storage[src + i].load(Relaxed), Relaxed);
        }
    } else {
        for i in (0..count).rev() {
            storage[dst + i].store(storage[src + i].load(Relaxed), Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{GcConfig, Heap};

    fn heap() -> std::sync::Arc<Heap> {
        Heap::with_config(GcConfig {
            region_size_words: 64,
            region_count: 1,
            use_tlab: false,
            ..GcConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_forward_overlapping_copy() {
        let heap = heap();
        for i in 0..8 {
            heap.set_word(10 + i, 100 + i);
        }
        // Slide left by 3 with overlap.
        aligned_conjoint_words(&heap, 10, 7, 8);
        for i in 0..8 {
            assert_eq!(heap.word(7 + i), 100 + i);
        }
    }

    #[test]
    fn test_backward_overlapping_copy() {
        let heap = heap();
        for i in 0..8 {
            heap.set_word(10 + i, 200 + i);
        }
        aligned_conjoint_words(&heap, 10, 13, 8);
        for i in 0..8 {
            assert_eq!(heap.word(13 + i), 200 + i);
        }
    }

    #[test]
    fn test_identity_copy_is_noop() {
        let heap = heap();
        heap.set_word(5, 42);
        aligned_conjoint_words(&heap, 5, 5, 1);
        assert_eq!(heap.word(5), 42);
    }
}
