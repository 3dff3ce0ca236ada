//! Write tracking for pages that hold compiled code
//!
//! Every store on the CPU path reports its real address here. Stores that
//! land on a watched page bump that page's generation, which tells the
//! block cache a checksum is worth recomputing. Pages hash into a fixed
//! number of slots, so an unrelated page can share a slot; that only costs
//! an extra revalidation.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use xc_memory::pages::{page_of, pages_spanned};

const SLOTS: usize = 1 << 16;

#[inline]
fn slot(page: u64) -> usize {
    (page as usize) & (SLOTS - 1)
}

/// Per-page write generations, shared by every core
pub struct CodeWatch {
    generations: Box<[AtomicU32]>,
    watched: Box<[AtomicU64]>,
}

impl CodeWatch {
    pub fn new() -> Self {
        Self {
            generations: (0..SLOTS).map(|_| AtomicU32::new(0)).collect(),
            watched: (0..SLOTS / 64).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Start tracking writes to the page holding real address `ra`
    pub fn watch(&self, ra: u64) {
        let slot = slot(page_of(ra));
        self.watched[slot / 64].fetch_or(1 << (slot % 64), Ordering::AcqRel);
    }

    #[inline]
    fn is_watched(&self, slot: usize) -> bool {
        self.watched[slot / 64].load(Ordering::Acquire) & (1 << (slot % 64)) != 0
    }

    /// Record a write of `len` bytes at real address `ra`
    #[inline]
    pub fn note_write(&self, ra: u64, len: u64) {
        for page in pages_spanned(ra, len) {
            let slot = slot(page);
            if self.is_watched(slot) {
                self.generations[slot].fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    /// Current generation of the page holding `ra`
    #[inline]
    pub fn generation(&self, ra: u64) -> u32 {
        self.generations[slot(page_of(ra))].load(Ordering::Acquire)
    }
}

impl Default for CodeWatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwatched_writes_are_ignored() {
        let watch = CodeWatch::new();
        watch.note_write(0x1000, 4);
        assert_eq!(watch.generation(0x1000), 0);
    }

    #[test]
    fn test_watched_page_generation() {
        let watch = CodeWatch::new();
        watch.watch(0x1234);
        watch.note_write(0x1FFC, 4);
        assert_eq!(watch.generation(0x1000), 1);
        // Straddles into the next, unwatched page
        watch.note_write(0x1FFE, 4);
        assert_eq!(watch.generation(0x1000), 2);
        assert_eq!(watch.generation(0x2000), 0);
    }
}
