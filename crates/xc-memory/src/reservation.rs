//! Reservation tracking for lwarx/ldarx and stwcx./stdcx.
//!
//! One slot per logical thread, keyed by the 128-byte granule of the reserved
//! real address. Any write that touches a reserved granule clears every
//! reservation on it. The table is shared by all cores and lock-guarded.
//!
//! Load-and-reserve reads memory and installs the slot under the lock, and
//! so does every store while any reservation is held. When nobody holds one,
//! plain stores skip the lock: they announce themselves in `writers` first,
//! and a load-and-reserve waits for announced writers to drain after bumping
//! `active`. Either the writer sees `active` and takes the lock, or the
//! reserving load sees the writer's data.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::constants::RESERVATION_GRANULARITY;

#[inline]
fn granule(addr: u64) -> u64 {
    addr & !(RESERVATION_GRANULARITY - 1)
}

/// Shared reservation table
pub struct ReservationTable {
    slots: Mutex<Vec<Option<u64>>>,
    active: AtomicUsize,
    /// Stores in flight on the lock-free path
    writers: AtomicUsize,
}

impl ReservationTable {
    /// Create a table for `threads` logical threads
    pub fn new(threads: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; threads]),
            active: AtomicUsize::new(0),
            writers: AtomicUsize::new(0),
        }
    }

    /// Number of threads currently holding a reservation
    #[inline]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Set `thread`'s reservation, replacing any previous one
    pub fn reserve(&self, thread: usize, addr: u64) {
        let mut slots = self.slots.lock();
        if slots[thread].replace(granule(addr)).is_none() {
            self.active.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Perform `load` and reserve `addr` for `thread` as one atomic step
    ///
    /// No store can land between the read and the reservation taking
    /// effect, so a store-conditional that later succeeds is guaranteed to
    /// follow the value read here.
    pub fn load_reserve<T, E>(&self, thread: usize, addr: u64, load: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let mut slots = self.slots.lock();
        let had = slots[thread].take().is_some();
        // Counted before the read so lock-free writers divert to the lock
        self.active.fetch_add(1, Ordering::SeqCst);
        while self.writers.load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
        }
        match load() {
            Ok(value) => {
                slots[thread] = Some(granule(addr));
                if had {
                    self.active.fetch_sub(1, Ordering::AcqRel);
                }
                Ok(value)
            }
            Err(e) => {
                self.active.fetch_sub(if had { 2 } else { 1 }, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    /// Perform a plain `store` of `len` bytes at `addr`, clearing every
    /// reservation on the granules it touches
    pub fn store<E>(&self, addr: u64, len: u64, store: impl FnOnce() -> Result<(), E>) -> Result<(), E> {
        self.writers.fetch_add(1, Ordering::SeqCst);
        if self.active.load(Ordering::SeqCst) == 0 {
            let result = store();
            self.writers.fetch_sub(1, Ordering::SeqCst);
            return result;
        }
        self.writers.fetch_sub(1, Ordering::SeqCst);

        let mut slots = self.slots.lock();
        let result = store();
        self.snoop_locked(&mut slots, addr, len);
        result
    }

    /// Check whether `thread` holds a reservation covering `addr`
    pub fn is_reserved(&self, thread: usize, addr: u64) -> bool {
        self.slots.lock()[thread] == Some(granule(addr))
    }

    /// Drop `thread`'s reservation
    pub fn clear(&self, thread: usize) {
        let mut slots = self.slots.lock();
        if slots[thread].take().is_some() {
            self.active.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Clear every reservation overlapping a write of `len` bytes at `addr`
    pub fn snoop(&self, addr: u64, len: u64) {
        if self.active() == 0 {
            return;
        }
        let mut slots = self.slots.lock();
        self.snoop_locked(&mut slots, addr, len);
    }

    /// Conditionally perform `store` if `thread` still holds a reservation
    /// on `addr`
    ///
    /// The reservation is consumed either way. On success the store runs
    /// under the table lock and clears any other thread's reservation on the
    /// same granule, so no write can slip in between check and store.
    pub fn store_conditional<E>(
        &self,
        thread: usize,
        addr: u64,
        len: u64,
        store: impl FnOnce() -> Result<(), E>,
    ) -> Result<bool, E> {
        let mut slots = self.slots.lock();
        let held = slots[thread].take();
        if held.is_some() {
            self.active.fetch_sub(1, Ordering::AcqRel);
        }
        if held != Some(granule(addr)) {
            return Ok(false);
        }
        store()?;
        self.snoop_locked(&mut slots, addr, len);
        Ok(true)
    }

    fn snoop_locked(&self, slots: &mut [Option<u64>], addr: u64, len: u64) {
        let first = granule(addr);
        let last = granule(addr.wrapping_add(len.max(1) - 1));
        for slot in slots.iter_mut() {
            if matches!(*slot, Some(g) if g >= first && g <= last) {
                *slot = None;
                self.active.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_basic() {
        let table = ReservationTable::new(6);
        assert_eq!(table.active(), 0);

        table.reserve(0, 0x1004);
        assert!(table.is_reserved(0, 0x1000));
        assert!(table.is_reserved(0, 0x107F));
        assert!(!table.is_reserved(0, 0x1080));
        assert_eq!(table.active(), 1);

        table.reserve(0, 0x2000);
        assert_eq!(table.active(), 1);
        assert!(!table.is_reserved(0, 0x1000));
    }

    #[test]
    fn test_store_conditional_success() {
        let table = ReservationTable::new(2);
        table.reserve(0, 0x1000);
        table.reserve(1, 0x1040);

        let mut stored = false;
        let ok = table
            .store_conditional::<()>(0, 0x1000, 4, || {
                stored = true;
                Ok(())
            })
            .unwrap();
        assert!(ok);
        assert!(stored);
        // Same granule: the other thread's reservation is gone too
        assert!(!table.is_reserved(1, 0x1040));
        assert_eq!(table.active(), 0);
    }

    #[test]
    fn test_store_conditional_after_snoop_fails() {
        let table = ReservationTable::new(2);
        table.reserve(0, 0x1000);
        table.snoop(0x1010, 8);
        assert_eq!(table.active(), 0);

        let ok = table
            .store_conditional::<()>(0, 0x1000, 4, || panic!("store must not run"))
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn test_snoop_other_granule_keeps_reservation() {
        let table = ReservationTable::new(2);
        table.reserve(1, 0x1000);
        table.snoop(0x1080, 4);
        assert!(table.is_reserved(1, 0x1000));

        // A write straddling into the granule clears it
        table.snoop(0xFFE, 4);
        assert!(!table.is_reserved(1, 0x1000));
    }

    #[test]
    fn test_store_conditional_wrong_address() {
        let table = ReservationTable::new(1);
        table.reserve(0, 0x1000);
        let ok = table.store_conditional::<()>(0, 0x2000, 4, || Ok(())).unwrap();
        assert!(!ok);
        assert_eq!(table.active(), 0);
    }

    #[test]
    fn test_load_reserve_then_store_clears() {
        let table = ReservationTable::new(2);
        let value = table.load_reserve::<u32, ()>(0, 0x1000, || Ok(7)).unwrap();
        assert_eq!(value, 7);
        assert!(table.is_reserved(0, 0x1000));
        assert_eq!(table.active(), 1);

        // Re-reserving keeps the count at one
        table.load_reserve::<u32, ()>(0, 0x1040, || Ok(0)).unwrap();
        assert_eq!(table.active(), 1);

        let mut stored = false;
        table
            .store::<()>(0x1078, 4, || {
                stored = true;
                Ok(())
            })
            .unwrap();
        assert!(stored);
        assert!(!table.is_reserved(0, 0x1000));
        assert_eq!(table.active(), 0);
    }

    #[test]
    fn test_failed_load_reserve_drops_reservation() {
        let table = ReservationTable::new(1);
        table.reserve(0, 0x1000);
        assert!(table.load_reserve::<u32, &str>(0, 0x2000, || Err("unmapped")).is_err());
        assert!(!table.is_reserved(0, 0x1000));
        assert_eq!(table.active(), 0);
    }

    #[test]
    fn test_contended_increments_are_not_lost() {
        use std::sync::atomic::AtomicU64;
        use std::sync::Arc;

        const THREADS: usize = 4;
        const INCREMENTS: u64 = 2000;

        let table = Arc::new(ReservationTable::new(THREADS + 1));
        // Counter and a neighbour in the same granule
        let memory = Arc::new([AtomicU64::new(0), AtomicU64::new(0)]);

        let mut workers = Vec::new();
        for thread in 0..THREADS {
            let table = Arc::clone(&table);
            let memory = Arc::clone(&memory);
            workers.push(std::thread::spawn(move || {
                let mut done = 0;
                while done < INCREMENTS {
                    let value = table
                        .load_reserve::<u64, ()>(thread, 0x1000, || Ok(memory[0].load(Ordering::Relaxed)))
                        .unwrap();
                    let stored = table
                        .store_conditional::<()>(thread, 0x1000, 8, || {
                            memory[0].store(value + 1, Ordering::Relaxed);
                            Ok(())
                        })
                        .unwrap();
                    if stored {
                        done += 1;
                    }
                }
            }));
        }
        let writer = {
            let table = Arc::clone(&table);
            let memory = Arc::clone(&memory);
            std::thread::spawn(move || {
                for i in 0..INCREMENTS {
                    table
                        .store::<()>(0x1008, 8, || {
                            memory[1].store(i, Ordering::Relaxed);
                            Ok(())
                        })
                        .unwrap();
                }
            })
        };
        for worker in workers {
            worker.join().unwrap();
        }
        writer.join().unwrap();

        assert_eq!(memory[0].load(Ordering::Relaxed), THREADS as u64 * INCREMENTS);
        assert_eq!(table.active(), 0);
    }
}
