//! A fixed-capacity, lock-free slot pool.
//!
//! `SlotPool<T, N>` owns `N` cache-line-aligned slots, each holding a payload
//! `T` plus an atomic `occupied` flag. `acquire` claims a free slot via a
//! single `compare_exchange_weak` on that flag; `release` gives it back via
//! `compare_exchange_strong`. A slot's state machine is `Free
//! --acquire(CAS)--> Occupied --release(CAS)--> Free`, with no terminal
//! state. `ClientRegistry`, `HandleRegistry` and `CallbackRegistry` are all
//! built on top of one of these.
//!
//! # Memory ordering
//!
//! - `occupied` transitions false→true (`acquire`) use acquire-on-success,
//!   relaxed-on-failure — the acquirer only needs to synchronize with the
//!   release that freed the slot, not with failed competing attempts.
//! - `occupied` transitions true→false (`release`) use acq-rel-on-success,
//!   relaxed-on-failure (`core::sync::atomic` has no release failure
//!   ordering — only success needs one, to make the next acquirer's writes
//!   happen-after) — acquire so earlier writes to the payload by this thread
//!   are visible, release so the next acquirer's writes happen-after.
//! - `empty_count` and `next_hint` are maintained with acquire/release
//!   fetch-arithmetic but are hints only: a concurrent `release` racing an
//!   `acquire`'s scan may be missed, producing a spurious `None`. A slot is
//!   never handed out twice; that guarantee comes from the CAS on `occupied`
//!   alone.

use crate::invariants::debug_assert_empty_count_bounded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::defaults::CACHE_LINE_ALIGNMENT;

/// One slot: a payload plus its occupancy flag, cache-line aligned so that
/// concurrent CAS traffic on adjacent slots does not false-share.
#[repr(align(64))]
struct Slot<T> {
    payload: UnsafeCell<T>,
    occupied: AtomicBool,
}

// SAFETY: `occupied` gates all access to `payload`. A slot is never read or
// written outside the window between a successful acquire-CAS and the
// matching release-CAS, and those two CASes establish a happens-before edge
// via their acquire/release orderings.
unsafe impl<T: Send> Send for Slot<T> {}
unsafe impl<T: Send> Sync for Slot<T> {}

const _: () = assert!(CACHE_LINE_ALIGNMENT == 64, "Slot<T> is hardcoded to 64-byte alignment");

/// Fixed-capacity lock-free slot pool of `N` elements of type `T`.
pub struct SlotPool<T, const N: usize> {
    slots: Box<[Slot<T>]>,
    next_hint: AtomicUsize,
    empty_count: AtomicUsize,
}

impl<T: Default, const N: usize> SlotPool<T, N> {
    /// Creates a pool with all `N` slots free, each holding a default-valued
    /// payload.
    #[must_use]
    pub fn new() -> Self {
        let slots = (0..N)
            .map(|_| Slot {
                payload: UnsafeCell::new(T::default()),
                occupied: AtomicBool::new(false),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            next_hint: AtomicUsize::new(0),
            empty_count: AtomicUsize::new(N),
        }
    }
}

impl<T: Default, const N: usize> Default for SlotPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default, const N: usize> SlotPool<T, N> {
    /// Releases the first occupied slot matching `predicate`, replacing its
    /// payload with `T::default()` and returning the value that was stored.
    ///
    /// Unlike [`SlotPool::release`], this does not require `T: PartialEq` —
    /// useful for payloads holding non-comparable resources (e.g. a boxed
    /// closure) that should be dropped promptly on release rather than left
    /// in place until the slot is reacquired.
    pub fn take_if(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        for slot in self.slots.iter() {
            if slot.occupied.load(Ordering::Acquire) {
                // SAFETY: see `find_if`.
                let matches = predicate(unsafe { &*slot.payload.get() });
                if matches
                    && slot
                        .occupied
                        .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                {
                    // SAFETY: the CAS above is the sole authority granting
                    // exclusive access until the next `acquire`.
                    let taken = std::mem::replace(unsafe { &mut *slot.payload.get() }, T::default());
                    let next = self.empty_count.fetch_add(1, Ordering::Release) + 1;
                    debug_assert_empty_count_bounded!(next, N);
                    return Some(taken);
                }
            }
        }
        None
    }
}

impl<T, const N: usize> SlotPool<T, N> {
    /// Total number of slots.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Best-effort count of currently free slots. Not authoritative under
    /// concurrent use; never exceeds `capacity()`.
    #[inline]
    #[must_use]
    pub fn empty_count(&self) -> usize {
        self.empty_count.load(Ordering::Acquire)
    }

    /// Returns `true` if the slot at `index` is currently observed free.
    ///
    /// # Panics
    ///
    /// Panics if `index >= capacity()` — unlike `release(index)`, an
    /// out-of-bounds index here is a programming error.
    #[must_use]
    pub fn is_free_at(&self, index: usize) -> bool {
        !self.slots[index].occupied.load(Ordering::Acquire)
    }

    /// Claims a free slot and returns a mutable handle to its payload, or
    /// `None` if no slot could be claimed.
    ///
    /// Scans up to `N` indices starting at the last successful hint; gives up
    /// early if `empty_count` was already observed to be zero. Never hands
    /// out the same slot to two concurrent callers.
    pub fn acquire(&self) -> Option<&mut T> {
        if self.empty_count.load(Ordering::Acquire) == 0 {
            return None;
        }

        let start = self.next_hint.load(Ordering::Acquire);
        for offset in 0..N {
            let index = (start + offset) % N;
            let slot = &self.slots[index];
            if slot
                .occupied
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                let previous = self.empty_count.fetch_sub(1, Ordering::AcqRel);
                debug_assert_empty_count_bounded!(previous.saturating_sub(1), N);
                self.next_hint.store((index + 1) % N, Ordering::Relaxed);
                // SAFETY: the CAS above is the sole authority granting
                // exclusive access to this slot's payload until a matching
                // `release`.
                return Some(unsafe { &mut *slot.payload.get() });
            }
        }
        None
    }

    /// Releases the slot at `index`, if it was occupied. A no-op (no
    /// mutation, no counter change) if the index is out of bounds or the
    /// slot was already free.
    pub fn release_index(&self, index: usize) {
        let Some(slot) = self.slots.get(index) else {
            return;
        };
        if slot
            .occupied
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let next = self.empty_count.fetch_add(1, Ordering::Release) + 1;
            debug_assert_empty_count_bounded!(next, N);
        }
    }

    /// Linear scan for the first occupied slot whose payload satisfies
    /// `predicate`. A concurrent release during the scan may hide or reveal
    /// candidates, but any returned slot was occupied at the instant it was
    /// inspected.
    pub fn find_if(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<&T> {
        for slot in self.slots.iter() {
            if slot.occupied.load(Ordering::Acquire) {
                // SAFETY: observed occupied; payload is initialized and not
                // concurrently mutated by a third party while we read it
                // (writers hold exclusive access only between acquire/release
                // of the same slot, and readers of `find_if` never mutate).
                let payload = unsafe { &*slot.payload.get() };
                if predicate(payload) {
                    return Some(payload);
                }
            }
        }
        None
    }

    /// Mutable variant of [`SlotPool::find_if`].
    pub fn find_if_mut(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<&mut T> {
        for slot in self.slots.iter() {
            if slot.occupied.load(Ordering::Acquire) {
                // SAFETY: see `find_if`; caller holds the only reference
                // returned for this slot, matching the exclusive-handle
                // discipline the rest of the pool follows.
                let payload = unsafe { &mut *slot.payload.get() };
                if predicate(payload) {
                    return Some(payload);
                }
            }
        }
        None
    }

    /// Invokes `f` on every currently occupied slot's payload. Used for
    /// bulk invalidation sweeps (e.g. clearing remote registrations on a
    /// daemon disconnect) where no single equality key identifies the set.
    pub fn for_each_occupied_mut(&self, mut f: impl FnMut(&mut T)) {
        for slot in self.slots.iter() {
            if slot.occupied.load(Ordering::Acquire) {
                // SAFETY: see `find_if_mut`.
                f(unsafe { &mut *slot.payload.get() });
            }
        }
    }
}

impl<T: PartialEq, const N: usize> SlotPool<T, N> {
    /// Releases the first occupied slot whose payload equals `value`. A
    /// no-op if no occupied slot matches.
    pub fn release(&self, value: &T) {
        for (index, slot) in self.slots.iter().enumerate() {
            // SAFETY: read-only inspection; the CAS below is what actually
            // transfers ownership, so a stale read here just means we may
            // miss a match and scan on (never a double-release).
            let matches = unsafe { &*slot.payload.get() } == value;
            if matches
                && slot
                    .occupied
                    .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            {
                let next = self.empty_count.fetch_add(1, Ordering::Release) + 1;
                debug_assert_empty_count_bounded!(next, N);
                return;
            }
            let _ = index;
        }
    }
}
