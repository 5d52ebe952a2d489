//! A lock-free, single-producer-friendly multi-consumer ring buffer whose
//! entire head/tail/fullness state lives in one `AtomicU32`.
//!
//! Packing `empty`/`start`/`end` into a single word and updating them with
//! one CAS avoids the classic head-vs-tail race where two producers (or two
//! consumers) could each observe "not full"/"not empty" and both advance —
//! with split atomics that race is possible because an observer can load one
//! field before the other changes; a single packed word can't be observed
//! half-updated.
//!
//! # Memory ordering
//!
//! - The packed state word transitions via `compare_exchange` with
//!   acquire-release on success and relaxed on failure — the full ring state
//!   changes atomically in that one CAS.
//! - Each element's `ready` flag is stored `true` with release *after* the
//!   producer finishes writing the payload, and loaded with acquire before a
//!   consumer reads the payload — this is the happens-before edge between
//!   producer writes and consumer reads.
//! - `deallocate`-style consumption CASes `ready` true→false with `SeqCst`
//!   (see [`crate::job_processor`]) so that exactly one competing consumer
//!   wins each element, even with more than one consumer draining the ring.

use crate::invariants::{debug_assert_empty_flag_consistent, debug_assert_indices_in_range};
use crate::PipelineError;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

const EMPTY_BIT: u32 = 1 << 31;
const START_SHIFT: u32 = 16;
const START_MASK: u32 = 0x7FFF;
const END_MASK: u32 = 0xFFFF;

/// Packs `(empty, start, end)` into the 32-bit layout `empty:1 | start:15 | end:16`.
#[inline]
const fn pack(empty: bool, start: u16, end: u16) -> u32 {
    let empty_bit = if empty { EMPTY_BIT } else { 0 };
    empty_bit | (((start as u32) & START_MASK) << START_SHIFT) | ((end as u32) & END_MASK)
}

/// Unpacks a 32-bit state word into `(empty, start, end)`.
#[inline]
const fn unpack(word: u32) -> (bool, u16, u16) {
    let empty = (word & EMPTY_BIT) != 0;
    let start = ((word >> START_SHIFT) & START_MASK) as u16;
    let end = (word & END_MASK) as u16;
    (empty, start, end)
}

#[inline]
const fn is_full(empty: bool, start: u16, end: u16) -> bool {
    (start == end) && !empty
}

/// One ring slot: a payload plus its readiness flag, cache-line aligned.
#[repr(align(64))]
struct Element<T> {
    payload: UnsafeCell<T>,
    ready: AtomicBool,
}

// SAFETY: `ready` gates consumer access to `payload`; producer access is
// gated by having won the `end`-advancing CAS in `reserve_empty`. Both are
// single-writer-at-a-time by construction of the protocol.
unsafe impl<T: Send> Send for Element<T> {}
unsafe impl<T: Send> Sync for Element<T> {}

/// Lock-free ring buffer of `N` job slots.
pub struct JobRing<T, const N: usize> {
    state: AtomicU32,
    empty_count: AtomicUsize,
    elements: Box<[Element<T>]>,
    max_retries: u32,
}

impl<T: Default, const N: usize> JobRing<T, N> {
    /// Creates an empty ring with the default CAS retry budget
    /// ([`crate::config::defaults::CAS_MAX_RETRIES`]).
    ///
    /// # Panics
    ///
    /// Panics if `N` is zero or exceeds `0x7FFF` (15-bit `start` field
    /// limit).
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_retries(crate::config::defaults::CAS_MAX_RETRIES)
    }

    /// Creates an empty ring with a caller-chosen CAS retry budget.
    ///
    /// # Panics
    ///
    /// Panics if `N` is zero or exceeds `0x7FFF`, or if `max_retries` is zero.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        assert!(N > 0, "JobRing capacity must be nonzero");
        assert!(N <= START_MASK as usize, "JobRing capacity exceeds the 15-bit start field limit");
        assert!(max_retries > 0, "max_retries must be at least 1");

        let elements = (0..N)
            .map(|_| Element {
                payload: UnsafeCell::new(T::default()),
                ready: AtomicBool::new(false),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            state: AtomicU32::new(pack(true, 0, 0)),
            empty_count: AtomicUsize::new(N),
            elements,
            max_retries,
        }
    }
}

impl<T: Default, const N: usize> Default for JobRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> JobRing<T, N> {
    /// Ring capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u16 {
        N as u16
    }

    /// Best-effort count of unreserved slots. Not authoritative under
    /// concurrent use.
    #[inline]
    #[must_use]
    pub fn empty_count(&self) -> usize {
        self.empty_count.load(Ordering::Acquire)
    }

    /// Reserves the next slot for writing and returns a [`Reservation`]
    /// through which the producer writes the payload and marks it ready.
    ///
    /// Fails with [`PipelineError::RingFull`] if the ring is full at the time
    /// of the check; with [`PipelineError::RingMaxRetries`] if the retry
    /// budget is exhausted by CAS contention (the ring was not full, but
    /// another producer kept winning the race).
    pub fn reserve_empty(&self) -> Result<Reservation<'_, T, N>, PipelineError> {
        for _ in 0..self.max_retries {
            let current = self.state.load(Ordering::Acquire);
            let (empty, start, end) = unpack(current);
            debug_assert_indices_in_range!(start, end, N as u16);

            if is_full(empty, start, end) {
                return Err(PipelineError::RingFull);
            }

            let new_end = (end + 1) % N as u16;
            let new_state = pack(false, start & (START_MASK as u16), new_end);
            if self
                .state
                .compare_exchange(current, new_state, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.empty_count.fetch_sub(1, Ordering::Release);
                return Ok(Reservation {
                    ring: self,
                    index: end as usize,
                });
            }
        }
        Err(PipelineError::RingMaxRetries)
    }

    /// Returns a handle to the head element if and only if it is observed
    /// ready. Does not advance `start`.
    ///
    /// Retries (waiting for the head producer to finish filling) up to the
    /// retry budget before giving up with [`PipelineError::RingMaxRetries`].
    /// Returns [`PipelineError::RingEmpty`] immediately if the ring is empty.
    pub fn peek_ready(&self) -> Result<ReadyHandle<'_, T, N>, PipelineError> {
        for _ in 0..self.max_retries {
            let current = self.state.load(Ordering::Acquire);
            let (empty, start, end) = unpack(current);
            debug_assert_indices_in_range!(start, end, N as u16);

            if empty {
                return Err(PipelineError::RingEmpty);
            }

            if self.elements[start as usize].ready.load(Ordering::Acquire) {
                return Ok(ReadyHandle {
                    ring: self,
                    index: start as usize,
                });
            }
        }
        Err(PipelineError::RingMaxRetries)
    }

    /// Advances `start` by one slot, setting `empty = 1` iff the new `start`
    /// equals `end`. Returns `true` on success, `false` if the ring was
    /// empty or the retry budget was exhausted.
    pub fn release_head(&self) -> bool {
        for _ in 0..self.max_retries {
            let current = self.state.load(Ordering::Acquire);
            let (empty, start, end) = unpack(current);
            debug_assert_indices_in_range!(start, end, N as u16);

            if empty {
                return false;
            }

            let new_start = (start + 1) % N as u16;
            let new_empty = new_start == end;
            debug_assert_empty_flag_consistent!(new_empty, new_start, end);
            let new_state = pack(new_empty, new_start, end);

            if self
                .state
                .compare_exchange(current, new_state, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.empty_count.fetch_add(1, Ordering::Acquire);
                return true;
            }
        }
        false
    }
}

/// A reserved-but-unfilled ring slot. Write the payload through
/// [`std::ops::DerefMut`], then call [`Reservation::publish`] to make it
/// visible to consumers.
pub struct Reservation<'a, T, const N: usize> {
    ring: &'a JobRing<T, N>,
    index: usize,
}

impl<'a, T, const N: usize> std::fmt::Debug for Reservation<'a, T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation").field("index", &self.index).finish()
    }
}

impl<'a, T, const N: usize> Reservation<'a, T, N> {
    /// Marks this slot ready, publishing the payload to consumers with a
    /// release store after all writes to it.
    pub fn publish(self) {
        // SAFETY: this index was exclusively reserved for us by the
        // end-advancing CAS in `reserve_empty`; no other producer can write
        // it until the consumer clears `ready` and `start` passes it again.
        self.ring.elements[self.index].ready.store(true, Ordering::Release);
    }
}

impl<'a, T, const N: usize> std::ops::Deref for Reservation<'a, T, N> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: see `publish`.
        unsafe { &*self.ring.elements[self.index].payload.get() }
    }
}

impl<'a, T, const N: usize> std::ops::DerefMut for Reservation<'a, T, N> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `publish`.
        unsafe { &mut *self.ring.elements[self.index].payload.get() }
    }
}

/// A handle to an observed-ready head element, returned by
/// [`JobRing::peek_ready`].
pub struct ReadyHandle<'a, T, const N: usize> {
    ring: &'a JobRing<T, N>,
    index: usize,
}

impl<'a, T, const N: usize> std::fmt::Debug for ReadyHandle<'a, T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyHandle").field("index", &self.index).finish()
    }
}

impl<'a, T, const N: usize> ReadyHandle<'a, T, N> {
    /// Reads the element's payload without consuming it.
    #[must_use]
    pub fn payload(&self) -> &T {
        // SAFETY: `ready == true` was observed with acquire in `peek_ready`,
        // synchronizing with the producer's release store after writing the
        // payload.
        unsafe { &*self.ring.elements[self.index].payload.get() }
    }

    /// Attempts to claim this element for deallocation by CASing `ready`
    /// `true -> false` with `SeqCst` ordering. Returns `true` exactly once
    /// per producer's ready-edge, even if multiple consumers race on it.
    #[must_use]
    pub fn try_consume(&self) -> bool {
        self.ring.elements[self.index]
            .ready
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Advances the ring's head past this element. Should only be called
    /// after a successful [`ReadyHandle::try_consume`].
    #[must_use]
    pub fn release_head(&self) -> bool {
        self.ring.release_head()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips_over_representative_values() {
        for &(empty, start, end) in &[
            (true, 0u16, 0u16),
            (false, 0, 1),
            (false, 499, 0),
            (false, 0x7FFE, 0xFFFE),
            (true, 12345, 12345),
        ] {
            let word = pack(empty, start, end);
            assert_eq!(unpack(word), (empty, start, end));
        }
    }

    #[test]
    fn empty_flag_never_set_with_differing_start_and_end() {
        // The packing function itself cannot produce such a word unless
        // asked to; this pins that pack() is the single source of truth.
        let word = pack(true, 1, 2);
        let (empty, start, end) = unpack(word);
        assert!(empty);
        assert_ne!(start, end);
        // Demonstrates why callers must never construct `pack(true, s, e)`
        // with s != e — the ring's own transitions never do.
    }

    #[derive(Default)]
    struct Payload(u64);

    #[test]
    fn reserve_publish_peek_release_round_trip() {
        let ring: JobRing<Payload, 4> = JobRing::new();
        assert_eq!(ring.empty_count(), 4);

        let mut r = ring.reserve_empty().expect("slot available");
        r.0 = 99;
        r.publish();
        assert_eq!(ring.empty_count(), 3);

        let head = ring.peek_ready().expect("ready element");
        assert_eq!(head.payload().0, 99);
        assert!(head.try_consume());
        assert!(head.release_head());
        assert_eq!(ring.empty_count(), 4);
    }

    #[test]
    fn reserve_on_full_ring_returns_full_without_mutation() {
        let ring: JobRing<Payload, 2> = JobRing::new();
        ring.reserve_empty().unwrap().publish();
        ring.reserve_empty().unwrap().publish();
        assert_eq!(ring.empty_count(), 0);
        assert_eq!(ring.reserve_empty().unwrap_err(), PipelineError::RingFull);
        assert_eq!(ring.empty_count(), 0);
    }

    #[test]
    fn peek_on_empty_ring_returns_empty() {
        let ring: JobRing<Payload, 4> = JobRing::new();
        assert_eq!(ring.peek_ready().unwrap_err(), PipelineError::RingEmpty);
    }

    #[test]
    fn unfilled_reservation_blocks_peek_until_published() {
        let ring: JobRing<Payload, 4> = JobRing::new();
        let reservation = ring.reserve_empty().unwrap();
        // Not published yet: head is reserved-but-unfilled, not ready.
        assert_eq!(ring.peek_ready().unwrap_err(), PipelineError::RingMaxRetries);
        reservation.publish();
        assert!(ring.peek_ready().is_ok());
    }

    #[test]
    fn try_consume_wins_exactly_once_under_racing_consumers() {
        use std::sync::atomic::AtomicUsize as Counter;
        use std::sync::Arc;
        use std::thread;

        let ring: Arc<JobRing<Payload, 4>> = Arc::new(JobRing::new());
        ring.reserve_empty().unwrap().publish();
        let wins = Arc::new(Counter::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let ring = Arc::clone(&ring);
            let wins = Arc::clone(&wins);
            handles.push(thread::spawn(move || {
                // Losing threads may see `ready` already cleared by the
                // winner and exhaust their retry budget; only a genuine
                // win should count.
                if let Ok(head) = ring.peek_ready() {
                    if head.try_consume() {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }
}
