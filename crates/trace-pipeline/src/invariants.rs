//! Debug assertion macros for the invariants documented on [`crate::slot_pool`]
//! and [`crate::job_ring`].
//!
//! These are only active in debug builds (`#[cfg(debug_assertions)]`), so
//! there is zero overhead in release builds.

// =============================================================================
// INV-POOL-01: Empty count never exceeds capacity
// =============================================================================

/// Assert that a slot pool's observed empty count does not exceed capacity.
macro_rules! debug_assert_empty_count_bounded {
    ($empty:expr, $capacity:expr) => {
        debug_assert!(
            $empty <= $capacity,
            "INV-POOL-01 violated: empty_count {} exceeds capacity {}",
            $empty,
            $capacity
        )
    };
}

// =============================================================================
// INV-RING-01: Packed state indices stay in range
// =============================================================================

/// Assert that `start`/`end` never reach or exceed the ring capacity.
macro_rules! debug_assert_indices_in_range {
    ($start:expr, $end:expr, $capacity:expr) => {
        debug_assert!(
            $start < $capacity && $end < $capacity,
            "INV-RING-01 violated: start {} / end {} out of range for capacity {}",
            $start,
            $end,
            $capacity
        )
    };
}

// =============================================================================
// INV-RING-02: empty flag and start/end agreement
// =============================================================================

/// Assert that `empty == 1` if and only if `start == end`.
macro_rules! debug_assert_empty_flag_consistent {
    ($empty:expr, $start:expr, $end:expr) => {
        debug_assert!(
            $empty == ($start == $end),
            "INV-RING-02 violated: empty={} but start={} end={}",
            $empty,
            $start,
            $end
        )
    };
}

// =============================================================================
// INV-CLIENT-01: local id zero is never assigned to a live record
// =============================================================================

/// Assert that a freshly allocated local client/handle id is not the
/// reserved "invalid" sentinel.
macro_rules! debug_assert_nonzero_local_id {
    ($id:expr) => {
        debug_assert!($id != 0, "INV-CLIENT-01 violated: allocated the reserved invalid id 0")
    };
}

pub(crate) use debug_assert_empty_count_bounded;
pub(crate) use debug_assert_empty_flag_consistent;
pub(crate) use debug_assert_indices_in_range;
pub(crate) use debug_assert_nonzero_local_id;
