//! Compile-time capacities and runtime tunables for the pipeline.
//!
//! Pool and ring sizes are carried as const generics on the data structures
//! themselves (`SlotPool<T, N>`, `JobRing<T, N>`); the constants here are the
//! concrete values this library's type aliases use, and the one genuinely
//! runtime-configurable knob (`cas_max_retries`) lives on [`PipelineConfig`].

/// Named constants making up the pipeline's public contract.
pub mod defaults {
    /// Capacity of the job ring (`JobRing`).
    pub const RING_CAPACITY: u16 = 500;
    /// Capacity of the client registry's backing slot pool.
    pub const CLIENT_POOL_CAPACITY: usize = 20;
    /// Capacity of the shared-memory handle registry's backing slot pool.
    pub const HANDLE_POOL_CAPACITY: usize = 200;
    /// Capacity of the completion-callback registry's backing slot pool.
    pub const CALLBACK_POOL_CAPACITY: usize = 10;
    /// Maximum number of shared-memory chunks referenced by one trace request.
    pub const MAX_CHUNKS_PER_TRACE_REQUEST: u8 = 10;
    /// Default bound on CAS retry loops before giving up with a recoverable error.
    pub const CAS_MAX_RETRIES: u32 = 10;
    /// Path of the shared-memory object backing the ring in production.
    pub const RING_BUFFER_SHM_PATH: &str = "/dev_shmem";
    /// Fixed width, in bytes, of an application identifier.
    pub const APP_ID_LENGTH: usize = 8;
    /// Alignment, in bytes, used for cache-line-sized pool/ring elements.
    pub const CACHE_LINE_ALIGNMENT: usize = 64;
    /// Reserved local client id meaning "invalid"/"unassigned".
    pub const INVALID_CLIENT_ID: u8 = 0;
    /// Reserved handle value meaning "invalid"/"unassigned".
    pub const INVALID_SHM_HANDLE: i32 = -1;
}

/// Runtime-tunable knobs for the pipeline.
///
/// Pool/ring capacities are const generics on the data structures and are not
/// part of this struct; this only covers the retry budget shared by every
/// bounded CAS loop in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of CAS attempts a retry loop makes before giving up with a
    /// recoverable "max retries" error.
    pub cas_max_retries: u32,
}

impl PipelineConfig {
    /// Creates a new configuration.
    ///
    /// # Panics
    ///
    /// Panics if `cas_max_retries` is zero — a retry loop that never retries
    /// is a misconfiguration, not a valid (if extreme) tuning choice.
    #[must_use]
    pub const fn new(cas_max_retries: u32) -> Self {
        assert!(cas_max_retries > 0, "cas_max_retries must be at least 1");
        Self { cas_max_retries }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cas_max_retries: defaults::CAS_MAX_RETRIES,
        }
    }
}
