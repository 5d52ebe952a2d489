//! Error taxonomy for the tracing pipeline.
//!
//! Every fallible operation in this crate returns a [`PipelineError`]. Variants
//! are tagged recoverable or fatal in their doc comment and via
//! [`PipelineError::is_recoverable`]: recoverable means the caller may retry
//! or ignore the failed attempt with no side effects beyond it; fatal means
//! the current operation (and usually the owning subsystem) must be torn
//! down.

use thiserror::Error;

/// Errors produced by the slot pools, job ring, registries and processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipelineError {
    // --- SlotPool / registries -------------------------------------------------
    /// A registry's backing `SlotPool` has no free slot for a new registration.
    #[error("no more space for a new client")]
    NoMoreSpaceForNewClient,

    /// A registry's backing `SlotPool` has no free slot for a new shared-memory
    /// handle registration.
    #[error("no more space for a new shared-memory object")]
    NoMoreSpaceForNewShmObject,

    /// No record matches the requested remote id.
    #[error("client not found for the given remote id")]
    ClientNotFound,

    /// A shared-memory handle lookup found no local registration, or the
    /// record's remote handle has not yet been assigned.
    #[error("shared-memory handle is invalid or unregistered")]
    InvalidShmObjectHandle,

    // --- Shared-memory object classifier collaborator -----------------------
    /// The file descriptor passed to the shared-memory classifier was not
    /// valid.
    #[error("bad file descriptor passed to the shared-memory classifier")]
    BadFileDescriptor,

    /// The classifier could not retrieve the object's memory-type flags.
    #[error("failed to retrieve shared-memory object flags")]
    SharedMemoryObjectFlagsRetrievalFailed,

    // --- JobRing -----------------------------------------------------------
    /// `JobRing::reserve_empty` observed a full ring.
    #[error("job ring is full")]
    RingFull,

    /// `JobRing::peek_ready` observed an empty ring.
    #[error("job ring is empty")]
    RingEmpty,

    /// A bounded CAS retry loop exhausted its attempts under contention.
    #[error("job ring operation exceeded its retry budget")]
    RingMaxRetries,

    // --- JobProcessor / CallbackRegistry ------------------------------------
    /// `save_callback` was called with an empty/no-op callback.
    #[error("invalid argument: callback must not be empty")]
    InvalidArgument,

    /// `save_callback` was called twice for the same local client id.
    #[error("a completion callback is already registered for this client")]
    CallbackAlreadyRegistered,

    /// The `CallbackRegistry`'s backing `SlotPool` is full.
    #[error("no free slot available to save the callback")]
    NoFreeSlotToSaveCallback,

    /// `process_jobs`/`clean_pending_jobs` ran with no deallocator configured.
    #[error("no deallocator callback has been registered")]
    NoDeallocatorCallbackRegistered,

    /// The caller-supplied deallocator returned an error while reclaiming a
    /// job's shared-memory-backed payload.
    #[error("deallocation of a job's payload failed")]
    DeallocationFailed,
}

impl PipelineError {
    /// Returns `true` if the caller may retry or ignore the failed attempt;
    /// `false` if the current operation (and usually the owning subsystem)
    /// must be torn down.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::ClientNotFound
                | Self::RingFull
                | Self::RingEmpty
                | Self::RingMaxRetries
                | Self::CallbackAlreadyRegistered
                | Self::NoFreeSlotToSaveCallback
        )
    }

    /// Returns `true` if this error indicates the operation cannot succeed
    /// without external intervention (tearing down the subsystem).
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        !self.is_recoverable()
    }
}
