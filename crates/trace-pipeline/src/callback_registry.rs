//! Small registry of per-client completion callbacks.
//!
//! [`crate::job_processor::JobProcessor`] invokes a client's callback when a
//! job that originated from it is fully deallocated. A client may register
//! at most one callback; re-registering without deregistering first is
//! rejected rather than silently replacing it, since a silent replace would
//! usually indicate a caller bug (double `save_callback`) rather than intent.

use crate::error::PipelineError;
use crate::slot_pool::SlotPool;

/// A client's completion callback: invoked with the `context_id` of the
/// trace request that just finished.
pub type CompletionCallback = Box<dyn Fn(u32) + Send + Sync>;

struct CallbackRecord {
    local_client_id: u8,
    callback: Option<CompletionCallback>,
}

impl Default for CallbackRecord {
    fn default() -> Self {
        Self {
            local_client_id: crate::config::defaults::INVALID_CLIENT_ID,
            callback: None,
        }
    }
}

/// Registry of up to `N` per-client completion callbacks.
pub struct CallbackRegistry<const N: usize> {
    pool: SlotPool<CallbackRecord, N>,
}

impl<const N: usize> CallbackRegistry<N> {
    #[must_use]
    pub fn new() -> Self {
        Self { pool: SlotPool::new() }
    }

    /// Registers `callback` for `local_client_id`.
    ///
    /// Fails with [`PipelineError::InvalidArgument`] if `callback` is `None`,
    /// [`PipelineError::CallbackAlreadyRegistered`] if one is already
    /// registered for this client, or
    /// [`PipelineError::NoFreeSlotToSaveCallback`] if the registry is full.
    pub fn save_callback(&self, local_client_id: u8, callback: Option<CompletionCallback>) -> Result<(), PipelineError> {
        let callback = callback.ok_or(PipelineError::InvalidArgument)?;
        if self.pool.find_if(|r| r.local_client_id == local_client_id).is_some() {
            return Err(PipelineError::CallbackAlreadyRegistered);
        }
        let slot = self.pool.acquire().ok_or(PipelineError::NoFreeSlotToSaveCallback)?;
        *slot = CallbackRecord {
            local_client_id,
            callback: Some(callback),
        };
        Ok(())
    }

    /// Invokes the callback registered for `local_client_id` with
    /// `context_id`, if one is registered. Returns `false` (and does
    /// nothing) if no callback is registered for that client — a miss here
    /// is routine (a local-only job has no registered client callback), not
    /// an error.
    pub fn call(&self, local_client_id: u8, context_id: u32) -> bool {
        match self.pool.find_if(|r| r.local_client_id == local_client_id) {
            Some(record) => {
                if let Some(callback) = &record.callback {
                    callback(context_id);
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Deregisters and drops the callback for `local_client_id`, if any.
    pub fn remove(&self, local_client_id: u8) {
        self.pool.take_if(|r| r.local_client_id == local_client_id);
    }

    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.pool.empty_count()
    }
}

impl<const N: usize> Default for CallbackRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}
