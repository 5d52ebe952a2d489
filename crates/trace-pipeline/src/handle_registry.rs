//! Registry mapping locally registered shared-memory objects to the handles
//! a remote daemon assigns them.
//!
//! Mirrors [`crate::client_registry::ClientRegistry`]'s split-registration
//! shape: a shared-memory object is registered locally (by file descriptor)
//! immediately, and reconciled with a remote handle once the daemon
//! confirms it. Jobs of kind [`crate::types::JobKind::Shared`] carry a
//! remote handle that this registry resolves back to the originating file
//! descriptor for deallocation.

use crate::config::defaults::INVALID_SHM_HANDLE;
use crate::error::PipelineError;
use crate::slot_pool::SlotPool;

/// One registered shared-memory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShmHandleRecord {
    /// Local file descriptor backing the object.
    pub file_descriptor: i32,
    /// Remote handle assigned by the daemon, or [`INVALID_SHM_HANDLE`] until
    /// reconciled.
    pub remote_handle: i32,
    /// Whether the shared-memory object classifier collaborator reported
    /// this descriptor as typed memory at registration time.
    pub is_typed_memory: bool,
}

impl Default for ShmHandleRecord {
    fn default() -> Self {
        Self {
            file_descriptor: -1,
            remote_handle: INVALID_SHM_HANDLE,
            is_typed_memory: false,
        }
    }
}

impl ShmHandleRecord {
    fn is_registered(&self) -> bool {
        self.file_descriptor >= 0
    }
}

/// Registry of up to `N` locally-registered shared-memory objects.
pub struct HandleRegistry<const N: usize> {
    pool: SlotPool<ShmHandleRecord, N>,
}

impl<const N: usize> HandleRegistry<N> {
    #[must_use]
    pub fn new() -> Self {
        Self { pool: SlotPool::new() }
    }

    /// Registers `file_descriptor` as a new local shared-memory object,
    /// unreconciled until [`HandleRegistry::set_remote_handle`] is called.
    ///
    /// Fails with [`PipelineError::NoMoreSpaceForNewShmObject`] if full, or
    /// [`PipelineError::InvalidShmObjectHandle`] if `file_descriptor` is
    /// already registered.
    pub fn register_local(&self, file_descriptor: i32) -> Result<(), PipelineError> {
        self.register_local_classified(file_descriptor, false)
    }

    /// As [`HandleRegistry::register_local`], additionally recording whether
    /// the object was classified as typed memory.
    pub fn register_local_classified(&self, file_descriptor: i32, is_typed_memory: bool) -> Result<(), PipelineError> {
        if self.is_registered(file_descriptor) {
            return Err(PipelineError::InvalidShmObjectHandle);
        }
        let slot = self.pool.acquire().ok_or(PipelineError::NoMoreSpaceForNewShmObject)?;
        *slot = ShmHandleRecord {
            file_descriptor,
            remote_handle: INVALID_SHM_HANDLE,
            is_typed_memory,
        };
        Ok(())
    }

    /// Returns whether `file_descriptor` was classified as typed memory at
    /// registration.
    pub fn is_typed_memory(&self, file_descriptor: i32) -> Result<bool, PipelineError> {
        self.pool
            .find_if(|r| r.is_registered() && r.file_descriptor == file_descriptor)
            .map(|r| r.is_typed_memory)
            .ok_or(PipelineError::InvalidShmObjectHandle)
    }

    /// Returns `true` if `file_descriptor` already has a local registration.
    #[must_use]
    pub fn is_registered(&self, file_descriptor: i32) -> bool {
        self.pool
            .find_if(|r| r.is_registered() && r.file_descriptor == file_descriptor)
            .is_some()
    }

    /// Records the daemon-assigned remote handle for a registered
    /// descriptor.
    pub fn set_remote_handle(&self, file_descriptor: i32, remote_handle: i32) -> Result<(), PipelineError> {
        let record = self
            .pool
            .find_if_mut(|r| r.is_registered() && r.file_descriptor == file_descriptor)
            .ok_or(PipelineError::InvalidShmObjectHandle)?;
        record.remote_handle = remote_handle;
        Ok(())
    }

    /// Resolves a remote handle back to the local file descriptor that
    /// registered it.
    pub fn file_descriptor_for(&self, remote_handle: i32) -> Result<i32, PipelineError> {
        self.pool
            .find_if(|r| r.is_registered() && r.remote_handle == remote_handle)
            .map(|r| r.file_descriptor)
            .ok_or(PipelineError::InvalidShmObjectHandle)
    }

    /// Deregisters the object backed by `file_descriptor`, freeing its slot.
    pub fn deregister_local(&self, file_descriptor: i32) -> Result<(), PipelineError> {
        let record = self
            .pool
            .find_if(|r| r.is_registered() && r.file_descriptor == file_descriptor)
            .copied()
            .ok_or(PipelineError::InvalidShmObjectHandle)?;
        self.pool.release(&record);
        Ok(())
    }

    /// Clears every object's remote-handle reconciliation, keeping local
    /// registrations intact. Used when the daemon connection is lost.
    pub fn invalidate_all_remote(&self) {
        self.pool.for_each_occupied_mut(|r| r.remote_handle = INVALID_SHM_HANDLE);
    }

    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.pool.empty_count()
    }
}

impl<const N: usize> Default for HandleRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}
