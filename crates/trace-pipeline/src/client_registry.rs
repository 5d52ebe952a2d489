//! Registry mapping locally generated client ids to the remote trace
//! clients they represent.
//!
//! A trace client registers locally first (getting a local id immediately,
//! usable before the daemon ever replies) and is later reconciled with a
//! remote id once the daemon confirms registration. This split is what lets
//! [`crate::job_processor::JobProcessor`] call back into application code by
//! local id while correlation against ring payloads happens by remote id.
//!
//! Built directly on [`crate::slot_pool::SlotPool`]; local ids are generated
//! independently of slot indices so that a client keeps the same id across
//! any internal compaction of the pool.

use crate::config::defaults::INVALID_CLIENT_ID;
use crate::error::PipelineError;
use crate::invariants::debug_assert_nonzero_local_id;
use crate::slot_pool::SlotPool;
use crate::types::{AppId, BindingType};
use std::sync::atomic::{AtomicU32, Ordering};

/// One registered trace client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    /// Locally generated id, never [`INVALID_CLIENT_ID`] for a live record.
    pub local_id: u8,
    /// Remote id assigned by the daemon once registration completes.
    pub remote_id: Option<u8>,
    pub binding: BindingType,
    pub app_id: AppId,
    /// At most one outstanding error per client; a second `set_pending_error`
    /// overwrites the first, matching a single-slot error cell rather than a
    /// queue.
    pub pending_error: Option<PipelineError>,
}

impl Default for ClientRecord {
    fn default() -> Self {
        Self {
            local_id: INVALID_CLIENT_ID,
            remote_id: None,
            binding: BindingType::Undefined,
            app_id: [0; crate::config::defaults::APP_ID_LENGTH],
            pending_error: None,
        }
    }
}

/// Registry of up to `N` locally-registered trace clients.
pub struct ClientRegistry<const N: usize> {
    pool: SlotPool<ClientRecord, N>,
    next_local_id: AtomicU32,
}

impl<const N: usize> ClientRegistry<N> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: SlotPool::new(),
            next_local_id: AtomicU32::new(0),
        }
    }

    /// Registers a new local client and returns its local id.
    ///
    /// Fails with [`PipelineError::NoMoreSpaceForNewClient`] if the backing
    /// pool has no free slot.
    pub fn register_local(&self, app_id: AppId, binding: BindingType) -> Result<u8, PipelineError> {
        let local_id = self.allocate_local_id();
        let slot = self.pool.acquire().ok_or(PipelineError::NoMoreSpaceForNewClient)?;
        *slot = ClientRecord {
            local_id,
            remote_id: None,
            binding,
            app_id,
            pending_error: None,
        };
        Ok(local_id)
    }

    /// Generates the next local id, skipping the reserved `0` sentinel. Pre-
    /// increments like the registration counter it mirrors, so the first id
    /// ever handed out is `1`.
    fn allocate_local_id(&self) -> u8 {
        loop {
            let id = self.next_local_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1) as u8;
            if id != INVALID_CLIENT_ID {
                debug_assert_nonzero_local_id!(id);
                return id;
            }
        }
    }

    /// Looks up the remote id reconciled for `local_id`, if any.
    pub fn remote_id_for(&self, local_id: u8) -> Result<Option<u8>, PipelineError> {
        self.pool
            .find_if(|r| r.local_id == local_id)
            .map(|r| r.remote_id)
            .ok_or(PipelineError::ClientNotFound)
    }

    /// Looks up the local id reconciled with `remote_id`.
    pub fn local_id_for(&self, remote_id: u8) -> Result<u8, PipelineError> {
        self.pool
            .find_if(|r| r.remote_id == Some(remote_id))
            .map(|r| r.local_id)
            .ok_or(PipelineError::ClientNotFound)
    }

    /// Records the daemon-assigned remote id for a previously registered
    /// local client.
    pub fn set_remote_id(&self, local_id: u8, remote_id: u8) -> Result<(), PipelineError> {
        let record = self
            .pool
            .find_if_mut(|r| r.local_id == local_id)
            .ok_or(PipelineError::ClientNotFound)?;
        record.remote_id = Some(remote_id);
        Ok(())
    }

    /// Sets (overwriting any prior) pending error for `local_id`.
    pub fn set_pending_error(&self, local_id: u8, error: PipelineError) -> Result<(), PipelineError> {
        let record = self
            .pool
            .find_if_mut(|r| r.local_id == local_id)
            .ok_or(PipelineError::ClientNotFound)?;
        record.pending_error = Some(error);
        Ok(())
    }

    /// Takes (clearing) the pending error for `local_id`, if any.
    pub fn take_pending_error(&self, local_id: u8) -> Result<Option<PipelineError>, PipelineError> {
        let record = self
            .pool
            .find_if_mut(|r| r.local_id == local_id)
            .ok_or(PipelineError::ClientNotFound)?;
        Ok(record.pending_error.take())
    }

    /// Deregisters the client with the given local id, freeing its slot.
    pub fn deregister(&self, local_id: u8) -> Result<(), PipelineError> {
        let record = self
            .pool
            .find_if(|r| r.local_id == local_id)
            .ok_or(PipelineError::ClientNotFound)?
            .clone();
        self.pool.release(&record);
        Ok(())
    }

    /// Clears every client's remote-id reconciliation, e.g. after the daemon
    /// connection drops and every client must re-register remotely. Local
    /// ids and registrations survive; only the remote link is reset.
    pub fn invalidate_all_remote(&self) {
        self.pool.for_each_occupied_mut(|r| r.remote_id = None);
    }

    /// Number of free slots remaining.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.pool.empty_count()
    }
}

impl<const N: usize> Default for ClientRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_id(tag: u8) -> AppId {
        let mut id = [0u8; crate::config::defaults::APP_ID_LENGTH];
        id[0] = tag;
        id
    }

    #[test]
    fn register_then_reconcile_remote_id() {
        let registry: ClientRegistry<4> = ClientRegistry::new();
        let local = registry.register_local(app_id(1), BindingType::LoLa).unwrap();
        assert_ne!(local, INVALID_CLIENT_ID);
        assert_eq!(registry.remote_id_for(local).unwrap(), None);

        registry.set_remote_id(local, 42).unwrap();
        assert_eq!(registry.remote_id_for(local).unwrap(), Some(42));
        assert_eq!(registry.local_id_for(42).unwrap(), local);
    }

    #[test]
    fn successive_registrations_get_distinct_local_ids() {
        let registry: ClientRegistry<4> = ClientRegistry::new();
        let a = registry.register_local(app_id(1), BindingType::LoLa).unwrap();
        let b = registry.register_local(app_id(2), BindingType::Vector).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn lookup_of_unknown_local_id_is_client_not_found() {
        let registry: ClientRegistry<4> = ClientRegistry::new();
        assert_eq!(registry.remote_id_for(200).unwrap_err(), PipelineError::ClientNotFound);
    }

    #[test]
    fn register_on_full_registry_fails() {
        let registry: ClientRegistry<1> = ClientRegistry::new();
        registry.register_local(app_id(1), BindingType::LoLa).unwrap();
        assert_eq!(
            registry.register_local(app_id(2), BindingType::LoLa).unwrap_err(),
            PipelineError::NoMoreSpaceForNewClient
        );
    }

    #[test]
    fn deregister_frees_the_slot_for_reuse() {
        let registry: ClientRegistry<1> = ClientRegistry::new();
        let local = registry.register_local(app_id(1), BindingType::LoLa).unwrap();
        registry.deregister(local).unwrap();
        assert_eq!(registry.free_slots(), 1);
        registry.register_local(app_id(2), BindingType::Vector).unwrap();
    }

    #[test]
    fn invalidate_all_remote_clears_reconciliation_but_keeps_registrations() {
        let registry: ClientRegistry<4> = ClientRegistry::new();
        let a = registry.register_local(app_id(1), BindingType::LoLa).unwrap();
        registry.set_remote_id(a, 7).unwrap();
        registry.invalidate_all_remote();
        assert_eq!(registry.remote_id_for(a).unwrap(), None);
    }

    #[test]
    fn pending_error_is_single_slot_overwritten_by_latest() {
        let registry: ClientRegistry<4> = ClientRegistry::new();
        let local = registry.register_local(app_id(1), BindingType::LoLa).unwrap();
        registry.set_pending_error(local, PipelineError::RingFull).unwrap();
        registry.set_pending_error(local, PipelineError::RingEmpty).unwrap();
        assert_eq!(registry.take_pending_error(local).unwrap(), Some(PipelineError::RingEmpty));
        assert_eq!(registry.take_pending_error(local).unwrap(), None);
    }
}
