//! Correlation-aware consumer of the job ring.
//!
//! `JobProcessor` owns a [`JobRing`], the three registries, and a
//! caller-supplied deallocator. [`JobProcessor::process_jobs`] only reclaims
//! a ready job once it can prove the producer has finished writing the trace
//! chunks that job refers to; [`JobProcessor::clean_pending_jobs`] skips that
//! proof and drains everything, for use during teardown when no producer is
//! going to advance `finished_context_id` any further.

use crate::callback_registry::{CallbackRegistry, CompletionCallback};
use crate::cancellation::CancellationToken;
use crate::client_registry::ClientRegistry;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::handle_registry::HandleRegistry;
use crate::job_ring::{JobRing, ReadyHandle};
use crate::types::{AppId, BindingType, JobKind, JobPayload};
use std::sync::atomic::Ordering;
use std::sync::RwLock;

/// Reclaims the shared-memory-backed resources behind a job's payload.
/// Called exactly once per job, before its completion callback (if any).
pub type Deallocator = Box<dyn Fn(&JobPayload) -> Result<(), PipelineError> + Send + Sync>;

/// Classifies a file descriptor as typed memory or not, ahead of
/// registering it. An external collaborator: this crate only records the
/// answer, it does not compute it.
pub type ShmClassifier = Box<dyn Fn(i32) -> Result<bool, PipelineError> + Send + Sync>;

/// Coordinates the job ring with client/handle/callback registries.
///
/// `RING_N`, `CLIENT_N`, `HANDLE_N` and `CALLBACK_N` are the backing
/// capacities; see [`crate::config::defaults`] for the production values.
pub struct JobProcessor<const RING_N: usize, const CLIENT_N: usize, const HANDLE_N: usize, const CALLBACK_N: usize> {
    ring: JobRing<JobPayload, RING_N>,
    clients: ClientRegistry<CLIENT_N>,
    handles: HandleRegistry<HANDLE_N>,
    callbacks: CallbackRegistry<CALLBACK_N>,
    deallocator: RwLock<Option<Deallocator>>,
    shm_classifier: RwLock<Option<ShmClassifier>>,
    cancellation: CancellationToken,
    cas_max_retries: u32,
}

impl<const RING_N: usize, const CLIENT_N: usize, const HANDLE_N: usize, const CALLBACK_N: usize> Default
    for JobProcessor<RING_N, CLIENT_N, HANDLE_N, CALLBACK_N>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const RING_N: usize, const CLIENT_N: usize, const HANDLE_N: usize, const CALLBACK_N: usize>
    JobProcessor<RING_N, CLIENT_N, HANDLE_N, CALLBACK_N>
{
    #[must_use]
    pub fn new() -> Self {
        Self::with_cas_max_retries(crate::config::defaults::CAS_MAX_RETRIES)
    }

    /// Builds a processor from an explicit [`PipelineConfig`].
    #[must_use]
    pub fn with_config(config: PipelineConfig) -> Self {
        Self::with_cas_max_retries(config.cas_max_retries)
    }

    #[must_use]
    pub fn with_cas_max_retries(cas_max_retries: u32) -> Self {
        Self {
            ring: JobRing::with_max_retries(cas_max_retries),
            clients: ClientRegistry::new(),
            handles: HandleRegistry::new(),
            callbacks: CallbackRegistry::new(),
            deallocator: RwLock::new(None),
            shm_classifier: RwLock::new(None),
            cancellation: CancellationToken::new(),
            cas_max_retries,
        }
    }

    /// Registers a new local trace client. See
    /// [`ClientRegistry::register_local`].
    pub fn register_client(&self, app_id: AppId, binding: BindingType) -> Result<u8, PipelineError> {
        self.clients.register_local(app_id, binding)
    }

    /// Installs the shared-memory object classifier collaborator, queried
    /// by [`JobProcessor::register_shm_object`] for every new descriptor.
    pub fn set_shm_classifier(&self, classifier: ShmClassifier) {
        *self.shm_classifier.write().expect("classifier lock poisoned") = Some(classifier);
    }

    /// Registers a new local shared-memory object, consulting the
    /// classifier collaborator (if installed) to record whether the
    /// descriptor is typed memory. See [`HandleRegistry::register_local`].
    pub fn register_shm_object(&self, file_descriptor: i32) -> Result<(), PipelineError> {
        let is_typed_memory = match self.shm_classifier.read().expect("classifier lock poisoned").as_deref() {
            Some(classifier) => classifier(file_descriptor)?,
            None => false,
        };
        self.handles.register_local_classified(file_descriptor, is_typed_memory)
    }

    /// Deregisters a previously registered shared-memory object. See
    /// [`HandleRegistry::deregister_local`].
    pub fn deregister_shm_object(&self, file_descriptor: i32) -> Result<(), PipelineError> {
        self.handles.deregister_local(file_descriptor)
    }

    /// Registers a completion callback for a local client. See
    /// [`CallbackRegistry::save_callback`]. Fails with
    /// [`PipelineError::InvalidArgument`] if `callback` is `None`.
    pub fn save_callback(&self, local_client_id: u8, callback: Option<CompletionCallback>) -> Result<(), PipelineError> {
        self.callbacks.save_callback(local_client_id, callback)
    }

    /// Records the remote id a daemon assigned to a previously registered
    /// local client. `process_jobs` needs this reconciliation to route a
    /// shared-memory job's completion back to the client that submitted it.
    pub fn reconcile_remote_client(&self, local_client_id: u8, remote_client_id: u8) -> Result<(), PipelineError> {
        self.clients.set_remote_id(local_client_id, remote_client_id)
    }

    /// Installs (replacing any previous) the deallocator used to reclaim
    /// jobs' shared-memory-backed resources.
    pub fn set_deallocator(&self, deallocator: Deallocator) {
        *self.deallocator.write().expect("deallocator lock poisoned") = Some(deallocator);
    }

    /// A token the caller can hold onto and cancel from another thread to
    /// stop [`JobProcessor::run_until_cancelled`] promptly.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Requests that [`JobProcessor::run_until_cancelled`] stop.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Reserves a ring slot, writes `payload` into it and publishes it for
    /// consumption.
    pub fn submit(&self, payload: JobPayload) -> Result<(), PipelineError> {
        let mut reservation = self.ring.reserve_empty()?;
        *reservation = payload;
        reservation.publish();
        Ok(())
    }

    /// Drains jobs from the head of the ring as long as each one's producer
    /// has already finished writing the trace chunks it refers to. Stops
    /// (without error) the moment it finds a job whose producer has not yet
    /// caught up — that job, and everything behind it, is left for a later
    /// call. Also stops promptly, without error, once
    /// [`JobProcessor::cancellation_token`] is cancelled — the sweep loop and
    /// every bounded CAS retry inside [`JobProcessor::deallocate`] poll it.
    ///
    /// Returns the number of jobs reclaimed.
    pub fn process_jobs(&self) -> Result<usize, PipelineError> {
        tracing::debug!("process_jobs: starting sweep");
        let mut reclaimed = 0usize;
        loop {
            if self.cancellation.is_cancelled() {
                break;
            }
            let head = match self.ring.peek_ready() {
                Ok(head) => head,
                Err(PipelineError::RingEmpty) => break,
                Err(err) => {
                    tracing::warn!(?err, "process_jobs: stopping sweep early");
                    return Err(err);
                }
            };

            let finished = head.payload().finished_context_id.load(Ordering::Acquire);
            if finished == head.payload().original.context_id {
                // The producer has not moved past this job's own context
                // yet, so its write may still be in flight. Stop here;
                // everything behind it is even newer.
                break;
            }

            self.deallocate(&head)?;
            reclaimed += 1;
        }
        tracing::debug!(reclaimed, "process_jobs: sweep complete");
        Ok(reclaimed)
    }

    /// Unconditionally drains every ready job, ignoring the
    /// producer-caught-up check [`JobProcessor::process_jobs`] applies.
    /// Intended for teardown, where no producer will advance
    /// `finished_context_id` further.
    pub fn clean_pending_jobs(&self) -> Result<usize, PipelineError> {
        let mut drained = 0usize;
        loop {
            match self.ring.peek_ready() {
                Ok(head) => {
                    self.deallocate(&head)?;
                    drained += 1;
                }
                Err(PipelineError::RingEmpty) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(drained)
    }

    /// Runs [`JobProcessor::process_jobs`] in a loop, calling `on_idle`
    /// whenever a sweep reclaims nothing, until
    /// [`JobProcessor::cancellation_token`] is cancelled or a fatal error is
    /// hit.
    pub fn run_until_cancelled(&self, mut on_idle: impl FnMut()) {
        while !self.cancellation.is_cancelled() {
            match self.process_jobs() {
                Ok(0) => on_idle(),
                Ok(_) => {}
                Err(err) if err.is_recoverable() => {}
                Err(err) => {
                    tracing::error!(?err, "run_until_cancelled: terminating on fatal error");
                    break;
                }
            }
        }
    }

    fn deallocate(&self, head: &ReadyHandle<'_, JobPayload, RING_N>) -> Result<(), PipelineError> {
        let mut won = false;
        for _ in 0..self.cas_max_retries {
            if self.cancellation.is_cancelled() {
                break;
            }
            if head.try_consume() {
                won = true;
                break;
            }
        }
        if !won {
            return Err(PipelineError::RingMaxRetries);
        }

        let payload = head.payload().clone();
        {
            let guard = self.deallocator.read().expect("deallocator lock poisoned");
            match guard.as_deref() {
                Some(deallocator) => deallocator(&payload)?,
                None => return Err(PipelineError::NoDeallocatorCallbackRegistered),
            }
        }

        if payload.kind == JobKind::Shared {
            self.call_client_callback(&payload);
        }

        for _ in 0..self.cas_max_retries {
            if self.cancellation.is_cancelled() {
                break;
            }
            if head.release_head() {
                return Ok(());
            }
        }
        Err(PipelineError::RingMaxRetries)
    }

    fn call_client_callback(&self, payload: &JobPayload) {
        let Ok(local_id) = self.clients.local_id_for(payload.original.client_id) else {
            tracing::trace!(client_id = payload.original.client_id, "no local client for remote id");
            return;
        };
        if !self.callbacks.call(local_id, payload.original.context_id) {
            tracing::trace!(local_id, "no completion callback registered");
        }
    }
}
