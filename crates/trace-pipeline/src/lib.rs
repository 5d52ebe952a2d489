//! Lock-free job pipeline for a tracing runtime.
//!
//! A trace client writes trace data into shared memory (or keeps it local),
//! then hands a small descriptor of that write — a [`types::JobPayload`] —
//! to a [`job_ring::JobRing`]. A [`job_processor::JobProcessor`] drains the
//! ring once each job's producer has finished writing the chunks it
//! describes, reclaiming shared-memory-backed resources through a
//! caller-supplied deallocator and notifying the owning client through a
//! [`callback_registry::CallbackRegistry`].
//!
//! The building blocks:
//!
//! - [`slot_pool::SlotPool`] — fixed-capacity lock-free pool backing the
//!   registries below.
//! - [`job_ring::JobRing`] — the job queue itself: a single packed atomic
//!   word tracks head, tail and fullness.
//! - [`client_registry::ClientRegistry`] / [`handle_registry::HandleRegistry`]
//!   — map locally generated ids to the remote ids a daemon assigns.
//! - [`callback_registry::CallbackRegistry`] — one completion callback per
//!   client.
//! - [`job_processor::JobProcessor`] — wires the above together.
//!
//! None of this crate touches an actual IPC daemon or shared-memory mapping;
//! those are injected by the caller as plain function values (the
//! deallocator, the shared-memory object classifier) or plain integers
//! (file descriptors, handles).

pub mod callback_registry;
pub mod cancellation;
pub mod client_registry;
pub mod config;
pub mod error;
pub mod handle_registry;
mod invariants;
pub mod job_processor;
pub mod job_ring;
pub mod slot_pool;
pub mod types;

pub use cancellation::CancellationToken;
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use job_processor::JobProcessor;
pub use job_ring::JobRing;
pub use slot_pool::SlotPool;

/// [`job_processor::JobProcessor`] sized with this crate's production
/// defaults (see [`config::defaults`]).
pub type DefaultJobProcessor = JobProcessor<
    { config::defaults::RING_CAPACITY as usize },
    { config::defaults::CLIENT_POOL_CAPACITY },
    { config::defaults::HANDLE_POOL_CAPACITY },
    { config::defaults::CALLBACK_POOL_CAPACITY },
>;
