//! Small value types shared between the registries, the job ring and the
//! job processor.

use crate::config::defaults::APP_ID_LENGTH;

/// Transport binding a trace client registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingType {
    /// LoLa (Local/Lola) IPC binding.
    LoLa,
    /// Vector binding without zero-copy support.
    Vector,
    /// Vector binding with zero-copy shared-memory support.
    VectorZeroCopy,
    /// No binding has been negotiated yet.
    #[default]
    Undefined,
}

/// Fixed-width application identifier.
pub type AppId = [u8; APP_ID_LENGTH];

/// Identifies one trace request: the client that issued it and a
/// per-client-monotonic context number. Ordered lexicographically by
/// `client_id` then `context_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct GlobalContextId {
    pub client_id: u8,
    pub context_id: u32,
}

impl GlobalContextId {
    #[must_use]
    pub const fn new(client_id: u8, context_id: u32) -> Self {
        Self { client_id, context_id }
    }
}

/// Where a job's payload physically lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobKind {
    /// Payload lives in process-local memory.
    #[default]
    Local,
    /// Payload lives in a registered shared-memory object.
    Shared,
}

/// Shared-memory location of a job's payload. Meaningful only when the
/// owning job's `kind` is [`JobKind::Shared`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SharedMemLocation {
    pub handle: i32,
    pub offset: usize,
}

/// One job riding the job ring.
///
/// `finished_context_id` is the cell the producer bumps as it finishes
/// writing trace chunks for a client, shared (via `Arc`) between every job
/// that client has in flight. [`crate::job_processor::JobProcessor`] compares
/// it against `original.context_id` to tell a job that is safe to reclaim
/// from one still being written.
#[derive(Debug, Clone, Default)]
pub struct JobPayload {
    pub finished_context_id: std::sync::Arc<std::sync::atomic::AtomicU32>,
    pub original: GlobalContextId,
    pub kind: JobKind,
    pub location: SharedMemLocation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_context_id_orders_by_client_then_context() {
        let a = GlobalContextId::new(1, 100);
        let b = GlobalContextId::new(1, 200);
        let c = GlobalContextId::new(2, 0);
        assert!(a < b);
        assert!(b < c);
        assert!(a < c);
    }

    #[test]
    fn binding_type_defaults_to_undefined() {
        assert_eq!(BindingType::default(), BindingType::Undefined);
    }

    #[test]
    fn job_kind_defaults_to_local() {
        assert_eq!(JobKind::default(), JobKind::Local);
    }
}
