// ============================================================================
// Collaborator Ports
// ============================================================================
//
// The orchestration core is a library layer: sub-orders, riders, and the
// aggregate itself live in collaborator-owned stores, and notifications /
// realtime events are delivered by collaborator-owned sinks. Each port is an
// async trait injected at construction, never reached through an ambient
// global.
//
// ============================================================================

pub mod multi_order_store;
pub mod notifications;
pub mod rider_directory;
pub mod sub_order_store;

pub use multi_order_store::*;
pub use notifications::*;
pub use rider_directory::*;
pub use sub_order_store::*;

use uuid::Uuid;

/// Infrastructure-level failures from the collaborator stores. Business
/// rules never produce these; they surface through
/// `OrchestrationError::Store` (or `PartialFailure` mid-cascade).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict { id: Uuid, expected: i64, actual: i64 },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: Uuid },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

impl crate::utils::retry::IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. } | StoreError::Unavailable(_))
    }
}
