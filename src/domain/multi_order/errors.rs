use uuid::Uuid;

use super::value_objects::MultiOrderStatus;
use crate::ports::StoreError;
use crate::utils::retry::IsTransient;

// ============================================================================
// Orchestration Business Rule Errors
// ============================================================================
//
// Every variant except `Store` is an expected, recoverable business error:
// it is returned to the collaborator layer as a typed value so the
// presentation layer can render a precise message. `Store` carries
// infrastructure faults from the underlying collaborator stores.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("{0}")]
    Authorization(String),

    #[error("Operation not allowed while order is {status:?}")]
    InvalidState { status: MultiOrderStatus },

    #[error("Cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: MultiOrderStatus,
        to: MultiOrderStatus,
    },

    #[error("{0}")]
    Precondition(String),

    #[error("The 2-minute modification window for this order has passed")]
    WindowExpired,

    #[error("{0}")]
    Conflict(String),

    #[error("Cascade applied partially: {completed} succeeded, {failed} failed: {source}")]
    PartialFailure {
        completed: &'static str,
        failed: &'static str,
        #[source]
        source: Box<OrchestrationError>,
    },

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl IsTransient for OrchestrationError {
    fn is_transient(&self) -> bool {
        match self {
            // A lost version race is retried against fresh state; every
            // business error is final.
            OrchestrationError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl OrchestrationError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Convert a store lookup failure into the business-level `NotFound`;
    /// every other store fault stays infrastructure-level.
    pub fn lookup(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Store(other),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}
