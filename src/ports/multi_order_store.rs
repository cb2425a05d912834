use async_trait::async_trait;
use uuid::Uuid;

use super::StoreError;
use crate::domain::multi_order::MultiOrderAggregate;

// ============================================================================
// Multi-Order Store Port
// ============================================================================
//
// Versioned persistence for the aggregate. `update` is the serialization
// point for concurrent writers: it compares the caller's expected version
// against the stored one and fails with `VersionConflict` when stale. The
// orchestration layer retries conflicts against freshly loaded state, so
// two sub-orders transitioning at the same instant can never publish an
// aggregate computed from a partial view.
//
// ============================================================================

#[async_trait]
pub trait MultiOrderStore: Send + Sync {
    async fn insert(&self, aggregate: MultiOrderAggregate) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<MultiOrderAggregate, StoreError>;

    /// Write the aggregate if the stored version still equals
    /// `expected_version`. Returns the new version on success.
    async fn update(
        &self,
        aggregate: &MultiOrderAggregate,
        expected_version: i64,
    ) -> Result<i64, StoreError>;

    /// Next value of the per-year order-number sequence. Monotonic and
    /// never reused within a year.
    async fn next_sequence(&self, year: i32) -> Result<u32, StoreError>;
}
