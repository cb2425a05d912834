use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StoreError;
use crate::domain::multi_order::OrderNumber;

// ============================================================================
// Rider Directory Port
// ============================================================================

/// A courier account. The directory only holds delivery-role accounts; role
/// resolution happens at the collaborator boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub online: bool,
    /// Order number of the multi-order this rider is currently working,
    /// if any. One assignment at a time.
    pub current_assignment: Option<OrderNumber>,
    pub completed_orders: u64,
}

impl Rider {
    pub fn is_available(&self) -> bool {
        self.online && self.current_assignment.is_none()
    }
}

#[async_trait]
pub trait RiderDirectory: Send + Sync {
    /// Look up a rider that is currently available for assignment.
    /// An offline or unknown rider is a `NotFound`.
    async fn find_available(&self, id: Uuid) -> Result<Rider, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Rider, StoreError>;

    /// Set or clear the rider's current-assignment marker.
    async fn set_current_assignment(
        &self,
        rider_id: Uuid,
        label: Option<OrderNumber>,
    ) -> Result<(), StoreError>;

    /// Bump the rider's completed-order counter by `n` (one per sub-order
    /// on delivery).
    async fn increment_completed_orders(&self, rider_id: Uuid, n: u64) -> Result<(), StoreError>;
}
