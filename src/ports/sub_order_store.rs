use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StoreError;
use crate::domain::multi_order::{OrderItem, PaymentStatus, Pricing, SubOrderStatus};

// ============================================================================
// Sub-Order Store Port
// ============================================================================
//
// One restaurant's slice of a multi-restaurant purchase. Sub-orders are
// owned by the collaborator store; the core reads them, patches them, and
// reacts to their status changes through the facade.
//
// ============================================================================

/// One restaurant's independent order within a multi-order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubOrder {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub restaurant_name: String,
    pub customer_id: Uuid,
    /// Back-reference to the parent; `None` for standalone orders, which the
    /// facade ignores.
    pub multi_order_id: Option<Uuid>,
    pub status: SubOrderStatus,
    pub payment_status: PaymentStatus,
    pub delivery_rider: Option<Uuid>,
    pub items: Vec<OrderItem>,
    pub pricing: Pricing,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub history: Vec<SubOrderHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubOrderHistoryEntry {
    pub status: SubOrderStatus,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Partial update applied to a sub-order. Unset fields are left untouched.
/// A status change appends a history entry carrying `note`.
#[derive(Debug, Clone, Default)]
pub struct SubOrderUpdate {
    pub status: Option<SubOrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub delivery_rider: Option<Uuid>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl SubOrderUpdate {
    pub fn status(status: SubOrderStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[async_trait]
pub trait SubOrderStore: Send + Sync {
    async fn create(&self, sub_order: SubOrder) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<SubOrder, StoreError>;

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<SubOrder>, StoreError>;

    async fn list_by_multi_order(&self, multi_order_id: Uuid) -> Result<Vec<SubOrder>, StoreError>;

    /// Apply one patch and return the updated record.
    async fn update(&self, id: Uuid, update: SubOrderUpdate) -> Result<SubOrder, StoreError>;

    /// All-or-nothing bulk patch: either every update applies or none does.
    /// Cascading multi-entity transitions (rider propagation, cancel-all,
    /// deliver-all) go through this instead of a per-item loop.
    async fn update_all(&self, updates: Vec<(Uuid, SubOrderUpdate)>) -> Result<(), StoreError>;
}
