use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Multi-Order Value Objects
// ============================================================================

/// Status of one restaurant's slice of a multi-restaurant purchase.
/// Sub-orders progress independently of their siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubOrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    PickedUp,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl SubOrderStatus {
    /// Terminal statuses permit no further mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubOrderStatus::Delivered | SubOrderStatus::Cancelled)
    }
}

/// Aggregated status of the parent multi-order. Always derived from the
/// multiset of sub-order statuses (see `aggregator`), except for the two
/// rider-driven transitions and cancellation, which set it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiOrderStatus {
    Pending,
    PartiallyConfirmed,
    AllConfirmed,
    Preparing,
    PartiallyReady,
    AllReady,
    PickingUp,
    PickedUp,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl std::fmt::Display for SubOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubOrderStatus::Pending => "pending",
            SubOrderStatus::Confirmed => "confirmed",
            SubOrderStatus::Preparing => "preparing",
            SubOrderStatus::Ready => "ready",
            SubOrderStatus::PickedUp => "picked_up",
            SubOrderStatus::OnTheWay => "on_the_way",
            SubOrderStatus::Delivered => "delivered",
            SubOrderStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl MultiOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MultiOrderStatus::Delivered | MultiOrderStatus::Cancelled)
    }

    /// Once any pickup activity has begun the order can no longer be
    /// cancelled.
    pub fn pickup_started(&self) -> bool {
        matches!(
            self,
            MultiOrderStatus::PickingUp
                | MultiOrderStatus::PickedUp
                | MultiOrderStatus::OnTheWay
                | MultiOrderStatus::Delivered
        )
    }
}

impl std::fmt::Display for MultiOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MultiOrderStatus::Pending => "pending",
            MultiOrderStatus::PartiallyConfirmed => "partially_confirmed",
            MultiOrderStatus::AllConfirmed => "all_confirmed",
            MultiOrderStatus::Preparing => "preparing",
            MultiOrderStatus::PartiallyReady => "partially_ready",
            MultiOrderStatus::AllReady => "all_ready",
            MultiOrderStatus::PickingUp => "picking_up",
            MultiOrderStatus::PickedUp => "picked_up",
            MultiOrderStatus::OnTheWay => "on_the_way",
            MultiOrderStatus::Delivered => "delivered",
            MultiOrderStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Who is performing an operation. Resolved once at the boundary; never
/// compared as free-form strings inside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Customer,
    Admin,
    RestaurantStaff,
    Rider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

/// Customer-facing order number: `MO-<4-digit-year>-<zero-padded sequence>`,
/// e.g. `MO-2024-0007`. Assigned once at creation, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn new(year: i32, sequence: u32) -> Self {
        Self(format!("MO-{year}-{sequence:04}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One line of a restaurant cart. Prices are in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: i64,
}

/// Pricing breakdown in minor currency units. The aggregate's pricing is an
/// immutable snapshot summed over its sub-orders at creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub discount: i64,
    pub total: i64,
}

impl Pricing {
    /// Sum a set of per-restaurant breakdowns into one aggregate snapshot.
    pub fn combine<'a>(parts: impl IntoIterator<Item = &'a Pricing>) -> Self {
        parts.into_iter().fold(Pricing::default(), |acc, p| Pricing {
            subtotal: acc.subtotal + p.subtotal,
            delivery_fee: acc.delivery_fee + p.delivery_fee,
            discount: acc.discount + p.discount,
            total: acc.total + p.total,
        })
    }
}

/// Append-only record of one observed aggregate status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: MultiOrderStatus,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

/// One rider GPS sample. The location log is unbounded append, no dedup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiderLocation {
    pub lat: f64,
    pub lng: f64,
    pub at: DateTime<Utc>,
}

/// One restaurant's portion of a checkout request.
#[derive(Debug, Clone)]
pub struct RestaurantCart {
    pub restaurant_id: Uuid,
    pub restaurant_name: String,
    pub items: Vec<OrderItem>,
    pub pricing: Pricing,
}

// ============================================================================
// Unit Tests
// ============================================================================
