use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrchestrationError;
use super::pickup::PickupTracker;
use super::value_objects::{
    ActorRole, MultiOrderStatus, OrderNumber, Pricing, RiderLocation, StatusHistoryEntry,
};

// ============================================================================
// Multi-Order Aggregate - Domain Logic
// ============================================================================
//
// The parent entity coordinating N independently-progressing restaurant
// sub-orders: rider assignment, cancellation window, pricing snapshot,
// pickup tracking, and the append-only status history.
//
// The sub-order set is fixed at creation; restaurants cannot be added or
// removed after checkout. The aggregated status is always derived from the
// sub-order statuses (see `aggregator`), except for the explicit
// rider-driven transitions and cancellation.
//
// ============================================================================

/// Customer-initiated cancellation is only accepted this long after
/// creation.
pub const CANCELLATION_WINDOW_SECS: i64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiOrderAggregate {
    // Identity
    pub id: Uuid,
    pub order_number: OrderNumber,
    pub version: i64,

    // Ownership and composition (fixed at creation)
    pub customer_id: Uuid,
    pub sub_orders: Vec<Uuid>,

    // Current state
    pub status: MultiOrderStatus,
    pub primary_rider: Option<Uuid>,
    pub pickup: PickupTracker,

    // Immutable pricing snapshot
    pub pricing: Pricing,

    // Audit trail
    pub status_history: Vec<StatusHistoryEntry>,
    pub rider_location_history: Vec<RiderLocation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
}

impl MultiOrderAggregate {
    /// Create a fresh aggregate at `pending` with one pickup entry per
    /// sub-order. `sub_orders` pairs each sub-order id with its restaurant.
    pub fn new(
        order_number: OrderNumber,
        customer_id: Uuid,
        sub_orders: Vec<(Uuid, Uuid)>,
        pricing: Pricing,
        now: DateTime<Utc>,
    ) -> Self {
        let sub_order_ids = sub_orders.iter().map(|(id, _)| *id).collect();
        let pickup = PickupTracker::new(sub_orders);

        Self {
            id: Uuid::new_v4(),
            order_number,
            version: 0,
            customer_id,
            sub_orders: sub_order_ids,
            status: MultiOrderStatus::Pending,
            primary_rider: None,
            pickup,
            pricing,
            status_history: vec![StatusHistoryEntry {
                status: MultiOrderStatus::Pending,
                at: now,
                note: Some("Order placed".to_string()),
            }],
            rider_location_history: Vec::new(),
            created_at: now,
            updated_at: now,
            actual_delivery_time: None,
        }
    }

    pub fn restaurant_count(&self) -> usize {
        self.sub_orders.len()
    }

    /// Set the aggregated status, appending a history entry exactly once per
    /// observed transition. Returns whether the status actually changed.
    pub fn set_status(
        &mut self,
        status: MultiOrderStatus,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.status == status {
            return false;
        }

        self.status = status;
        self.status_history.push(StatusHistoryEntry { status, at: now, note });
        self.updated_at = now;
        true
    }

    /// Attach the single courier responsible for every restaurant in this
    /// order. At most one per active lifecycle.
    pub fn assign_rider(&mut self, rider_id: Uuid, now: DateTime<Utc>) -> Result<(), OrchestrationError> {
        if let Some(current) = self.primary_rider {
            return Err(OrchestrationError::conflict(format!(
                "Order {} already has rider {current} assigned",
                self.order_number
            )));
        }

        self.primary_rider = Some(rider_id);
        self.updated_at = now;
        Ok(())
    }

    /// Detach the rider (compensation path for a failed assignment cascade,
    /// and cancellation before pickup).
    pub fn clear_rider(&mut self, now: DateTime<Utc>) {
        self.primary_rider = None;
        self.updated_at = now;
    }

    /// Require `rider_id` to be the currently assigned primary rider.
    pub fn ensure_primary_rider(&self, rider_id: Uuid) -> Result<(), OrchestrationError> {
        match self.primary_rider {
            Some(assigned) if assigned == rider_id => Ok(()),
            _ => Err(OrchestrationError::authorization(format!(
                "Rider {rider_id} is not the assigned rider for order {}",
                self.order_number
            ))),
        }
    }

    /// Explicit transition table for the rider-driven delivery statuses.
    /// Everything not listed is rejected, including re-requesting the
    /// current status.
    pub fn delivery_transition_allowed(from: MultiOrderStatus, to: MultiOrderStatus) -> bool {
        use MultiOrderStatus::*;
        matches!(
            (from, to),
            (PickedUp, OnTheWay) | (PickedUp, Delivered) | (OnTheWay, Delivered)
        )
    }

    /// Validate a rider-requested delivery transition against the table.
    pub fn validate_delivery_transition(
        &self,
        requested: MultiOrderStatus,
    ) -> Result<(), OrchestrationError> {
        if Self::delivery_transition_allowed(self.status, requested) {
            Ok(())
        } else {
            Err(OrchestrationError::InvalidTransition { from: self.status, to: requested })
        }
    }

    /// Authorize a cancellation request: owning customer (within the
    /// 2-minute window) or admin, and only before any pickup activity.
    pub fn authorize_cancellation(
        &self,
        actor_id: Uuid,
        actor_role: ActorRole,
        now: DateTime<Utc>,
    ) -> Result<(), OrchestrationError> {
        match actor_role {
            ActorRole::Admin => {}
            ActorRole::Customer if actor_id == self.customer_id => {
                if !self.within_cancellation_window(now) {
                    return Err(OrchestrationError::WindowExpired);
                }
            }
            _ => {
                return Err(OrchestrationError::authorization(
                    "Only the owning customer or an admin may cancel this order",
                ))
            }
        }

        if self.status.pickup_started() || self.status == MultiOrderStatus::Cancelled {
            return Err(OrchestrationError::InvalidState { status: self.status });
        }

        Ok(())
    }

    pub fn within_cancellation_window(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at <= Duration::seconds(CANCELLATION_WINDOW_SECS)
    }

    /// Append one GPS sample to the unbounded rider location log.
    pub fn record_rider_location(&mut self, lat: f64, lng: f64, now: DateTime<Utc>) {
        self.rider_location_history.push(RiderLocation { lat, lng, at: now });
        self.updated_at = now;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
