use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrchestrationError;

// ============================================================================
// Pickup Tracker
// ============================================================================
//
// One entry per sub-order, created alongside the multi-order and never
// removed while the parent is active. Drives the single rider's collection
// run across restaurants and feeds the aggregate status.
//
// Invariant: is_picked_up implies is_ready. Both flags are monotonic; no
// operation can unset them.
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupStatusEntry {
    pub sub_order_id: Uuid,
    pub restaurant_id: Uuid,
    pub is_ready: bool,
    pub is_picked_up: bool,
    pub ready_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
}

impl PickupStatusEntry {
    pub fn new(sub_order_id: Uuid, restaurant_id: Uuid) -> Self {
        Self {
            sub_order_id,
            restaurant_id,
            is_ready: false,
            is_picked_up: false,
            ready_at: None,
            picked_up_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupTracker {
    entries: Vec<PickupStatusEntry>,
}

impl PickupTracker {
    pub fn new(sub_orders: impl IntoIterator<Item = (Uuid, Uuid)>) -> Self {
        Self {
            entries: sub_orders
                .into_iter()
                .map(|(sub_order_id, restaurant_id)| {
                    PickupStatusEntry::new(sub_order_id, restaurant_id)
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[PickupStatusEntry] {
        &self.entries
    }

    pub fn entry(&self, sub_order_id: Uuid) -> Option<&PickupStatusEntry> {
        self.entries.iter().find(|e| e.sub_order_id == sub_order_id)
    }

    /// Mark a sub-order ready for pickup. Idempotent: repeating the call on
    /// an already-ready entry is a no-op. Returns whether the flag changed.
    pub fn mark_ready(
        &mut self,
        sub_order_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, OrchestrationError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.sub_order_id == sub_order_id)
            .ok_or(OrchestrationError::not_found("sub-order pickup entry", sub_order_id))?;

        if entry.is_ready {
            return Ok(false);
        }

        entry.is_ready = true;
        entry.ready_at = Some(now);
        Ok(true)
    }

    /// Mark a sub-order collected by the rider. Requires the entry to be
    /// ready. Idempotent on already-picked-up entries.
    pub fn mark_picked_up(
        &mut self,
        sub_order_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, OrchestrationError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.sub_order_id == sub_order_id)
            .ok_or(OrchestrationError::not_found("sub-order pickup entry", sub_order_id))?;

        if entry.is_picked_up {
            return Ok(false);
        }

        if !entry.is_ready {
            return Err(OrchestrationError::precondition("not ready for pickup"));
        }

        entry.is_picked_up = true;
        entry.picked_up_at = Some(now);
        Ok(true)
    }

    /// True when every entry is ready. Vacuously true on an empty tracker;
    /// creation always populates at least one entry so that case is
    /// unreachable through the facade.
    pub fn all_ready(&self) -> bool {
        self.entries.iter().all(|e| e.is_ready)
    }

    /// True when every entry has been collected. Same vacuous-true caveat
    /// as `all_ready`.
    pub fn all_picked_up(&self) -> bool {
        self.entries.iter().all(|e| e.is_picked_up)
    }

    pub fn picked_up_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_picked_up).count()
    }

    pub fn remaining_count(&self) -> usize {
        self.entries.len() - self.picked_up_count()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
