use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::multi_order::{MultiOrderAggregate, OrderNumber};
use crate::ports::{
    EventEmitter, EventScope, MultiOrderStore, Notification, NotificationSink, Rider,
    RiderDirectory, StoreError, SubOrder, SubOrderHistoryEntry, SubOrderStore, SubOrderUpdate,
};

// ============================================================================
// In-Memory Adapters
// ============================================================================
//
// Reference implementations of every collaborator port, backed by
// tokio-guarded maps. Used by the demo binary and the orchestration tests;
// production deployments supply their own store-backed implementations.
//
// ============================================================================

#[derive(Default)]
pub struct InMemorySubOrderStore {
    sub_orders: RwLock<HashMap<Uuid, SubOrder>>,
}

impl InMemorySubOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(sub_order: &mut SubOrder, update: SubOrderUpdate) {
        let now = Utc::now();

        if let Some(status) = update.status {
            if sub_order.status != status {
                sub_order.status = status;
                sub_order.history.push(SubOrderHistoryEntry {
                    status,
                    at: now,
                    note: update.note.clone(),
                });
            }
        }
        if let Some(payment_status) = update.payment_status {
            sub_order.payment_status = payment_status;
        }
        if let Some(rider) = update.delivery_rider {
            sub_order.delivery_rider = Some(rider);
        }
        if let Some(delivered_at) = update.actual_delivery_time {
            sub_order.actual_delivery_time = Some(delivered_at);
        }
        sub_order.updated_at = now;
    }
}

#[async_trait]
impl SubOrderStore for InMemorySubOrderStore {
    async fn create(&self, sub_order: SubOrder) -> Result<(), StoreError> {
        let mut sub_orders = self.sub_orders.write().await;
        if sub_orders.contains_key(&sub_order.id) {
            return Err(StoreError::AlreadyExists { entity: "sub-order", id: sub_order.id });
        }
        sub_orders.insert(sub_order.id, sub_order);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<SubOrder, StoreError> {
        self.sub_orders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::not_found("sub-order", id))
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<SubOrder>, StoreError> {
        let sub_orders = self.sub_orders.read().await;
        ids.iter()
            .map(|id| {
                sub_orders
                    .get(id)
                    .cloned()
                    .ok_or(StoreError::not_found("sub-order", *id))
            })
            .collect()
    }

    async fn list_by_multi_order(&self, multi_order_id: Uuid) -> Result<Vec<SubOrder>, StoreError> {
        let sub_orders = self.sub_orders.read().await;
        let mut matches: Vec<SubOrder> = sub_orders
            .values()
            .filter(|s| s.multi_order_id == Some(multi_order_id))
            .cloned()
            .collect();
        matches.sort_by_key(|s| (s.created_at, s.id));
        Ok(matches)
    }

    async fn update(&self, id: Uuid, update: SubOrderUpdate) -> Result<SubOrder, StoreError> {
        let mut sub_orders = self.sub_orders.write().await;
        let sub_order = sub_orders
            .get_mut(&id)
            .ok_or(StoreError::not_found("sub-order", id))?;
        Self::apply(sub_order, update);
        Ok(sub_order.clone())
    }

    async fn update_all(&self, updates: Vec<(Uuid, SubOrderUpdate)>) -> Result<(), StoreError> {
        let mut sub_orders = self.sub_orders.write().await;

        // Validate every id before touching anything: all-or-nothing.
        for (id, _) in &updates {
            if !sub_orders.contains_key(id) {
                return Err(StoreError::not_found("sub-order", *id));
            }
        }

        for (id, update) in updates {
            let sub_order = sub_orders.get_mut(&id).expect("validated above");
            Self::apply(sub_order, update);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRiderDirectory {
    riders: RwLock<HashMap<Uuid, Rider>>,
}

impl InMemoryRiderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, rider: Rider) {
        self.riders.write().await.insert(rider.id, rider);
    }
}

#[async_trait]
impl RiderDirectory for InMemoryRiderDirectory {
    async fn find_available(&self, id: Uuid) -> Result<Rider, StoreError> {
        let riders = self.riders.read().await;
        riders
            .get(&id)
            .filter(|r| r.is_available())
            .cloned()
            .ok_or(StoreError::not_found("available rider", id))
    }

    async fn get(&self, id: Uuid) -> Result<Rider, StoreError> {
        self.riders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::not_found("rider", id))
    }

    async fn set_current_assignment(
        &self,
        rider_id: Uuid,
        label: Option<OrderNumber>,
    ) -> Result<(), StoreError> {
        let mut riders = self.riders.write().await;
        let rider = riders
            .get_mut(&rider_id)
            .ok_or(StoreError::not_found("rider", rider_id))?;
        rider.current_assignment = label;
        Ok(())
    }

    async fn increment_completed_orders(&self, rider_id: Uuid, n: u64) -> Result<(), StoreError> {
        let mut riders = self.riders.write().await;
        let rider = riders
            .get_mut(&rider_id)
            .ok_or(StoreError::not_found("rider", rider_id))?;
        rider.completed_orders += n;
        Ok(())
    }
}

pub struct InMemoryMultiOrderStore {
    orders: RwLock<HashMap<Uuid, MultiOrderAggregate>>,
    sequences: Mutex<HashMap<i32, u32>>,
}

impl InMemoryMultiOrderStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            sequences: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryMultiOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MultiOrderStore for InMemoryMultiOrderStore {
    async fn insert(&self, aggregate: MultiOrderAggregate) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&aggregate.id) {
            return Err(StoreError::AlreadyExists { entity: "multi-order", id: aggregate.id });
        }
        orders.insert(aggregate.id, aggregate);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<MultiOrderAggregate, StoreError> {
        self.orders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::not_found("multi-order", id))
    }

    async fn update(
        &self,
        aggregate: &MultiOrderAggregate,
        expected_version: i64,
    ) -> Result<i64, StoreError> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&aggregate.id)
            .ok_or(StoreError::not_found("multi-order", aggregate.id))?;

        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: aggregate.id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        let mut updated = aggregate.clone();
        updated.version = expected_version + 1;
        let new_version = updated.version;
        *stored = updated;
        Ok(new_version)
    }

    async fn next_sequence(&self, year: i32) -> Result<u32, StoreError> {
        let mut sequences = self.sequences.lock().await;
        let counter = sequences.entry(year).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

/// Records every notification; can be flipped into a failing mode to prove
/// that sink failures never fail orchestration operations.
#[derive(Default)]
pub struct RecordingNotificationSink {
    sent: Mutex<Vec<(Uuid, Notification)>>,
    fail_all: AtomicBool,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<(Uuid, Notification)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(&self, user_id: Uuid, notification: Notification) -> anyhow::Result<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            anyhow::bail!("notification sink unavailable");
        }
        self.sent.lock().await.push((user_id, notification));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEventEmitter {
    events: Mutex<Vec<(EventScope, String, Value)>>,
}

impl RecordingEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<(EventScope, String, Value)> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventEmitter for RecordingEventEmitter {
    async fn emit(&self, scope: EventScope, event: &str, payload: Value) -> anyhow::Result<()> {
        self.events.lock().await.push((scope, event.to_string(), payload));
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
