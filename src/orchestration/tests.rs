// ============================================================================
// Orchestration Scenario Tests
// ============================================================================
//
// End-to-end flows over the in-memory adapters: checkout, status
// aggregation, rider assignment, pickup sequencing, delivery settlement and
// cancellation.
//
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, Utc};
use uuid::Uuid;

use super::facade::{NewMultiOrder, OrchestrationFacade};
use crate::domain::multi_order::{
    ActorRole, MultiOrderAggregate, MultiOrderStatus, OrchestrationError, OrderItem,
    PaymentStatus, Pricing, RestaurantCart, SubOrderStatus,
};
use crate::ports::{
    MultiOrderStore, NotificationKind, Rider, RiderDirectory, StoreError, SubOrder,
    SubOrderStore, SubOrderUpdate,
};
use crate::store::memory::{
    InMemoryMultiOrderStore, InMemoryRiderDirectory, InMemorySubOrderStore,
    RecordingEventEmitter, RecordingNotificationSink,
};

struct Harness {
    facade: OrchestrationFacade,
    multi_orders: Arc<InMemoryMultiOrderStore>,
    sub_orders: Arc<InMemorySubOrderStore>,
    riders: Arc<InMemoryRiderDirectory>,
    sink: Arc<RecordingNotificationSink>,
    emitter: Arc<RecordingEventEmitter>,
}

impl Harness {
    fn new() -> Self {
        let multi_orders = Arc::new(InMemoryMultiOrderStore::new());
        let sub_orders = Arc::new(InMemorySubOrderStore::new());
        let riders = Arc::new(InMemoryRiderDirectory::new());
        let sink = Arc::new(RecordingNotificationSink::new());
        let emitter = Arc::new(RecordingEventEmitter::new());

        let facade = OrchestrationFacade::new(
            multi_orders.clone(),
            sub_orders.clone(),
            riders.clone(),
            sink.clone(),
            emitter.clone(),
        );

        Self { facade, multi_orders, sub_orders, riders, sink, emitter }
    }

    fn cart(name: &str) -> RestaurantCart {
        RestaurantCart {
            restaurant_id: Uuid::new_v4(),
            restaurant_name: name.to_string(),
            items: vec![OrderItem { name: "Momo".to_string(), quantity: 2, unit_price: 250 }],
            pricing: Pricing { subtotal: 500, delivery_fee: 100, discount: 0, total: 600 },
        }
    }

    async fn checkout(&self, restaurants: usize) -> MultiOrderAggregate {
        let carts = (0..restaurants)
            .map(|i| Self::cart(&format!("Kitchen {i}")))
            .collect();
        self.facade
            .create_multi_order(NewMultiOrder {
                customer_id: Uuid::new_v4(),
                carts,
                pre_assigned_rider: None,
            })
            .await
            .unwrap()
    }

    async fn add_rider(&self, online: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.riders
            .add(Rider {
                id,
                name: "Asha".to_string(),
                online,
                current_assignment: None,
                completed_orders: 0,
            })
            .await;
        id
    }

    /// Restaurant-side durable mutation followed by the mandatory facade
    /// callback, the way collaborators are required to drive it.
    async fn set_sub_status(
        &self,
        sub_order_id: Uuid,
        status: SubOrderStatus,
    ) -> MultiOrderAggregate {
        self.sub_orders
            .update(sub_order_id, SubOrderUpdate::status(status))
            .await
            .unwrap();
        self.facade
            .on_sub_order_status_changed(sub_order_id)
            .await
            .unwrap()
            .expect("sub-order belongs to a multi-order")
    }

    async fn ready_and_collect_all(&self, aggregate: &MultiOrderAggregate, rider: Uuid) {
        for sub_order_id in &aggregate.sub_orders {
            self.set_sub_status(*sub_order_id, SubOrderStatus::Ready).await;
        }
        for sub_order_id in &aggregate.sub_orders {
            self.facade
                .mark_sub_order_picked_up(aggregate.id, *sub_order_id, rider)
                .await
                .unwrap();
        }
    }

    fn history_of(aggregate: &MultiOrderAggregate) -> Vec<MultiOrderStatus> {
        aggregate.status_history.iter().map(|e| e.status).collect()
    }
}

// ----------------------------------------------------------------------------
// Checkout
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_checkout_builds_full_aggregate() {
    let h = Harness::new();
    let aggregate = h.checkout(3).await;

    assert_eq!(
        aggregate.order_number.as_str(),
        format!("MO-{}-0001", Utc::now().year())
    );
    assert_eq!(aggregate.status, MultiOrderStatus::Pending);
    assert_eq!(aggregate.restaurant_count(), 3);
    assert_eq!(aggregate.pickup.entries().len(), 3);
    assert_eq!(aggregate.pricing.total, 1800);
    assert_eq!(aggregate.pricing.delivery_fee, 300);

    let siblings = h.sub_orders.list_by_multi_order(aggregate.id).await.unwrap();
    assert_eq!(siblings.len(), 3);
    for sub_order in &siblings {
        assert_eq!(sub_order.multi_order_id, Some(aggregate.id));
        assert_eq!(sub_order.status, SubOrderStatus::Pending);
        assert_eq!(sub_order.payment_status, PaymentStatus::Pending);
    }

    let sent = h.sink.sent().await;
    assert!(sent
        .iter()
        .any(|(user, n)| *user == aggregate.customer_id && n.kind == NotificationKind::OrderStatus));
}

#[tokio::test]
async fn test_checkout_order_numbers_are_sequential() {
    let h = Harness::new();
    let first = h.checkout(1).await;
    let second = h.checkout(1).await;

    let year = Utc::now().year();
    assert_eq!(first.order_number.as_str(), format!("MO-{year}-0001"));
    assert_eq!(second.order_number.as_str(), format!("MO-{year}-0002"));
}

#[tokio::test]
async fn test_checkout_requires_at_least_one_cart() {
    let h = Harness::new();
    let err = h
        .facade
        .create_multi_order(NewMultiOrder {
            customer_id: Uuid::new_v4(),
            carts: vec![],
            pre_assigned_rider: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::Precondition(_)));
}

#[tokio::test]
async fn test_checkout_with_pre_assigned_rider() {
    let h = Harness::new();
    let rider = h.add_rider(true).await;

    let carts = vec![Harness::cart("Solo Kitchen")];
    let aggregate = h
        .facade
        .create_multi_order(NewMultiOrder {
            customer_id: Uuid::new_v4(),
            carts,
            pre_assigned_rider: Some(rider),
        })
        .await
        .unwrap();

    assert_eq!(aggregate.primary_rider, Some(rider));
    let rider_record = h.riders.get(rider).await.unwrap();
    assert_eq!(rider_record.current_assignment, Some(aggregate.order_number.clone()));
}

#[tokio::test]
async fn test_failed_pre_assignment_reports_the_created_order() {
    let h = Harness::new();
    let offline = h.add_rider(false).await;

    let err = h
        .facade
        .create_multi_order(NewMultiOrder {
            customer_id: Uuid::new_v4(),
            carts: vec![Harness::cart("Kitchen")],
            pre_assigned_rider: Some(offline),
        })
        .await
        .unwrap_err();

    // The checkout itself committed; only the pre-assignment failed, and
    // the error says so.
    match err {
        OrchestrationError::PartialFailure { completed, failed, source } => {
            assert_eq!(completed, "multi-order creation");
            assert_eq!(failed, "rider pre-assignment");
            assert!(matches!(*source, OrchestrationError::NotFound { .. }));
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }

    // The order survives: the id carried by the placement notification
    // still resolves in the store, without a rider attached.
    let sent = h.sink.sent().await;
    let placed = sent
        .iter()
        .find_map(|(_, n)| {
            (n.kind == NotificationKind::OrderStatus).then(|| n.data["multi_order_id"].clone())
        })
        .expect("placement notification sent");
    let id: Uuid = serde_json::from_value(placed).unwrap();

    let stored = h.multi_orders.get(id).await.unwrap();
    assert!(stored.primary_rider.is_none());
    assert_eq!(h.sub_orders.list_by_multi_order(id).await.unwrap().len(), 1);
}

// ----------------------------------------------------------------------------
// Status aggregation through the facade
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_orphan_sub_order_is_ignored() {
    let h = Harness::new();
    let aggregate = h.checkout(1).await;

    // Detach a copy of a sub-order as a standalone restaurant order.
    let sub_order_id = aggregate.sub_orders[0];
    let mut standalone = h.sub_orders.get(sub_order_id).await.unwrap();
    standalone.id = Uuid::new_v4();
    standalone.multi_order_id = None;
    h.sub_orders.create(standalone.clone()).await.unwrap();

    let result = h
        .facade
        .on_sub_order_status_changed(standalone.id)
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_aggregation_progresses_to_all_ready() {
    let h = Harness::new();
    let aggregate = h.checkout(3).await;
    let [a, b, c] = [aggregate.sub_orders[0], aggregate.sub_orders[1], aggregate.sub_orders[2]];

    let agg = h.set_sub_status(a, SubOrderStatus::Confirmed).await;
    assert_eq!(agg.status, MultiOrderStatus::PartiallyConfirmed);

    let agg = h.set_sub_status(b, SubOrderStatus::Preparing).await;
    assert_eq!(agg.status, MultiOrderStatus::Preparing);

    // [confirmed, preparing, ready] -> partially ready, not all ready.
    let agg = h.set_sub_status(c, SubOrderStatus::Ready).await;
    assert_eq!(agg.status, MultiOrderStatus::PartiallyReady);

    let agg = h.set_sub_status(a, SubOrderStatus::Ready).await;
    assert_eq!(agg.status, MultiOrderStatus::PartiallyReady);

    let agg = h.set_sub_status(b, SubOrderStatus::Ready).await;
    assert_eq!(agg.status, MultiOrderStatus::AllReady);

    // History logged each observed transition exactly once.
    assert_eq!(
        Harness::history_of(&agg),
        vec![
            MultiOrderStatus::Pending,
            MultiOrderStatus::PartiallyConfirmed,
            MultiOrderStatus::Preparing,
            MultiOrderStatus::PartiallyReady,
            MultiOrderStatus::AllReady,
        ]
    );

    // Every entry is flagged ready in the pickup tracker.
    assert!(agg.pickup.all_ready());
}

#[tokio::test]
async fn test_ready_sub_order_notifies_assigned_rider() {
    let h = Harness::new();
    let aggregate = h.checkout(2).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();

    h.set_sub_status(aggregate.sub_orders[0], SubOrderStatus::Ready).await;

    let sent = h.sink.sent().await;
    let rider_pings: Vec<_> = sent
        .iter()
        .filter(|(user, n)| *user == rider && n.kind == NotificationKind::PickupProgress)
        .collect();
    assert_eq!(rider_pings.len(), 1);
    assert!(rider_pings[0].1.message.contains("Kitchen 0"));
}

// ----------------------------------------------------------------------------
// Rider assignment
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_assign_rider_propagates_everywhere() {
    let h = Harness::new();
    let aggregate = h.checkout(2).await;
    let rider = h.add_rider(true).await;

    let assigned = h.facade.assign_rider(aggregate.id, rider).await.unwrap();
    assert_eq!(assigned.primary_rider, Some(rider));

    for sub_order in h.sub_orders.list_by_multi_order(aggregate.id).await.unwrap() {
        assert_eq!(sub_order.delivery_rider, Some(rider));
    }

    let rider_record = h.riders.get(rider).await.unwrap();
    assert_eq!(rider_record.current_assignment, Some(assigned.order_number.clone()));

    let sent = h.sink.sent().await;
    assert!(sent
        .iter()
        .any(|(user, n)| *user == rider && n.kind == NotificationKind::RiderAssignment));

    // One tracking event per restaurant view.
    let events = h.emitter.events().await;
    let rider_events = events.iter().filter(|(_, name, _)| name == "rider_assigned").count();
    assert_eq!(rider_events, 2);
}

#[tokio::test]
async fn test_assign_unknown_or_offline_rider() {
    let h = Harness::new();
    let aggregate = h.checkout(1).await;

    let err = h
        .facade
        .assign_rider(aggregate.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::NotFound { .. }));

    let offline = h.add_rider(false).await;
    let err = h.facade.assign_rider(aggregate.id, offline).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::NotFound { .. }));
}

#[tokio::test]
async fn test_second_assignment_conflicts() {
    let h = Harness::new();
    let aggregate = h.checkout(1).await;
    let first = h.add_rider(true).await;
    let second = h.add_rider(true).await;

    h.facade.assign_rider(aggregate.id, first).await.unwrap();
    let err = h.facade.assign_rider(aggregate.id, second).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::Conflict(_)));
}

#[tokio::test]
async fn test_concurrent_assignment_exactly_one_wins() {
    let h = Harness::new();
    let aggregate = h.checkout(2).await;
    let first = h.add_rider(true).await;
    let second = h.add_rider(true).await;

    let (a, b) = tokio::join!(
        h.facade.assign_rider(aggregate.id, first),
        h.facade.assign_rider(aggregate.id, second),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one concurrent assignment must win");

    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser.unwrap_err(), OrchestrationError::Conflict(_)));

    let stored = h.multi_orders.get(aggregate.id).await.unwrap();
    assert!(stored.primary_rider == Some(first) || stored.primary_rider == Some(second));
}

// ----------------------------------------------------------------------------
// Pickup sequencing
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_pickup_requires_assigned_rider() {
    let h = Harness::new();
    let aggregate = h.checkout(1).await;
    h.set_sub_status(aggregate.sub_orders[0], SubOrderStatus::Ready).await;

    let err = h
        .facade
        .mark_sub_order_picked_up(aggregate.id, aggregate.sub_orders[0], Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::Authorization(_)));
}

#[tokio::test]
async fn test_pickup_requires_ready() {
    let h = Harness::new();
    let aggregate = h.checkout(2).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();

    let err = h
        .facade
        .mark_sub_order_picked_up(aggregate.id, aggregate.sub_orders[0], rider)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::Precondition(_)));

    // The failed attempt must not have touched the sub-order.
    let sub_order = h.sub_orders.get(aggregate.sub_orders[0]).await.unwrap();
    assert_eq!(sub_order.status, SubOrderStatus::Pending);
}

#[tokio::test]
async fn test_pickup_of_foreign_sub_order() {
    let h = Harness::new();
    let aggregate = h.checkout(1).await;
    let other = h.checkout(1).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();

    let err = h
        .facade
        .mark_sub_order_picked_up(aggregate.id, other.sub_orders[0], rider)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::NotFound { .. }));
}

#[tokio::test]
async fn test_partial_pickup_is_picking_up() {
    let h = Harness::new();
    let aggregate = h.checkout(3).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();

    for sub_order_id in &aggregate.sub_orders {
        h.set_sub_status(*sub_order_id, SubOrderStatus::Ready).await;
    }

    let agg = h
        .facade
        .mark_sub_order_picked_up(aggregate.id, aggregate.sub_orders[0], rider)
        .await
        .unwrap();
    assert_eq!(agg.status, MultiOrderStatus::PickingUp);
    assert_eq!(agg.pickup.picked_up_count(), 1);
    assert_eq!(agg.pickup.remaining_count(), 2);

    // The collected sub-order's own status cascaded.
    let sub_order = h.sub_orders.get(aggregate.sub_orders[0]).await.unwrap();
    assert_eq!(sub_order.status, SubOrderStatus::PickedUp);

    // Progress ping went out with counts.
    let events = h.emitter.events().await;
    let (_, _, payload) = events
        .iter()
        .find(|(_, name, _)| name == "pickup_progress")
        .expect("progress event emitted");
    assert_eq!(payload["picked_up"], 1);
    assert_eq!(payload["remaining"], 2);

    // Second pickup keeps the status; no extra history entry.
    let history_before = agg.status_history.len();
    let agg = h
        .facade
        .mark_sub_order_picked_up(aggregate.id, aggregate.sub_orders[1], rider)
        .await
        .unwrap();
    assert_eq!(agg.status, MultiOrderStatus::PickingUp);
    assert_eq!(agg.status_history.len(), history_before);

    // Last one flips the aggregate and notifies the customer.
    let agg = h
        .facade
        .mark_sub_order_picked_up(aggregate.id, aggregate.sub_orders[2], rider)
        .await
        .unwrap();
    assert_eq!(agg.status, MultiOrderStatus::PickedUp);
    assert!(agg.pickup.all_picked_up());

    let sent = h.sink.sent().await;
    assert!(sent
        .iter()
        .any(|(user, n)| *user == agg.customer_id
            && n.kind == NotificationKind::PickupProgress
            && n.message.contains("All restaurants collected")));
}

#[tokio::test]
async fn test_repeat_pickup_is_a_noop() {
    let h = Harness::new();
    let aggregate = h.checkout(2).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();

    for sub_order_id in &aggregate.sub_orders {
        h.set_sub_status(*sub_order_id, SubOrderStatus::Ready).await;
    }

    let first = h
        .facade
        .mark_sub_order_picked_up(aggregate.id, aggregate.sub_orders[0], rider)
        .await
        .unwrap();
    let repeat = h
        .facade
        .mark_sub_order_picked_up(aggregate.id, aggregate.sub_orders[0], rider)
        .await
        .unwrap();

    assert_eq!(repeat.status, first.status);
    assert_eq!(repeat.status_history.len(), first.status_history.len());
    assert_eq!(repeat.pickup.picked_up_count(), 1);
}

// ----------------------------------------------------------------------------
// Delivery
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_delivery_transitions_and_settlement() {
    let h = Harness::new();
    let aggregate = h.checkout(3).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();
    h.ready_and_collect_all(&aggregate, rider).await;

    let agg = h
        .facade
        .update_delivery_status(aggregate.id, rider, MultiOrderStatus::OnTheWay)
        .await
        .unwrap();
    assert_eq!(agg.status, MultiOrderStatus::OnTheWay);

    let agg = h
        .facade
        .update_delivery_status(aggregate.id, rider, MultiOrderStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(agg.status, MultiOrderStatus::Delivered);
    assert!(agg.actual_delivery_time.is_some());

    // Cascade completeness: every sub-order delivered and settled.
    for sub_order in h.sub_orders.list_by_multi_order(aggregate.id).await.unwrap() {
        assert_eq!(sub_order.status, SubOrderStatus::Delivered);
        assert_eq!(sub_order.payment_status, PaymentStatus::Paid);
        assert!(sub_order.actual_delivery_time.is_some());
    }

    // Rider credited one completed order per sub-order and released.
    let rider_record = h.riders.get(rider).await.unwrap();
    assert_eq!(rider_record.completed_orders, 3);
    assert_eq!(rider_record.current_assignment, None);

    let sent = h.sink.sent().await;
    assert!(sent
        .iter()
        .any(|(user, n)| *user == agg.customer_id && n.message.contains("delivered")));
}

#[tokio::test]
async fn test_delivery_straight_from_picked_up() {
    let h = Harness::new();
    let aggregate = h.checkout(1).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();
    h.ready_and_collect_all(&aggregate, rider).await;

    // picked_up -> delivered is in the table; no on_the_way leg required.
    let agg = h
        .facade
        .update_delivery_status(aggregate.id, rider, MultiOrderStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(agg.status, MultiOrderStatus::Delivered);
}

#[tokio::test]
async fn test_delivery_rejects_unlisted_transitions() {
    let h = Harness::new();
    let aggregate = h.checkout(1).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();

    // Still pending: nothing in the table starts from pending.
    let err = h
        .facade
        .update_delivery_status(aggregate.id, rider, MultiOrderStatus::Delivered)
        .await
        .unwrap_err();
    match err {
        OrchestrationError::InvalidTransition { from, to } => {
            assert_eq!(from, MultiOrderStatus::Pending);
            assert_eq!(to, MultiOrderStatus::Delivered);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }

    h.ready_and_collect_all(&aggregate, rider).await;
    h.facade
        .update_delivery_status(aggregate.id, rider, MultiOrderStatus::OnTheWay)
        .await
        .unwrap();

    // Backwards is never legal.
    let err = h
        .facade
        .update_delivery_status(aggregate.id, rider, MultiOrderStatus::PickedUp)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_delivery_requires_the_assigned_rider() {
    let h = Harness::new();
    let aggregate = h.checkout(1).await;
    let rider = h.add_rider(true).await;
    let impostor = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();
    h.ready_and_collect_all(&aggregate, rider).await;

    let err = h
        .facade
        .update_delivery_status(aggregate.id, impostor, MultiOrderStatus::Delivered)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::Authorization(_)));
}

// ----------------------------------------------------------------------------
// Cancellation
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_customer_cancels_within_window() {
    let h = Harness::new();
    let aggregate = h.checkout(2).await;

    let agg = h
        .facade
        .cancel(aggregate.id, aggregate.customer_id, ActorRole::Customer, None)
        .await
        .unwrap();
    assert_eq!(agg.status, MultiOrderStatus::Cancelled);
    assert_eq!(
        agg.status_history.last().unwrap().note.as_deref(),
        Some("Cancelled by user")
    );

    for sub_order in h.sub_orders.list_by_multi_order(aggregate.id).await.unwrap() {
        assert_eq!(sub_order.status, SubOrderStatus::Cancelled);
        let note = sub_order.history.last().unwrap().note.clone().unwrap();
        assert!(note.contains(agg.order_number.as_str()));
        assert!(note.contains("Cancelled by user"));
    }
}

#[tokio::test]
async fn test_customer_cancellation_window_expires() {
    let h = Harness::new();
    let aggregate = h.checkout(1).await;

    // Backdate creation past the window.
    let mut stored = h.multi_orders.get(aggregate.id).await.unwrap();
    stored.created_at = Utc::now() - Duration::seconds(300);
    let expected = stored.version;
    h.multi_orders.update(&stored, expected).await.unwrap();

    let err = h
        .facade
        .cancel(aggregate.id, aggregate.customer_id, ActorRole::Customer, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::WindowExpired));

    // An admin is not bound by the window.
    let agg = h
        .facade
        .cancel(
            aggregate.id,
            Uuid::new_v4(),
            ActorRole::Admin,
            Some("Restaurant unreachable".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(agg.status, MultiOrderStatus::Cancelled);
    assert_eq!(
        agg.status_history.last().unwrap().note.as_deref(),
        Some("Restaurant unreachable")
    );
}

#[tokio::test]
async fn test_cancellation_blocked_once_pickup_started() {
    let h = Harness::new();
    let aggregate = h.checkout(2).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();

    h.set_sub_status(aggregate.sub_orders[0], SubOrderStatus::Ready).await;
    h.facade
        .mark_sub_order_picked_up(aggregate.id, aggregate.sub_orders[0], rider)
        .await
        .unwrap();

    let err = h
        .facade
        .cancel(aggregate.id, Uuid::new_v4(), ActorRole::Admin, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::InvalidState { status: MultiOrderStatus::PickingUp }
    ));
}

#[tokio::test]
async fn test_cancellation_releases_reserved_rider() {
    let h = Harness::new();
    let aggregate = h.checkout(1).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();

    h.facade
        .cancel(aggregate.id, Uuid::new_v4(), ActorRole::Admin, None)
        .await
        .unwrap();

    let rider_record = h.riders.get(rider).await.unwrap();
    assert_eq!(rider_record.current_assignment, None);
}

/// Delegating store whose sibling lookup can be flipped to fail, for
/// exercising the cancellation cascade's partial-failure reporting.
struct FlakySiblingLookup {
    inner: Arc<InMemorySubOrderStore>,
    fail_lookups: AtomicBool,
}

#[async_trait]
impl SubOrderStore for FlakySiblingLookup {
    async fn create(&self, sub_order: SubOrder) -> Result<(), StoreError> {
        self.inner.create(sub_order).await
    }

    async fn get(&self, id: Uuid) -> Result<SubOrder, StoreError> {
        self.inner.get(id).await
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<SubOrder>, StoreError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("sibling lookup down".to_string()));
        }
        self.inner.get_many(ids).await
    }

    async fn list_by_multi_order(&self, multi_order_id: Uuid) -> Result<Vec<SubOrder>, StoreError> {
        self.inner.list_by_multi_order(multi_order_id).await
    }

    async fn update(&self, id: Uuid, update: SubOrderUpdate) -> Result<SubOrder, StoreError> {
        self.inner.update(id, update).await
    }

    async fn update_all(&self, updates: Vec<(Uuid, SubOrderUpdate)>) -> Result<(), StoreError> {
        self.inner.update_all(updates).await
    }
}

#[tokio::test]
async fn test_cancel_names_the_failed_cascade_step() {
    let multi_orders = Arc::new(InMemoryMultiOrderStore::new());
    let sub_orders = Arc::new(FlakySiblingLookup {
        inner: Arc::new(InMemorySubOrderStore::new()),
        fail_lookups: AtomicBool::new(false),
    });
    let facade = OrchestrationFacade::new(
        multi_orders.clone(),
        sub_orders.clone(),
        Arc::new(InMemoryRiderDirectory::new()),
        Arc::new(RecordingNotificationSink::new()),
        Arc::new(RecordingEventEmitter::new()),
    );

    let aggregate = facade
        .create_multi_order(NewMultiOrder {
            customer_id: Uuid::new_v4(),
            carts: vec![Harness::cart("Kitchen")],
            pre_assigned_rider: None,
        })
        .await
        .unwrap();

    sub_orders.fail_lookups.store(true, Ordering::SeqCst);
    let err = facade
        .cancel(aggregate.id, Uuid::new_v4(), ActorRole::Admin, None)
        .await
        .unwrap_err();
    match err {
        OrchestrationError::PartialFailure { completed, failed, .. } => {
            assert_eq!(completed, "aggregate cancellation");
            assert_eq!(failed, "sub-order cancellation cascade");
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }

    // The aggregate itself was durably cancelled before the cascade broke.
    let stored = multi_orders.get(aggregate.id).await.unwrap();
    assert_eq!(stored.status, MultiOrderStatus::Cancelled);
}

#[tokio::test]
async fn test_cancelled_order_cannot_be_cancelled_again() {
    let h = Harness::new();
    let aggregate = h.checkout(1).await;

    h.facade
        .cancel(aggregate.id, Uuid::new_v4(), ActorRole::Admin, None)
        .await
        .unwrap();
    let err = h
        .facade
        .cancel(aggregate.id, Uuid::new_v4(), ActorRole::Admin, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::InvalidState { .. }));
}

// ----------------------------------------------------------------------------
// Terminal states, locations and best-effort channels
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_late_callback_after_delivery_is_harmless() {
    let h = Harness::new();
    let aggregate = h.checkout(2).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();
    h.ready_and_collect_all(&aggregate, rider).await;
    h.facade
        .update_delivery_status(aggregate.id, rider, MultiOrderStatus::Delivered)
        .await
        .unwrap();

    let before = h.multi_orders.get(aggregate.id).await.unwrap();
    let after = h
        .facade
        .on_sub_order_status_changed(aggregate.sub_orders[0])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(after.status, MultiOrderStatus::Delivered);
    assert_eq!(after.status_history.len(), before.status_history.len());
    assert_eq!(after.version, before.version);
}

#[tokio::test]
async fn test_late_callback_during_on_the_way_is_harmless() {
    let h = Harness::new();
    let aggregate = h.checkout(2).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();
    h.ready_and_collect_all(&aggregate, rider).await;
    h.facade
        .update_delivery_status(aggregate.id, rider, MultiOrderStatus::OnTheWay)
        .await
        .unwrap();

    // Children still read picked_up at this point; a stray callback must
    // not regress the aggregate to a recomputed picked_up.
    let after = h
        .facade
        .on_sub_order_status_changed(aggregate.sub_orders[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.status, MultiOrderStatus::OnTheWay);

    let stored = h.multi_orders.get(aggregate.id).await.unwrap();
    assert_eq!(stored.status, MultiOrderStatus::OnTheWay);
    assert_eq!(
        stored.status_history.last().unwrap().status,
        MultiOrderStatus::OnTheWay
    );
}

#[tokio::test]
async fn test_rider_location_log() {
    let h = Harness::new();
    let aggregate = h.checkout(1).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();

    h.facade
        .record_rider_location(aggregate.id, rider, 27.7172, 85.3240)
        .await
        .unwrap();
    h.facade
        .record_rider_location(aggregate.id, rider, 27.7180, 85.3251)
        .await
        .unwrap();

    let stored = h.multi_orders.get(aggregate.id).await.unwrap();
    assert_eq!(stored.rider_location_history.len(), 2);

    let err = h
        .facade
        .record_rider_location(aggregate.id, Uuid::new_v4(), 0.0, 0.0)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::Authorization(_)));
}

#[tokio::test]
async fn test_failing_sink_never_fails_operations() {
    let h = Harness::new();
    h.sink.set_failing(true);

    let aggregate = h.checkout(2).await;
    let rider = h.add_rider(true).await;
    h.facade.assign_rider(aggregate.id, rider).await.unwrap();
    h.ready_and_collect_all(&aggregate, rider).await;

    let agg = h
        .facade
        .update_delivery_status(aggregate.id, rider, MultiOrderStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(agg.status, MultiOrderStatus::Delivered);
    assert!(h.sink.sent().await.is_empty());
}
