use std::sync::Arc;

use chrono::{Datelike, Utc};
use serde_json::json;
use uuid::Uuid;

use super::notify::BestEffortNotifier;
use super::rider_assignment::RiderAssignmentService;
use crate::domain::multi_order::{
    aggregate_status, ActorRole, MultiOrderAggregate, MultiOrderStatus, OrchestrationError,
    OrderNumber, PaymentStatus, Pricing, RestaurantCart, SubOrderStatus,
};
use crate::ports::{
    EventEmitter, EventScope, MultiOrderStore, Notification, NotificationKind, NotificationSink,
    RiderDirectory, SubOrder, SubOrderHistoryEntry, SubOrderStore, SubOrderUpdate,
};
use crate::utils::retry::{retry_on_transient, RetryConfig};

// ============================================================================
// Orchestration Facade
// ============================================================================
//
// The single integration point collaborators call to drive the
// multi-order aggregate: checkout creation, sub-order status change
// callbacks, rider assignment, pickup sequencing, delivery transitions and
// cancellation.
//
// Every load-mutate-store sequence runs under optimistic concurrency:
// `MultiOrderStore::update` rejects stale versions and the operation retries
// against freshly loaded state, so two sub-orders transitioning at the same
// instant can never publish an aggregate computed from a partial view.
// Notifications and realtime events fire only after the aggregate write
// committed, and never fail the operation.
//
// ============================================================================

/// Checkout request: one cart per restaurant.
#[derive(Debug, Clone)]
pub struct NewMultiOrder {
    pub customer_id: Uuid,
    pub carts: Vec<RestaurantCart>,
    /// Optional admin pre-assignment, routed through the rider assignment
    /// service after creation.
    pub pre_assigned_rider: Option<Uuid>,
}

pub struct OrchestrationFacade {
    multi_orders: Arc<dyn MultiOrderStore>,
    sub_orders: Arc<dyn SubOrderStore>,
    notifier: Arc<BestEffortNotifier>,
    assignment: RiderAssignmentService,
    retry: RetryConfig,
}

impl OrchestrationFacade {
    pub fn new(
        multi_orders: Arc<dyn MultiOrderStore>,
        sub_orders: Arc<dyn SubOrderStore>,
        riders: Arc<dyn RiderDirectory>,
        sink: Arc<dyn NotificationSink>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        let notifier = Arc::new(BestEffortNotifier::new(sink, emitter));
        let retry = RetryConfig::default();
        let assignment = RiderAssignmentService::new(
            multi_orders.clone(),
            sub_orders.clone(),
            riders,
            notifier.clone(),
            retry.clone(),
        );

        Self { multi_orders, sub_orders, notifier, assignment, retry }
    }

    /// Create the whole checkout atomically: one sub-order per restaurant
    /// cart, one pickup entry per sub-order, the pricing snapshot and the
    /// aggregate itself, then compute the initial aggregated status.
    pub async fn create_multi_order(
        &self,
        request: NewMultiOrder,
    ) -> Result<MultiOrderAggregate, OrchestrationError> {
        if request.carts.is_empty() {
            return Err(OrchestrationError::precondition(
                "a multi-order requires at least one restaurant cart",
            ));
        }

        let now = Utc::now();
        let sequence = self.multi_orders.next_sequence(now.year()).await?;
        let order_number = OrderNumber::new(now.year(), sequence);

        let pricing = Pricing::combine(request.carts.iter().map(|c| &c.pricing));
        let sub_order_ids: Vec<(Uuid, Uuid)> = request
            .carts
            .iter()
            .map(|cart| (Uuid::new_v4(), cart.restaurant_id))
            .collect();

        let mut aggregate = MultiOrderAggregate::new(
            order_number,
            request.customer_id,
            sub_order_ids.clone(),
            pricing,
            now,
        );

        // All sub-orders start pending; run the aggregation rule once anyway
        // so the stored status is always derived, never assumed.
        let initial_statuses = vec![SubOrderStatus::Pending; request.carts.len()];
        aggregate.set_status(aggregate_status(&initial_statuses), None, now);

        for ((sub_order_id, _), cart) in sub_order_ids.iter().zip(&request.carts) {
            self.sub_orders
                .create(SubOrder {
                    id: *sub_order_id,
                    restaurant_id: cart.restaurant_id,
                    restaurant_name: cart.restaurant_name.clone(),
                    customer_id: request.customer_id,
                    multi_order_id: Some(aggregate.id),
                    status: SubOrderStatus::Pending,
                    payment_status: PaymentStatus::Pending,
                    delivery_rider: None,
                    items: cart.items.clone(),
                    pricing: cart.pricing,
                    actual_delivery_time: None,
                    history: vec![SubOrderHistoryEntry {
                        status: SubOrderStatus::Pending,
                        at: now,
                        note: Some("Order placed".to_string()),
                    }],
                    created_at: now,
                    updated_at: now,
                })
                .await?;
        }

        self.multi_orders.insert(aggregate.clone()).await?;

        tracing::info!(
            multi_order = %aggregate.order_number,
            restaurants = aggregate.restaurant_count(),
            total = aggregate.pricing.total,
            "Multi-order created"
        );

        self.notifier
            .emit(
                EventScope::MultiOrder(aggregate.id),
                "multi_order_created",
                json!({ "order_number": aggregate.order_number, "restaurants": aggregate.restaurant_count() }),
            )
            .await;
        self.notifier
            .notify(
                request.customer_id,
                Notification::new(
                    NotificationKind::OrderStatus,
                    "Order placed",
                    format!(
                        "Your order {} across {} restaurants has been placed",
                        aggregate.order_number,
                        aggregate.restaurant_count()
                    ),
                )
                .with_data(json!({ "multi_order_id": aggregate.id })),
            )
            .await;

        // Pre-assignment runs after the order is durably created: a rejected
        // rider must not read as a failed checkout.
        if let Some(rider_id) = request.pre_assigned_rider {
            return self
                .assignment
                .assign(aggregate.id, rider_id)
                .await
                .map_err(|err| OrchestrationError::PartialFailure {
                    completed: "multi-order creation",
                    failed: "rider pre-assignment",
                    source: Box::new(err),
                });
        }

        Ok(aggregate)
    }

    /// React to a durable sub-order status mutation: recompute the
    /// aggregated status and maintain the pickup tracker. Returns `None`
    /// when the sub-order has no associated multi-order. Must be called
    /// exactly once per sub-order mutation, after that mutation is durable.
    pub async fn on_sub_order_status_changed(
        &self,
        sub_order_id: Uuid,
    ) -> Result<Option<MultiOrderAggregate>, OrchestrationError> {
        let sub_order = self
            .sub_orders
            .get(sub_order_id)
            .await
            .map_err(OrchestrationError::lookup)?;

        let Some(multi_order_id) = sub_order.multi_order_id else {
            return Ok(None);
        };

        let (aggregate, status_changed, became_ready) =
            retry_on_transient(&self.retry, || {
                let this = self;
                let sub_order = sub_order.clone();
                async move {
                    let mut aggregate = this
                        .multi_orders
                        .get(multi_order_id)
                        .await
                        .map_err(OrchestrationError::lookup)?;

                    // Terminal aggregates take no further mutation, and the
                    // on_the_way leg is not derivable from the children
                    // (sub-orders only cascade again at delivery). A late
                    // callback in either case is harmless.
                    if aggregate.status.is_terminal()
                        || aggregate.status == MultiOrderStatus::OnTheWay
                    {
                        return Ok((aggregate, false, false));
                    }

                    let siblings = this.sub_orders.list_by_multi_order(multi_order_id).await?;
                    let statuses: Vec<SubOrderStatus> =
                        siblings.iter().map(|s| s.status).collect();

                    let now = Utc::now();
                    let status_changed =
                        aggregate.set_status(aggregate_status(&statuses), None, now);

                    let became_ready = if sub_order.status == SubOrderStatus::Ready {
                        aggregate.pickup.mark_ready(sub_order.id, now)?
                    } else {
                        false
                    };

                    if status_changed || became_ready {
                        let expected = aggregate.version;
                        aggregate.version =
                            this.multi_orders.update(&aggregate, expected).await?;
                    }

                    Ok::<_, OrchestrationError>((aggregate, status_changed, became_ready))
                }
            })
            .await?;

        if status_changed {
            tracing::info!(
                multi_order = %aggregate.order_number,
                status = %aggregate.status,
                trigger = %sub_order_id,
                "Aggregated status changed"
            );

            self.notifier
                .emit(
                    EventScope::MultiOrder(aggregate.id),
                    "status_changed",
                    json!({ "status": aggregate.status }),
                )
                .await;
            self.notifier
                .notify(
                    aggregate.customer_id,
                    Notification::new(
                        NotificationKind::OrderStatus,
                        "Order update",
                        format!("Order {} is now {}", aggregate.order_number, aggregate.status),
                    )
                    .with_data(json!({ "multi_order_id": aggregate.id })),
                )
                .await;
        }

        if became_ready {
            if let Some(rider_id) = aggregate.primary_rider {
                self.notifier
                    .notify(
                        rider_id,
                        Notification::new(
                            NotificationKind::PickupProgress,
                            "Restaurant ready",
                            format!(
                                "{} is ready for pickup (order {})",
                                sub_order.restaurant_name, aggregate.order_number
                            ),
                        )
                        .with_data(json!({ "sub_order_id": sub_order.id })),
                    )
                    .await;
            }
        }

        Ok(Some(aggregate))
    }

    /// Reserve a single rider for the whole multi-order. See
    /// `RiderAssignmentService` for the cascade contract.
    pub async fn assign_rider(
        &self,
        multi_order_id: Uuid,
        rider_id: Uuid,
    ) -> Result<MultiOrderAggregate, OrchestrationError> {
        self.assignment.assign(multi_order_id, rider_id).await
    }

    /// The assigned rider collects one restaurant's bag. Requires the
    /// pickup entry to be ready; repeat calls on an already-collected entry
    /// are no-ops.
    pub async fn mark_sub_order_picked_up(
        &self,
        multi_order_id: Uuid,
        sub_order_id: Uuid,
        rider_id: Uuid,
    ) -> Result<MultiOrderAggregate, OrchestrationError> {
        // Validate before touching the sub-order so precondition failures
        // leave no trace.
        let aggregate = self
            .multi_orders
            .get(multi_order_id)
            .await
            .map_err(OrchestrationError::lookup)?;
        aggregate.ensure_primary_rider(rider_id)?;

        let entry = aggregate
            .pickup
            .entry(sub_order_id)
            .ok_or(OrchestrationError::not_found("sub-order pickup entry", sub_order_id))?;
        if entry.is_picked_up {
            return Ok(aggregate);
        }
        if !entry.is_ready {
            return Err(OrchestrationError::precondition("not ready for pickup"));
        }

        // Child first: the sub-order's own status becomes durable before
        // the aggregate reflects it.
        self.sub_orders
            .update(
                sub_order_id,
                SubOrderUpdate::status(SubOrderStatus::PickedUp).with_note("Collected by rider"),
            )
            .await?;

        let aggregate = retry_on_transient(&self.retry, || {
            let this = self;
            async move {
                let mut aggregate = this
                    .multi_orders
                    .get(multi_order_id)
                    .await
                    .map_err(OrchestrationError::lookup)?;

                aggregate.ensure_primary_rider(rider_id)?;
                let now = Utc::now();
                aggregate.pickup.mark_picked_up(sub_order_id, now)?;

                let status = if aggregate.pickup.all_picked_up() {
                    MultiOrderStatus::PickedUp
                } else {
                    MultiOrderStatus::PickingUp
                };
                aggregate.set_status(status, None, now);

                let expected = aggregate.version;
                aggregate.version = this.multi_orders.update(&aggregate, expected).await?;
                Ok::<_, OrchestrationError>(aggregate)
            }
        })
        .await?;

        if aggregate.pickup.all_picked_up() {
            tracing::info!(multi_order = %aggregate.order_number, "All restaurants collected");
            self.notifier
                .notify(
                    aggregate.customer_id,
                    Notification::new(
                        NotificationKind::PickupProgress,
                        "Order collected",
                        format!(
                            "All restaurants collected for order {}; your rider is on the move soon",
                            aggregate.order_number
                        ),
                    )
                    .with_data(json!({ "multi_order_id": aggregate.id })),
                )
                .await;
        } else {
            // Progress ping only; intermediate pickups do not append to the
            // status history.
            self.notifier
                .emit(
                    EventScope::MultiOrder(aggregate.id),
                    "pickup_progress",
                    json!({
                        "picked_up": aggregate.pickup.picked_up_count(),
                        "remaining": aggregate.pickup.remaining_count(),
                    }),
                )
                .await;
        }

        Ok(aggregate)
    }

    /// Rider-driven delivery transition, restricted to the explicit table
    /// `picked_up -> {on_the_way, delivered}`, `on_the_way -> {delivered}`.
    /// Delivery cascades to every sub-order and settles payment.
    pub async fn update_delivery_status(
        &self,
        multi_order_id: Uuid,
        rider_id: Uuid,
        requested: MultiOrderStatus,
    ) -> Result<MultiOrderAggregate, OrchestrationError> {
        let (aggregate, delivered_at) = retry_on_transient(&self.retry, || {
            let this = self;
            async move {
                let mut aggregate = this
                    .multi_orders
                    .get(multi_order_id)
                    .await
                    .map_err(OrchestrationError::lookup)?;

                aggregate.ensure_primary_rider(rider_id)?;
                aggregate.validate_delivery_transition(requested)?;

                let now = Utc::now();
                aggregate.set_status(requested, None, now);

                let delivered_at = if requested == MultiOrderStatus::Delivered {
                    aggregate.actual_delivery_time = Some(now);
                    Some(now)
                } else {
                    None
                };

                let expected = aggregate.version;
                aggregate.version = this.multi_orders.update(&aggregate, expected).await?;
                Ok::<_, OrchestrationError>((aggregate, delivered_at))
            }
        })
        .await?;

        tracing::info!(
            multi_order = %aggregate.order_number,
            status = %aggregate.status,
            "Delivery status updated by rider"
        );

        if let Some(delivered_at) = delivered_at {
            // Multi-entity settlement: every sub-order flips to delivered
            // and paid in one all-or-nothing batch, then the rider is
            // credited and released.
            let updates: Vec<(Uuid, SubOrderUpdate)> = aggregate
                .sub_orders
                .iter()
                .map(|id| {
                    (
                        *id,
                        SubOrderUpdate {
                            status: Some(SubOrderStatus::Delivered),
                            payment_status: Some(PaymentStatus::Paid),
                            delivery_rider: None,
                            actual_delivery_time: Some(delivered_at),
                            note: Some(format!(
                                "Delivered with parent order {}",
                                aggregate.order_number
                            )),
                        },
                    )
                })
                .collect();

            if let Err(err) = self.sub_orders.update_all(updates).await {
                return Err(OrchestrationError::PartialFailure {
                    completed: "aggregate delivery status",
                    failed: "sub-order delivery cascade",
                    source: Box::new(err.into()),
                });
            }

            if let Err(err) = self
                .assignment
                .credit_delivery(rider_id, aggregate.restaurant_count() as u64)
                .await
            {
                return Err(OrchestrationError::PartialFailure {
                    completed: "sub-order delivery cascade",
                    failed: "rider completion bookkeeping",
                    source: Box::new(err.into()),
                });
            }

            self.notifier
                .notify(
                    aggregate.customer_id,
                    Notification::new(
                        NotificationKind::OrderStatus,
                        "Order delivered",
                        format!("Order {} has been delivered. Enjoy!", aggregate.order_number),
                    )
                    .with_data(json!({ "multi_order_id": aggregate.id })),
                )
                .await;
        }

        self.notifier
            .emit(
                EventScope::MultiOrder(aggregate.id),
                "delivery_status_changed",
                json!({ "status": aggregate.status }),
            )
            .await;

        Ok(aggregate)
    }

    /// Cancel the whole multi-order: owning customer (inside the 2-minute
    /// window) or admin, and only before any pickup activity.
    pub async fn cancel(
        &self,
        multi_order_id: Uuid,
        actor_id: Uuid,
        actor_role: ActorRole,
        reason: Option<String>,
    ) -> Result<MultiOrderAggregate, OrchestrationError> {
        let note = reason.unwrap_or_else(|| "Cancelled by user".to_string());

        let aggregate = retry_on_transient(&self.retry, || {
            let this = self;
            let note = note.clone();
            async move {
                let mut aggregate = this
                    .multi_orders
                    .get(multi_order_id)
                    .await
                    .map_err(OrchestrationError::lookup)?;

                let now = Utc::now();
                aggregate.authorize_cancellation(actor_id, actor_role, now)?;
                aggregate.set_status(MultiOrderStatus::Cancelled, Some(note), now);

                let expected = aggregate.version;
                aggregate.version = this.multi_orders.update(&aggregate, expected).await?;
                Ok::<_, OrchestrationError>(aggregate)
            }
        })
        .await?;

        tracing::info!(
            multi_order = %aggregate.order_number,
            ?actor_role,
            reason = %note,
            "Multi-order cancelled"
        );

        // Cascade-cancel every sub-order that is not already cancelled,
        // each referencing the parent cancellation. The aggregate is already
        // durably cancelled, so any failure from here on reports what
        // completed.
        let siblings = self
            .sub_orders
            .get_many(&aggregate.sub_orders)
            .await
            .map_err(|err| OrchestrationError::PartialFailure {
                completed: "aggregate cancellation",
                failed: "sub-order cancellation cascade",
                source: Box::new(err.into()),
            })?;
        let updates: Vec<(Uuid, SubOrderUpdate)> = siblings
            .iter()
            .filter(|s| s.status != SubOrderStatus::Cancelled)
            .map(|s| {
                (
                    s.id,
                    SubOrderUpdate::status(SubOrderStatus::Cancelled).with_note(format!(
                        "Cancelled with parent order {}: {}",
                        aggregate.order_number, note
                    )),
                )
            })
            .collect();

        if let Err(err) = self.sub_orders.update_all(updates).await {
            return Err(OrchestrationError::PartialFailure {
                completed: "aggregate cancellation",
                failed: "sub-order cancellation cascade",
                source: Box::new(err.into()),
            });
        }

        // A rider reserved before pickup goes back into the pool.
        if let Some(rider_id) = aggregate.primary_rider {
            if let Err(err) = self.assignment.release(rider_id).await {
                return Err(OrchestrationError::PartialFailure {
                    completed: "sub-order cancellation cascade",
                    failed: "rider assignment release",
                    source: Box::new(err.into()),
                });
            }
        }

        self.notifier
            .emit(
                EventScope::MultiOrder(aggregate.id),
                "order_cancelled",
                json!({ "reason": note }),
            )
            .await;
        self.notifier
            .notify(
                aggregate.customer_id,
                Notification::new(
                    NotificationKind::Cancellation,
                    "Order cancelled",
                    format!("Order {} was cancelled: {}", aggregate.order_number, note),
                )
                .with_data(json!({ "multi_order_id": aggregate.id })),
            )
            .await;

        Ok(aggregate)
    }

    /// Append one GPS sample from the assigned rider to the location log.
    pub async fn record_rider_location(
        &self,
        multi_order_id: Uuid,
        rider_id: Uuid,
        lat: f64,
        lng: f64,
    ) -> Result<(), OrchestrationError> {
        retry_on_transient(&self.retry, || {
            let this = self;
            async move {
                let mut aggregate = this
                    .multi_orders
                    .get(multi_order_id)
                    .await
                    .map_err(OrchestrationError::lookup)?;

                aggregate.ensure_primary_rider(rider_id)?;
                aggregate.record_rider_location(lat, lng, Utc::now());

                let expected = aggregate.version;
                this.multi_orders.update(&aggregate, expected).await?;
                Ok::<_, OrchestrationError>(())
            }
        })
        .await?;

        self.notifier
            .emit(
                EventScope::MultiOrder(multi_order_id),
                "rider_location",
                json!({ "lat": lat, "lng": lng }),
            )
            .await;

        Ok(())
    }

    /// Read-through accessor for collaborators.
    pub async fn get(&self, multi_order_id: Uuid) -> Result<MultiOrderAggregate, OrchestrationError> {
        self.multi_orders
            .get(multi_order_id)
            .await
            .map_err(OrchestrationError::lookup)
    }
}
