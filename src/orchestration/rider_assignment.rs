use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::notify::BestEffortNotifier;
use crate::domain::multi_order::{MultiOrderAggregate, OrchestrationError};
use crate::ports::{
    EventScope, MultiOrderStore, Notification, NotificationKind, RiderDirectory, StoreError,
    SubOrderStore, SubOrderUpdate,
};
use crate::utils::retry::{retry_on_transient, RetryConfig};

// ============================================================================
// Rider Assignment Service
// ============================================================================
//
// Reserves a single courier for every restaurant in a multi-order:
// validates rider eligibility (online, not already working an order),
// prevents double-assignment on the aggregate, and performs the propagation
// cascade. No assignment may remain visible without the rider also marked
// busy, so a failed cascade rolls the primary rider back before the error
// is returned.
//
// ============================================================================

pub struct RiderAssignmentService {
    multi_orders: Arc<dyn MultiOrderStore>,
    sub_orders: Arc<dyn SubOrderStore>,
    riders: Arc<dyn RiderDirectory>,
    notifier: Arc<BestEffortNotifier>,
    retry: RetryConfig,
}

impl RiderAssignmentService {
    pub fn new(
        multi_orders: Arc<dyn MultiOrderStore>,
        sub_orders: Arc<dyn SubOrderStore>,
        riders: Arc<dyn RiderDirectory>,
        notifier: Arc<BestEffortNotifier>,
        retry: RetryConfig,
    ) -> Self {
        Self { multi_orders, sub_orders, riders, notifier, retry }
    }

    /// Assign `rider_id` as the primary rider of `multi_order_id` and
    /// propagate the assignment to every sub-order.
    pub async fn assign(
        &self,
        multi_order_id: Uuid,
        rider_id: Uuid,
    ) -> Result<MultiOrderAggregate, OrchestrationError> {
        let rider = self
            .riders
            .find_available(rider_id)
            .await
            .map_err(OrchestrationError::lookup)?;

        // Attach the rider under optimistic concurrency: a lost version race
        // reloads fresh state, so of two concurrent assignments exactly one
        // wins and the other observes the conflict.
        let rider_id = rider.id;
        let aggregate = retry_on_transient(&self.retry, || {
            let this = self;
            async move {
                let mut aggregate = this
                    .multi_orders
                    .get(multi_order_id)
                    .await
                    .map_err(OrchestrationError::lookup)?;

                aggregate.assign_rider(rider_id, Utc::now())?;

                let expected = aggregate.version;
                aggregate.version = this.multi_orders.update(&aggregate, expected).await?;
                Ok::<_, OrchestrationError>(aggregate)
            }
        })
        .await?;

        // Mark the rider busy before anything else becomes visible.
        if let Err(err) = self
            .riders
            .set_current_assignment(rider.id, Some(aggregate.order_number.clone()))
            .await
        {
            self.rollback(multi_order_id).await;
            return Err(OrchestrationError::PartialFailure {
                completed: "primary rider attached",
                failed: "rider busy marker",
                source: Box::new(err.into()),
            });
        }

        // Propagate to every sub-order in one all-or-nothing batch.
        let updates: Vec<(Uuid, SubOrderUpdate)> = aggregate
            .sub_orders
            .iter()
            .map(|id| {
                (*id, SubOrderUpdate { delivery_rider: Some(rider.id), ..Default::default() })
            })
            .collect();

        if let Err(err) = self.sub_orders.update_all(updates).await {
            let _ = self.riders.set_current_assignment(rider.id, None).await;
            self.rollback(multi_order_id).await;
            return Err(OrchestrationError::PartialFailure {
                completed: "primary rider attached",
                failed: "sub-order rider propagation",
                source: Box::new(err.into()),
            });
        }

        tracing::info!(
            multi_order = %aggregate.order_number,
            rider = %rider.id,
            sub_orders = aggregate.sub_orders.len(),
            "Rider assigned"
        );

        self.notifier
            .notify(
                rider.id,
                Notification::new(
                    NotificationKind::RiderAssignment,
                    "New delivery assignment",
                    format!(
                        "You have been assigned order {} ({} restaurants)",
                        aggregate.order_number,
                        aggregate.restaurant_count()
                    ),
                )
                .with_data(json!({ "multi_order_id": aggregate.id })),
            )
            .await;

        // Let each restaurant's tracking view see the rider attached.
        for sub_order_id in &aggregate.sub_orders {
            self.notifier
                .emit(
                    EventScope::SubOrder(*sub_order_id),
                    "rider_assigned",
                    json!({ "rider_id": rider.id, "rider_name": rider.name }),
                )
                .await;
        }

        Ok(aggregate)
    }

    /// Release the rider attached to a multi-order (cancellation before
    /// pickup). Best-effort on the directory side.
    pub async fn release(&self, rider_id: Uuid) -> Result<(), StoreError> {
        self.riders.set_current_assignment(rider_id, None).await
    }

    /// Settle the rider's books after a completed delivery: the completed
    /// counter grows by one per sub-order and the assignment is released.
    pub async fn credit_delivery(&self, rider_id: Uuid, completed: u64) -> Result<(), StoreError> {
        self.riders.increment_completed_orders(rider_id, completed).await?;
        self.riders.set_current_assignment(rider_id, None).await
    }

    /// Best-effort compensation: detach the primary rider again so a failed
    /// cascade does not leave a half-visible assignment.
    async fn rollback(&self, multi_order_id: Uuid) {
        let result = retry_on_transient(&self.retry, || {
            let this = self;
            async move {
                let mut aggregate = this.multi_orders.get(multi_order_id).await?;
                aggregate.clear_rider(Utc::now());
                let expected = aggregate.version;
                this.multi_orders.update(&aggregate, expected).await?;
                Ok::<_, StoreError>(())
            }
        })
        .await;

        if let Err(error) = result {
            tracing::error!(
                %multi_order_id,
                %error,
                "Failed to roll back rider assignment; aggregate left inconsistent"
            );
        }
    }
}
