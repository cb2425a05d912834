use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use multiorder::domain::multi_order::{
    ActorRole, MultiOrderStatus, OrderItem, Pricing, RestaurantCart, SubOrderStatus,
};
use multiorder::orchestration::{NewMultiOrder, OrchestrationFacade};
use multiorder::ports::{Rider, SubOrderStore, SubOrderUpdate};
use multiorder::store::{
    InMemoryMultiOrderStore, InMemoryRiderDirectory, InMemorySubOrderStore,
    RecordingEventEmitter, RecordingNotificationSink,
};

fn cart(name: &str, items: Vec<(&str, u32, i64)>) -> RestaurantCart {
    let items: Vec<OrderItem> = items
        .into_iter()
        .map(|(name, quantity, unit_price)| OrderItem {
            name: name.to_string(),
            quantity,
            unit_price,
        })
        .collect();

    let subtotal: i64 = items.iter().map(|i| i.quantity as i64 * i.unit_price).sum();
    RestaurantCart {
        restaurant_id: Uuid::new_v4(),
        restaurant_name: name.to_string(),
        items,
        pricing: Pricing {
            subtotal,
            delivery_fee: 150,
            discount: 0,
            total: subtotal + 150,
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,multiorder=debug")),
        )
        .init();

    tracing::info!("🚀 Starting multi-restaurant order orchestration demo");

    // === 1. Wire the in-memory adapters ===
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

    // === 2. Checkout across three restaurants ===
    let customer_id = Uuid::new_v4();
    let order = facade
        .create_multi_order(NewMultiOrder {
            customer_id,
            carts: vec![
                cart("Momo Palace", vec![("Steam momo", 2, 450), ("Jhol momo", 1, 500)]),
                cart("Curry Corner", vec![("Chicken curry", 1, 800)]),
                cart("Sweet Tooth", vec![("Gulab jamun", 4, 120)]),
            ],
            pre_assigned_rider: None,
        })
        .await?;

    tracing::info!(
        "✅ Order {} created across {} restaurants, total {}",
        order.order_number,
        order.restaurant_count(),
        order.pricing.total
    );

    // === 3. Restaurants progress independently ===
    // Each restaurant mutates its own sub-order, then the change callback
    // recomputes the aggregated status.
    for status in [SubOrderStatus::Confirmed, SubOrderStatus::Preparing, SubOrderStatus::Ready] {
        for sub_order_id in &order.sub_orders {
            sub_orders
                .update(*sub_order_id, SubOrderUpdate::status(status))
                .await?;
            if let Some(updated) = facade.on_sub_order_status_changed(*sub_order_id).await? {
                tracing::info!("   aggregate now {}", updated.status);
            }
        }
    }

    // === 4. Assign a rider once everything is ready ===
    let rider_id = Uuid::new_v4();
    riders
        .add(Rider {
            id: rider_id,
            name: "Sita".to_string(),
            online: true,
            current_assignment: None,
            completed_orders: 12,
        })
        .await;

    facade.assign_rider(order.id, rider_id).await?;

    // === 5. Rider collects every restaurant's bag ===
    for sub_order_id in &order.sub_orders {
        let updated = facade
            .mark_sub_order_picked_up(order.id, *sub_order_id, rider_id)
            .await?;
        tracing::info!(
            "📦 Picked up {}/{} restaurants, aggregate {}",
            updated.pickup.picked_up_count(),
            updated.restaurant_count(),
            updated.status
        );
    }

    // === 6. Delivery run with a couple of location pings ===
    facade
        .update_delivery_status(order.id, rider_id, MultiOrderStatus::OnTheWay)
        .await?;
    facade.record_rider_location(order.id, rider_id, 27.7172, 85.3240).await?;
    facade.record_rider_location(order.id, rider_id, 27.7104, 85.3312).await?;

    let delivered = facade
        .update_delivery_status(order.id, rider_id, MultiOrderStatus::Delivered)
        .await?;
    tracing::info!("🎉 Order {} delivered", delivered.order_number);

    // === 7. Cancellation paths for contrast ===
    // A second order cancelled by the customer inside the 2-minute window.
    let second = facade
        .create_multi_order(NewMultiOrder {
            customer_id,
            carts: vec![cart("Momo Palace", vec![("Kothey momo", 1, 480)])],
            pre_assigned_rider: None,
        })
        .await?;
    facade
        .cancel(
            second.id,
            customer_id,
            ActorRole::Customer,
            Some("Ordered by mistake".to_string()),
        )
        .await?;
    tracing::info!("🛑 Order {} cancelled by customer", second.order_number);

    // === 8. Summary ===
    let final_state = facade.get(order.id).await?;
    tracing::info!("Status history of {}:", final_state.order_number);
    for entry in &final_state.status_history {
        tracing::info!(
            "   {} at {}{}",
            entry.status,
            entry.at.format("%H:%M:%S%.3f"),
            entry
                .note
                .as_deref()
                .map(|n| format!(" ({n})"))
                .unwrap_or_default()
        );
    }
    tracing::info!(
        "Notifications sent: {}, realtime events: {}",
        sink.sent().await.len(),
        emitter.events().await.len()
    );

    Ok(())
}
