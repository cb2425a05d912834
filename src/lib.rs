// ============================================================================
// multiorder - Multi-Restaurant Order Orchestration Core
// ============================================================================
//
// Aggregates N independently-progressing restaurant sub-orders into one
// customer-facing multi-order: deterministic status aggregation, single-rider
// pickup sequencing, cancellation windows and delivery settlement.
//
// Layering:
// - domain:        pure business logic (aggregate, aggregation rule, tracker)
// - ports:         collaborator interfaces (stores, rider directory, sinks)
// - store:         in-memory reference adapters
// - orchestration: the facade driving aggregate transitions
// - utils:         retry and circuit-breaker building blocks
//
// ============================================================================

pub mod domain;
pub mod orchestration;
pub mod ports;
pub mod store;
pub mod utils;

pub use domain::multi_order::{
    aggregate_status, ActorRole, MultiOrderAggregate, MultiOrderStatus, OrchestrationError,
    OrderNumber, PickupTracker, Pricing, RestaurantCart, SubOrderStatus,
};
pub use orchestration::{NewMultiOrder, OrchestrationFacade};
