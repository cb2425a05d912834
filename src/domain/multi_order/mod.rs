// ============================================================================
// Multi-Order Domain - Business Logic for the Multi-Restaurant Aggregate
// ============================================================================
//
// This module contains ALL multi-order-specific code:
// - Value objects (statuses, roles, order number, pricing)
// - Status aggregation rule (sub-order statuses -> parent status)
// - Pickup tracker (per-restaurant ready/picked-up sequencing)
// - Errors (OrchestrationError enum)
// - Aggregate (MultiOrderAggregate with business logic)
//
// This layer is pure domain logic: no I/O, no collaborator calls. The
// orchestration layer drives it through the collaborator ports.
//
// ============================================================================

pub mod aggregate;
pub mod aggregator;
pub mod errors;
pub mod pickup;
pub mod value_objects;

// Re-export for convenience
pub use aggregate::*;
pub use aggregator::*;
pub use errors::*;
pub use pickup::*;
pub use value_objects::*;
