// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Aggregates and pure business rules, completely separate from the
// collaborator ports and the orchestration layer.
//
// ============================================================================

pub mod multi_order;
