// ============================================================================
// Orchestration Layer
// ============================================================================
//
// Drives the multi-order aggregate through the collaborator ports: the
// facade is the single entry point, the rider assignment service owns the
// reservation cascade, and the best-effort notifier guards the
// fire-and-forget channels.
//
// ============================================================================

pub mod facade;
pub mod notify;
pub mod rider_assignment;

#[cfg(test)]
mod tests;

pub use facade::{NewMultiOrder, OrchestrationFacade};
pub use notify::BestEffortNotifier;
pub use rider_assignment::RiderAssignmentService;
