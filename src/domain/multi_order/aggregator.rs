use super::value_objects::{MultiOrderStatus, SubOrderStatus};

// ============================================================================
// Status Aggregation Rule
// ============================================================================
//
// Maps the multiset of sub-order statuses to the parent's aggregated status.
// Pure and order-independent: only which statuses appear (and whether all
// entries share one) matters, never their position.
//
// The precedence order below resolves overlapping conditions and is part of
// the compatibility contract. Do not reorder.
//
// ============================================================================

/// Compute the aggregated multi-order status from its sub-order statuses.
///
/// First matching rule wins:
/// 1.  all cancelled                              -> cancelled
/// 2.  all delivered                              -> delivered
/// 3.  any on_the_way                             -> on_the_way
/// 4.  all in {picked_up, on_the_way, delivered}  -> picked_up
/// 5.  any picked_up                              -> picking_up
/// 6.  all ready                                  -> all_ready
/// 7.  any ready                                  -> partially_ready
/// 8.  any preparing                              -> preparing
/// 9.  all in {confirmed, preparing, ready}       -> all_confirmed
/// 10. any confirmed                              -> partially_confirmed
/// 11. otherwise                                  -> pending
///
/// An empty slice falls back to `pending`; creation always populates at
/// least one sub-order so the case is unreachable in practice.
///
/// Note: a mix of `cancelled` and active statuses matches none of the rules
/// above the fallback and yields `pending`. Partial cancellation has no
/// dedicated aggregate status; the rule ordering is kept for compatibility.
pub fn aggregate_status(statuses: &[SubOrderStatus]) -> MultiOrderStatus {
    use SubOrderStatus::*;

    if statuses.is_empty() {
        return MultiOrderStatus::Pending;
    }

    let all = |predicate: fn(SubOrderStatus) -> bool| statuses.iter().all(|s| predicate(*s));
    let any = |status: SubOrderStatus| statuses.contains(&status);

    if all(|s| s == Cancelled) {
        MultiOrderStatus::Cancelled
    } else if all(|s| s == Delivered) {
        MultiOrderStatus::Delivered
    } else if any(OnTheWay) {
        MultiOrderStatus::OnTheWay
    } else if all(|s| matches!(s, PickedUp | OnTheWay | Delivered)) {
        MultiOrderStatus::PickedUp
    } else if any(PickedUp) {
        MultiOrderStatus::PickingUp
    } else if all(|s| s == Ready) {
        MultiOrderStatus::AllReady
    } else if any(Ready) {
        MultiOrderStatus::PartiallyReady
    } else if any(Preparing) {
        MultiOrderStatus::Preparing
    } else if all(|s| matches!(s, Confirmed | Preparing | Ready)) {
        MultiOrderStatus::AllConfirmed
    } else if any(Confirmed) {
        MultiOrderStatus::PartiallyConfirmed
    } else {
        MultiOrderStatus::Pending
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
