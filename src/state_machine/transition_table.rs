//! Static transition tables, one per order kind.
//!
//! Every legal move is a `(kind, from, action) -> to` row in a `match`; anything
//! not listed is illegal. Cancellation and refund apply to every kind.

use super::events::TrackingAction;
use super::states::{OrderKind, TrackingStatus};

/// Lookup over the per-kind tracking transition graph
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionTable;

impl TransitionTable {
    /// Destination of `action` from `from`, or `None` when the move is illegal
    pub fn is_legal(
        kind: OrderKind,
        from: TrackingStatus,
        action: TrackingAction,
    ) -> Option<TrackingStatus> {
        use TrackingAction as A;
        use TrackingStatus as S;

        match (from, action) {
            (S::Delivered | S::Canceled, A::Refund) => return Some(S::Refunded),
            (from, A::Cancel) if !from.is_terminal() => return Some(S::Canceled),
            (from, _) if from.is_terminal() => return None,
            _ => {}
        }

        match kind {
            OrderKind::BulkPurchaseOrder => bulk_transition(from, action),
            OrderKind::PurchaseOrder => sample_transition(from, action),
            OrderKind::SellerPurchaseOrder => seller_transition(from, action),
        }
    }

    /// Actions that are legal from `from`, in declaration order
    pub fn legal_actions(kind: OrderKind, from: TrackingStatus) -> Vec<TrackingAction> {
        TrackingAction::ALL
            .into_iter()
            .filter(|action| Self::is_legal(kind, from, *action).is_some())
            .collect()
    }

    /// Every `(from, action, to)` row for `kind`
    pub fn edges(kind: OrderKind) -> Vec<(TrackingStatus, TrackingAction, TrackingStatus)> {
        let mut edges = Vec::new();
        for from in TrackingStatus::ALL {
            for action in TrackingAction::ALL {
                if let Some(to) = Self::is_legal(kind, from, action) {
                    edges.push((from, action, to));
                }
            }
        }
        edges
    }

    /// States a newly created order of `kind` can eventually reach
    pub fn reachable_states(kind: OrderKind) -> Vec<TrackingStatus> {
        let mut reached = vec![TrackingStatus::Created];
        let mut frontier = vec![TrackingStatus::Created];
        while let Some(state) = frontier.pop() {
            for action in Self::legal_actions(kind, state) {
                if let Some(next) = Self::is_legal(kind, state, action) {
                    if !reached.contains(&next) {
                        reached.push(next);
                        frontier.push(next);
                    }
                }
            }
        }
        reached
    }
}

fn bulk_transition(from: TrackingStatus, action: TrackingAction) -> Option<TrackingStatus> {
    use TrackingAction as A;
    use TrackingStatus as S;

    let to = match (from, action) {
        (S::Created, A::SendQuotation) => S::QuotationSent,
        (S::QuotationSent, A::ApproveQuotation) => S::Confirmed,
        (S::QuotationSent, A::RejectQuotation) => S::Created,
        (S::Confirmed, A::MarkRawMaterial) => S::RawMaterial,
        (S::RawMaterial, A::MarkPps) => S::Pps,
        (S::RawMaterial | S::Pps, A::MarkProduction) => S::Production,
        (S::Production, A::MarkQc) => S::Qc,
        (S::Qc, A::BuyerApproveQc) => S::Submit,
        (S::Submit, A::MarkDelivering) => S::Delivering,
        (S::Delivering, A::ConfirmDelivered | A::MarkDelivered) => S::Delivered,
        _ => return None,
    };
    Some(to)
}

fn sample_transition(from: TrackingStatus, action: TrackingAction) -> Option<TrackingStatus> {
    use TrackingAction as A;
    use TrackingStatus as S;

    let to = match (from, action) {
        (S::Created | S::DesignRejected, A::UpdateDesign) => S::WaitingForApproval,
        (S::WaitingForApproval, A::ApproveDesign) => S::DesignApproved,
        (S::WaitingForApproval, A::RejectDesign) => S::DesignRejected,
        (S::DesignApproved, A::MarkRawMaterial) => S::RawMaterial,
        (S::DesignApproved | S::RawMaterial, A::MarkMaking) => S::Making,
        (S::Making, A::MarkSubmit) => S::Submit,
        (S::Submit, A::MarkDelivering) => S::Delivering,
        (S::Delivering, A::ConfirmDelivered | A::MarkDelivered) => S::Delivered,
        _ => return None,
    };
    Some(to)
}

fn seller_transition(from: TrackingStatus, action: TrackingAction) -> Option<TrackingStatus> {
    use TrackingAction as A;
    use TrackingStatus as S;

    let to = match (from, action) {
        (S::Created, A::SellerApprovePo) => S::Confirmed,
        (S::Created, A::SellerRejectPo) => S::PoRejected,
        (S::Confirmed, A::MarkRawMaterial) => S::RawMaterial,
        (S::RawMaterial, A::MarkPps) => S::Pps,
        (S::RawMaterial | S::Pps, A::MarkProduction) => S::Production,
        (S::Production, A::MarkInspection) => S::Inspection,
        (S::Production | S::Inspection, A::MarkQc) => S::Qc,
        (S::Qc, A::BuyerApproveQc) => S::Submit,
        (S::Submit, A::MarkDelivering) => S::Delivering,
        (S::Delivering, A::MarkDelivered) => S::Delivered,
        _ => return None,
    };
    Some(to)
}
