use proptest::prelude::*;

use order_lifecycle::state_machine::{
    MilestoneType, OrderKind, PaymentOperation, PaymentStatus, TrackingAction, TrackingStatus,
};

pub fn order_kind_strategy() -> impl Strategy<Value = OrderKind> {
    prop::sample::select(OrderKind::ALL.to_vec())
}

pub fn tracking_status_strategy() -> impl Strategy<Value = TrackingStatus> {
    prop::sample::select(TrackingStatus::ALL.to_vec())
}

pub fn tracking_action_strategy() -> impl Strategy<Value = TrackingAction> {
    prop::sample::select(TrackingAction::ALL.to_vec())
}

pub fn payment_status_strategy() -> impl Strategy<Value = PaymentStatus> {
    prop::sample::select(PaymentStatus::ALL.to_vec())
}

pub fn payment_operation_strategy() -> impl Strategy<Value = PaymentOperation> {
    prop::sample::select(PaymentOperation::ALL.to_vec())
}

pub fn milestone_strategy() -> impl Strategy<Value = MilestoneType> {
    prop::sample::select(vec![MilestoneType::First, MilestoneType::Final])
}

/// Random walks of tracking actions, legal or not
pub fn action_sequence_strategy() -> impl Strategy<Value = Vec<TrackingAction>> {
    prop::collection::vec(tracking_action_strategy(), 1..25)
}
