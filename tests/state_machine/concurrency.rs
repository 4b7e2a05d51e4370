use std::sync::Arc;

use uuid::Uuid;

use order_lifecycle::config::LifecycleConfig;
use order_lifecycle::database::InMemoryOrderStore;
use order_lifecycle::models::Pagination;
use order_lifecycle::state_machine::{
    StateMachineError, TrackingAction, TrackingStatus, TransitionRequest,
};

use crate::common::{BarrierStore, Harness};

#[tokio::test]
async fn test_concurrent_transitions_on_same_version_conflict() {
    let store = Arc::new(BarrierStore::new(InMemoryOrderStore::new(), 2));
    let harness = Harness::with_store(store.clone(), LifecycleConfig::default());
    let order = harness.bulk_order(Uuid::new_v4()).await;
    harness
        .advance(order.id, &[TrackingAction::SendQuotation])
        .await;

    store.arm(2);
    let approve = harness.machine.apply_transition(TransitionRequest::new(
        order.id,
        TrackingAction::ApproveQuotation,
        harness.admin,
    ));
    let reject = harness.machine.apply_transition(
        TransitionRequest::new(order.id, TrackingAction::RejectQuotation, harness.admin)
            .with_note("buyer asked for a new quote"),
    );
    let (approve, reject) = tokio::join!(approve, reject);

    let results = [approve, reject];
    let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(winners.len(), 1, "exactly one request may commit");
    let conflict = results
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one request must lose");
    assert!(matches!(
        conflict,
        StateMachineError::Conflict { expected_version: 1, .. }
    ));
    assert!(conflict.is_retryable());

    let reloaded = harness.machine.order(order.id).await.unwrap();
    assert_eq!(reloaded.version, 2);
    assert!(matches!(
        reloaded.tracking_status,
        TrackingStatus::Confirmed | TrackingStatus::Created
    ));
    let log = harness
        .machine
        .tracking_log(order.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(log.total, 2);
}

#[tokio::test]
async fn test_loser_can_retry_against_new_state() {
    let store = Arc::new(BarrierStore::new(InMemoryOrderStore::new(), 2));
    let harness = Harness::with_store(store.clone(), LifecycleConfig::default());
    let order = harness.bulk_order(Uuid::new_v4()).await;

    store.arm(2);
    let first = harness.machine.apply_transition(TransitionRequest::new(
        order.id,
        TrackingAction::SendQuotation,
        harness.admin,
    ));
    let second = harness.machine.apply_transition(TransitionRequest::new(
        order.id,
        TrackingAction::SendQuotation,
        harness.admin,
    ));
    let (first, second) = tokio::join!(first, second);
    assert_eq!(
        usize::from(first.is_ok()) + usize::from(second.is_ok()),
        1
    );

    // retrying after the conflict re-reads the order and sees the move is gone
    let err = harness
        .machine
        .apply_transition(TransitionRequest::new(
            order.id,
            TrackingAction::SendQuotation,
            harness.admin,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StateMachineError::InvalidTransition { .. }));
}
