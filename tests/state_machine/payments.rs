use std::sync::Arc;

use uuid::Uuid;

use order_lifecycle::config::LifecycleConfig;
use order_lifecycle::database::InMemoryOrderStore;
use order_lifecycle::messaging::QueuedTask;
use order_lifecycle::models::{NewOrder, Order, Pagination};
use order_lifecycle::state_machine::{
    Actor, MilestoneType, OrderKind, PaymentStatus, PaymentTarget, StateMachineError,
    TrackingAction, TransitionContext,
};

use crate::common::{reference, FlakyStore, Harness};

async fn checkout_session(harness: &Harness, session_id: &str, count: usize) -> Vec<Order> {
    let buyer = Uuid::new_v4();
    let mut orders = Vec::with_capacity(count);
    for _ in 0..count {
        orders.push(
            harness
                .create(
                    NewOrder::new(reference("BPO"), OrderKind::BulkPurchaseOrder, buyer)
                        .with_checkout_session(session_id),
                )
                .await,
        );
    }
    orders.sort_by_key(|order| order.id);
    orders
}

#[tokio::test]
async fn test_split_payment_submit_then_confirm() {
    let harness = Harness::new();
    let buyer = Actor::buyer(Uuid::new_v4());
    let order = harness.bulk_order(buyer.user_id).await;

    let report = harness
        .payments
        .submit_payment(
            PaymentTarget::Order(order.id),
            MilestoneType::First,
            TransitionContext::new(buyer),
        )
        .await
        .unwrap();
    assert!(report.changed());
    assert_eq!(report.orders[0].payment_status, PaymentStatus::FirstPaymentPending);
    let tasks = harness.drain_queue().await;
    assert!(tasks.iter().any(|task| matches!(
        task,
        QueuedTask::NotifyAdminConfirmPayment { milestone: MilestoneType::First, .. }
    )));

    let report = harness
        .payments
        .mark_paid(
            PaymentTarget::Order(order.id),
            MilestoneType::First,
            TransitionContext::new(harness.admin),
        )
        .await
        .unwrap();
    assert_eq!(
        report.orders[0].payment_status,
        PaymentStatus::FirstPaymentConfirmed
    );
    // tracking status is untouched by payments
    assert_eq!(report.orders[0].tracking_status, order.tracking_status);
    let entry = &report.entries[0];
    assert_eq!(entry.action, "mark_paid:first");
    assert_eq!(entry.payment_from, Some(PaymentStatus::FirstPaymentPending));
    assert_eq!(entry.payment_to, Some(PaymentStatus::FirstPaymentConfirmed));

    let tasks = harness.drain_queue().await;
    assert!(tasks.iter().any(|task| matches!(
        task,
        QueuedTask::CreatePaymentInvoice { order_id, milestone: MilestoneType::First, approved_by_user_id }
            if *order_id == order.id && *approved_by_user_id == harness.admin.user_id
    )));

    let milestones = harness.payments.milestones(order.id).await.unwrap();
    assert_eq!(milestones.len(), 1);
    assert!(milestones[0].paid);
    assert_eq!(milestones[0].approved_by_user_id, Some(harness.admin.user_id));
}

#[tokio::test]
async fn test_confirming_twice_is_logged_without_side_effects() {
    let harness = Harness::new();
    let order = harness.bulk_order(Uuid::new_v4()).await;
    let context = TransitionContext::new(harness.admin);

    harness
        .payments
        .mark_paid(PaymentTarget::Order(order.id), MilestoneType::First, context)
        .await
        .unwrap();
    harness.drain_queue().await;
    let before = harness.payments.milestones(order.id).await.unwrap();

    // a second admin re-confirms; the original approval stands
    let other_admin = Actor::admin(Uuid::new_v4());
    let report = harness
        .payments
        .mark_paid(
            PaymentTarget::Order(order.id),
            MilestoneType::First,
            TransitionContext::new(other_admin),
        )
        .await
        .unwrap();

    assert!(!report.changed());
    assert_eq!(report.dispatch.enqueued, 0);
    assert!(harness.queue.is_empty().await);
    let log = harness
        .machine
        .tracking_log(order.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(log.total, 2);
    assert!(log.items[0].is_no_op());
    assert_eq!(log.items[0].actor_user_id, other_admin.user_id);

    let after = harness.payments.milestones(order.id).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after[0].approved_by_user_id, Some(harness.admin.user_id));
}

#[tokio::test]
async fn test_no_op_unmark_creates_no_milestone() {
    let harness = Harness::new();
    let order = harness.bulk_order(Uuid::new_v4()).await;

    let report = harness
        .payments
        .mark_unpaid(
            PaymentTarget::Order(order.id),
            MilestoneType::Final,
            TransitionContext::new(harness.admin).with_note("nothing was paid"),
        )
        .await
        .unwrap();

    assert!(!report.changed());
    assert_eq!(report.orders[0].payment_status, PaymentStatus::Unpaid);
    assert!(harness.payments.milestones(order.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_final_payment_requires_first() {
    let harness = Harness::new();
    let order = harness.bulk_order(Uuid::new_v4()).await;

    let err = harness
        .payments
        .mark_paid(
            PaymentTarget::Order(order.id),
            MilestoneType::Final,
            TransitionContext::new(harness.admin),
        )
        .await
        .unwrap_err();

    match err {
        StateMachineError::InvalidTransition {
            from,
            action,
            legal_actions,
            ..
        } => {
            assert_eq!(from, "unpaid");
            assert_eq!(action, "mark_paid:final");
            assert!(legal_actions.contains(&"submit_payment:first".to_string()));
            assert!(legal_actions.contains(&"mark_paid:first".to_string()));
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
}

#[tokio::test]
async fn test_confirmed_final_payment_cannot_be_unmarked() {
    let harness = Harness::new();
    let order = harness.bulk_order(Uuid::new_v4()).await;
    let context = TransitionContext::new(harness.admin);
    for milestone in [MilestoneType::First, MilestoneType::Final] {
        harness
            .payments
            .mark_paid(PaymentTarget::Order(order.id), milestone, context.clone())
            .await
            .unwrap();
    }

    let err = harness
        .payments
        .mark_unpaid(PaymentTarget::Order(order.id), MilestoneType::Final, context)
        .await
        .unwrap_err();
    assert!(matches!(err, StateMachineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_single_payment_kinds() {
    let harness = Harness::new();
    let buyer = Actor::buyer(Uuid::new_v4());
    let order = harness
        .create(NewOrder::new(
            reference("PO"),
            OrderKind::PurchaseOrder,
            buyer.user_id,
        ))
        .await;

    let report = harness
        .payments
        .submit_payment(
            PaymentTarget::Order(order.id),
            MilestoneType::First,
            TransitionContext::new(buyer),
        )
        .await
        .unwrap();
    assert_eq!(report.orders[0].payment_status, PaymentStatus::PaymentPending);

    let err = harness
        .payments
        .mark_paid(
            PaymentTarget::Order(order.id),
            MilestoneType::Final,
            TransitionContext::new(harness.admin),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StateMachineError::InvalidTransition { .. }));

    let reverted = harness
        .payments
        .mark_unpaid(
            PaymentTarget::Order(order.id),
            MilestoneType::First,
            TransitionContext::new(harness.admin),
        )
        .await
        .unwrap();
    assert_eq!(reverted.orders[0].payment_status, PaymentStatus::Unpaid);
}

#[tokio::test]
async fn test_buyer_cannot_confirm_payment() {
    let harness = Harness::new();
    let buyer = Actor::buyer(Uuid::new_v4());
    let order = harness.bulk_order(buyer.user_id).await;

    let err = harness
        .payments
        .mark_paid(
            PaymentTarget::Order(order.id),
            MilestoneType::First,
            TransitionContext::new(buyer),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StateMachineError::Unauthorized { .. }));
}

#[tokio::test]
async fn test_checkout_session_siblings_move_together() {
    let harness = Harness::new();
    let orders = checkout_session(&harness, "cs_together", 3).await;

    let report = harness
        .payments
        .mark_paid(
            PaymentTarget::Order(orders[1].id),
            MilestoneType::First,
            TransitionContext::new(harness.admin),
        )
        .await
        .unwrap();

    assert_eq!(report.orders.len(), 3);
    assert_eq!(report.entries.len(), 3);
    for order in &orders {
        let reloaded = harness.machine.order(order.id).await.unwrap();
        assert_eq!(reloaded.payment_status, PaymentStatus::FirstPaymentConfirmed);
        let milestones = harness.payments.milestones(order.id).await.unwrap();
        assert_eq!(milestones[0].checkout_session_id.as_deref(), Some("cs_together"));
        assert!(milestones[0].paid);
    }
}

#[tokio::test]
async fn test_one_invalid_sibling_blocks_the_whole_session() {
    let harness = Harness::new();
    let orders = checkout_session(&harness, "cs_blocked", 3).await;
    harness
        .advance(orders[2].id, &[TrackingAction::Cancel, TrackingAction::Refund])
        .await;

    let err = harness
        .payments
        .mark_paid(
            PaymentTarget::CheckoutSession("cs_blocked".to_string()),
            MilestoneType::First,
            TransitionContext::new(harness.admin),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StateMachineError::InvalidTransition { .. }));

    for order in &orders[..2] {
        let reloaded = harness.machine.order(order.id).await.unwrap();
        assert_eq!(reloaded.payment_status, PaymentStatus::Unpaid);
        assert_eq!(reloaded.version, 0);
    }
}

#[tokio::test]
async fn test_unknown_checkout_session() {
    let harness = Harness::new();
    let err = harness
        .payments
        .mark_paid(
            PaymentTarget::CheckoutSession("cs_missing".to_string()),
            MilestoneType::First,
            TransitionContext::new(harness.admin),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StateMachineError::NotFound { entity: "checkout_session", .. }
    ));
}

fn fast_compensation() -> LifecycleConfig {
    let mut config = LifecycleConfig::default();
    config.executor.compensation_retries = 2;
    config.executor.compensation_backoff_ms = 1;
    config
}

#[tokio::test]
async fn test_partial_sibling_commit_is_compensated() {
    let store = Arc::new(FlakyStore::new(InMemoryOrderStore::new()));
    let harness = Harness::with_store(store.clone(), fast_compensation());
    let orders = checkout_session(&harness, "cs_flaky", 3).await;
    // the first row must succeed for the default batch to report a partial result
    store.fail_commits(orders[2].id, 1);

    let report = harness
        .payments
        .mark_paid(
            PaymentTarget::CheckoutSession("cs_flaky".to_string()),
            MilestoneType::First,
            TransitionContext::new(harness.admin),
        )
        .await
        .unwrap();

    assert_eq!(report.orders.len(), 3);
    for order in &orders {
        let reloaded = harness.machine.order(order.id).await.unwrap();
        assert_eq!(reloaded.payment_status, PaymentStatus::FirstPaymentConfirmed);
    }
}

#[tokio::test]
async fn test_exhausted_compensation_reports_pending_siblings() {
    let store = Arc::new(FlakyStore::new(InMemoryOrderStore::new()));
    let harness = Harness::with_store(store.clone(), fast_compensation());
    let orders = checkout_session(&harness, "cs_stuck", 3).await;
    store.fail_commits(orders[2].id, 100);

    let err = harness
        .payments
        .mark_paid(
            PaymentTarget::CheckoutSession("cs_stuck".to_string()),
            MilestoneType::First,
            TransitionContext::new(harness.admin),
        )
        .await
        .unwrap_err();

    match &err {
        StateMachineError::PartialMultiOrderFailure {
            checkout_session_id,
            applied,
            pending,
        } => {
            assert_eq!(checkout_session_id, "cs_stuck");
            assert_eq!(applied, &vec![orders[0].id, orders[1].id]);
            assert_eq!(pending, &vec![orders[2].id]);
        }
        other => panic!("expected PartialMultiOrderFailure, got {other:?}"),
    }
    assert!(err.is_retryable());

    // applied siblings stay applied and still got their side effects
    let applied = harness.machine.order(orders[0].id).await.unwrap();
    assert_eq!(applied.payment_status, PaymentStatus::FirstPaymentConfirmed);
    let stuck = harness.machine.order(orders[2].id).await.unwrap();
    assert_eq!(stuck.payment_status, PaymentStatus::Unpaid);
    assert!(harness
        .queue
        .pending_tasks()
        .await
        .iter()
        .any(|task| matches!(task, QueuedTask::CreatePaymentInvoice { order_id, .. } if *order_id == orders[0].id)));
}
