use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use order_lifecycle::config::LifecycleConfig;
use order_lifecycle::database::InMemoryOrderStore;
use order_lifecycle::messaging::{
    CrmEvent, EnqueueOptions, MessagingError, NotificationType, QueuedTask, ReceivedTask,
    SideEffectDispatcher, TaskQueue,
};
use order_lifecycle::models::NewOrder;
use order_lifecycle::state_machine::{
    Actor, OrderKind, OrderStateMachine, OrderStore, RoleBasedPolicy, StateMachineError,
    TrackingAction, TrackingStatus, TransitionRequest,
};

use crate::common::{reference, Harness};

/// Queue that is down for every operation
struct UnavailableQueue;

#[async_trait]
impl TaskQueue for UnavailableQueue {
    async fn enqueue(&self, _: QueuedTask, _: EnqueueOptions) -> Result<i64, MessagingError> {
        Err(MessagingError::unavailable("queue offline"))
    }

    async fn receive_due(
        &self,
        _: usize,
        _: Duration,
    ) -> Result<Vec<ReceivedTask>, MessagingError> {
        Err(MessagingError::unavailable("queue offline"))
    }

    async fn ack(&self, _: i64) -> Result<(), MessagingError> {
        Err(MessagingError::unavailable("queue offline"))
    }

    async fn retry(&self, _: i64, _: Duration) -> Result<(), MessagingError> {
        Err(MessagingError::unavailable("queue offline"))
    }

    async fn archive(&self, _: i64) -> Result<(), MessagingError> {
        Err(MessagingError::unavailable("queue offline"))
    }

    fn queue_name(&self) -> &str {
        "offline"
    }
}

#[tokio::test]
async fn test_transition_enqueues_crm_notification_and_deal_sync() {
    let harness = Harness::new();
    let buyer = Uuid::new_v4();
    let order = harness.bulk_order(buyer).await;

    let outcome = harness
        .machine
        .apply_transition(TransitionRequest::new(
            order.id,
            TrackingAction::SendQuotation,
            harness.admin,
        ))
        .await
        .unwrap();
    assert_eq!(outcome.dispatch.enqueued, 3);
    assert!(outcome.dispatch.is_clean());

    let tasks = harness.queue.pending_tasks().await;
    assert!(tasks.iter().any(|task| matches!(
        task,
        QueuedTask::TrackCrmEvent { user_id, event: CrmEvent::BulkPoSendQuotation, .. }
            if *user_id == buyer
    )));
    assert!(tasks.iter().any(|task| matches!(
        task,
        QueuedTask::CreateUserNotification {
            user_id,
            notification_type: NotificationType::OrderStatusChanged,
            message,
            ..
        } if *user_id == buyer && message.ends_with("moved from created to quotation_sent")
    )));
    assert!(tasks
        .iter()
        .any(|task| matches!(task, QueuedTask::SyncCrmDeal { order_id, .. } if *order_id == order.id)));
}

#[tokio::test]
async fn test_queue_outage_does_not_roll_back_the_transition() {
    let config = Arc::new(LifecycleConfig::default());
    let store = Arc::new(InMemoryOrderStore::new());
    let dispatcher = Arc::new(SideEffectDispatcher::new(
        Arc::new(UnavailableQueue),
        config.queue.clone(),
    ));
    let machine =
        OrderStateMachine::new(store, dispatcher, Arc::new(RoleBasedPolicy), config);
    let order = machine
        .create_order(NewOrder::new(
            reference("BPO"),
            OrderKind::BulkPurchaseOrder,
            Uuid::new_v4(),
        ))
        .await
        .unwrap();

    let outcome = machine
        .apply_transition(TransitionRequest::new(
            order.id,
            TrackingAction::SendQuotation,
            Actor::admin(Uuid::new_v4()),
        ))
        .await
        .unwrap();

    assert_eq!(outcome.dispatch.enqueued, 0);
    assert_eq!(outcome.dispatch.failed, 3);
    let reloaded = machine.order(order.id).await.unwrap();
    assert_eq!(reloaded.tracking_status, TrackingStatus::QuotationSent);
}

#[tokio::test]
async fn test_failed_schedule_enqueue_restores_the_marker() {
    let config = Arc::new(LifecycleConfig::default());
    let store = Arc::new(InMemoryOrderStore::new());
    let dispatcher = Arc::new(SideEffectDispatcher::new(
        Arc::new(UnavailableQueue),
        config.queue.clone(),
    ));
    let machine =
        OrderStateMachine::new(store.clone(), dispatcher, Arc::new(RoleBasedPolicy), config);
    let admin = Actor::admin(Uuid::new_v4());
    let order = machine
        .create_order(NewOrder::new(
            reference("BPO"),
            OrderKind::BulkPurchaseOrder,
            Uuid::new_v4(),
        ))
        .await
        .unwrap();

    let err = machine
        .schedule_transition(
            order.id,
            TrackingAction::SendQuotation,
            admin,
            Utc::now() + chrono::Duration::hours(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StateMachineError::Messaging(_)));
    assert_eq!(machine.order(order.id).await.unwrap().scheduled_transition_at, None);

    // an earlier schedule that did reach the queue keeps its marker
    let earlier = Utc::now() + chrono::Duration::minutes(30);
    store
        .set_scheduled_transition_at(order.id, Some(earlier))
        .await
        .unwrap();
    machine
        .schedule_transition(
            order.id,
            TrackingAction::SendQuotation,
            admin,
            Utc::now() + chrono::Duration::hours(2),
        )
        .await
        .unwrap_err();
    assert_eq!(
        machine.order(order.id).await.unwrap().scheduled_transition_at,
        Some(earlier)
    );
}

#[tokio::test]
async fn test_seller_order_events_target_the_seller() {
    let harness = Harness::new();
    let buyer = Uuid::new_v4();
    let seller = Actor::seller(Uuid::new_v4());
    let order = harness
        .create(
            NewOrder::new(reference("SPO"), OrderKind::SellerPurchaseOrder, buyer)
                .with_seller(seller.user_id),
        )
        .await;

    harness
        .machine
        .apply_transition(TransitionRequest::new(
            order.id,
            TrackingAction::SellerApprovePo,
            seller,
        ))
        .await
        .unwrap();

    let tasks = harness.queue.pending_tasks().await;
    assert!(tasks.iter().any(|task| matches!(
        task,
        QueuedTask::TrackCrmEvent { user_id, event: CrmEvent::SellerPoApproved, .. }
            if *user_id == seller.user_id
    )));
    assert!(!tasks
        .iter()
        .any(|task| matches!(task, QueuedTask::SyncCrmDeal { .. })));
    // the seller acted, so only the buyer is notified
    let notified: Vec<Uuid> = tasks
        .iter()
        .filter_map(|task| match task {
            QueuedTask::CreateUserNotification { user_id, .. } => Some(*user_id),
            _ => None,
        })
        .collect();
    assert_eq!(notified, vec![buyer]);
}

#[tokio::test]
async fn test_buyer_action_notifies_assignees() {
    let harness = Harness::new();
    let buyer = Actor::buyer(Uuid::new_v4());
    let pics = vec![Uuid::new_v4(), Uuid::new_v4()];
    let order = harness
        .create(
            NewOrder::new(reference("BPO"), OrderKind::BulkPurchaseOrder, buyer.user_id)
                .with_assignees(pics.clone()),
        )
        .await;
    harness
        .advance(order.id, &[TrackingAction::SendQuotation])
        .await;
    harness.drain_queue().await;

    harness
        .machine
        .apply_transition(TransitionRequest::new(
            order.id,
            TrackingAction::ApproveQuotation,
            buyer,
        ))
        .await
        .unwrap();

    let mut notified: Vec<Uuid> = harness
        .queue
        .pending_tasks()
        .await
        .iter()
        .filter_map(|task| match task {
            QueuedTask::CreateUserNotification { user_id, .. } => Some(*user_id),
            _ => None,
        })
        .collect();
    notified.sort();
    let mut expected = pics;
    expected.sort();
    assert_eq!(notified, expected);
}
