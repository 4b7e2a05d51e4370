use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use order_lifecycle::config::{LifecycleConfig, WorkerConfig};
use order_lifecycle::database::InMemoryOrderStore;
use order_lifecycle::messaging::{LoggingTaskHandler, QueuedTask, TaskWorker};
use order_lifecycle::models::Pagination;
use order_lifecycle::state_machine::{
    Actor, ScheduledFire, StateMachineError, TrackingAction, TrackingStatus,
};

use crate::common::{FlakyStore, Harness};

fn worker(harness: &Harness) -> TaskWorker {
    TaskWorker::new(
        harness.queue.clone(),
        harness.machine.clone(),
        Arc::new(LoggingTaskHandler),
        WorkerConfig::default(),
    )
}

#[tokio::test]
async fn test_scheduled_transition_fires_when_due() {
    let harness = Harness::new();
    let order = harness.bulk_order(Uuid::new_v4()).await;
    let at = Utc::now() + Duration::hours(1);

    let handle = harness
        .machine
        .schedule_transition(order.id, TrackingAction::SendQuotation, harness.admin, at)
        .await
        .unwrap();
    assert_eq!(handle.scheduled_for, at);

    let schedule = harness.queue.pending_schedule().await;
    assert_eq!(schedule.len(), 1);
    assert!(matches!(schedule[0].0, QueuedTask::ScheduledTransition { .. }));
    assert_eq!(schedule[0].1, at);
    let pending = harness.machine.order(order.id).await.unwrap();
    assert_eq!(pending.scheduled_transition_at, Some(at));
    assert_eq!(pending.tracking_status, TrackingStatus::Created);

    let worker = worker(&harness);
    assert_eq!(worker.run_once().await.unwrap().received, 0);

    harness.queue.fast_forward().await;
    let report = worker.run_once().await.unwrap();
    assert_eq!(report.received, 1);
    assert_eq!(report.acked, 1);

    let fired = harness.machine.order(order.id).await.unwrap();
    assert_eq!(fired.tracking_status, TrackingStatus::QuotationSent);
    assert_eq!(fired.scheduled_transition_at, None);
    let log = harness
        .machine
        .tracking_log(order.id, Pagination::default())
        .await
        .unwrap();
    assert!(log.items[0]
        .note
        .as_deref()
        .is_some_and(|note| note.starts_with("Scheduled send_quotation for")));
}

#[tokio::test]
async fn test_rescheduling_supersedes_the_earlier_task() {
    let harness = Harness::new();
    let order = harness.bulk_order(Uuid::new_v4()).await;
    let first = Utc::now() + Duration::hours(1);
    let second = Utc::now() + Duration::hours(2);

    for at in [first, second] {
        harness
            .machine
            .schedule_transition(order.id, TrackingAction::SendQuotation, harness.admin, at)
            .await
            .unwrap();
    }

    let fire = harness
        .machine
        .fire_scheduled_transition(order.id, TrackingAction::SendQuotation, harness.admin, first)
        .await
        .unwrap();
    assert_eq!(
        fire,
        ScheduledFire::Superseded {
            current: Some(second)
        }
    );

    harness.queue.fast_forward().await;
    let report = worker(&harness).run_once().await.unwrap();
    assert_eq!(report.received, 2);
    assert_eq!(report.acked, 2);

    let log = harness
        .machine
        .tracking_log(order.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(log.total, 1, "only one of the two schedules may apply");
}

#[tokio::test]
async fn test_scheduled_action_that_no_longer_applies_is_dropped() {
    let harness = Harness::new();
    let order = harness.bulk_order(Uuid::new_v4()).await;

    harness
        .machine
        .schedule_transition(
            order.id,
            TrackingAction::MarkQc,
            harness.admin,
            Utc::now() + Duration::minutes(5),
        )
        .await
        .unwrap();
    harness.queue.fast_forward().await;

    let report = worker(&harness).run_once().await.unwrap();
    assert_eq!(report.acked, 1);
    assert_eq!(report.retried, 0);
    assert!(harness.queue.is_empty().await);

    let reloaded = harness.machine.order(order.id).await.unwrap();
    assert_eq!(reloaded.tracking_status, TrackingStatus::Created);
    assert_eq!(reloaded.version, 0);
}

#[tokio::test]
async fn test_unauthorized_actor_cannot_schedule() {
    let harness = Harness::new();
    let buyer = Actor::buyer(Uuid::new_v4());
    let order = harness.bulk_order(buyer.user_id).await;

    let err = harness
        .machine
        .schedule_transition(
            order.id,
            TrackingAction::SendQuotation,
            buyer,
            Utc::now() + Duration::hours(1),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StateMachineError::Unauthorized { .. }));
    assert!(harness.queue.is_empty().await);
    let reloaded = harness.machine.order(order.id).await.unwrap();
    assert_eq!(reloaded.scheduled_transition_at, None);
}

#[tokio::test]
async fn test_scheduled_transition_survives_a_failed_commit() {
    let store = Arc::new(FlakyStore::new(InMemoryOrderStore::new()));
    let harness = Harness::with_store(store.clone(), LifecycleConfig::default());
    let order = harness.bulk_order(Uuid::new_v4()).await;
    let at = Utc::now() + Duration::minutes(10);

    harness
        .machine
        .schedule_transition(order.id, TrackingAction::SendQuotation, harness.admin, at)
        .await
        .unwrap();
    store.fail_commits(order.id, 1);
    harness.queue.fast_forward().await;

    let worker = TaskWorker::new(
        harness.queue.clone(),
        harness.machine.clone(),
        Arc::new(LoggingTaskHandler),
        WorkerConfig {
            retry_backoff_ms: 0,
            ..WorkerConfig::default()
        },
    );
    let first = worker.run_once().await.unwrap();
    assert_eq!(first.retried, 1);
    assert_eq!(first.archived, 0);
    let pending = harness.machine.order(order.id).await.unwrap();
    assert_eq!(pending.tracking_status, TrackingStatus::Created);
    assert_eq!(pending.scheduled_transition_at, Some(at));

    let second = worker.run_once().await.unwrap();
    assert_eq!(second.acked, 1);
    assert!(harness.queue.is_empty().await);
    let fired = harness.machine.order(order.id).await.unwrap();
    assert_eq!(fired.tracking_status, TrackingStatus::QuotationSent);
    assert_eq!(fired.scheduled_transition_at, None);
}
