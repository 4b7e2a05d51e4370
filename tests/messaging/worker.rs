use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use order_lifecycle::config::WorkerConfig;
use order_lifecycle::messaging::{
    EnqueueOptions, LoggingTaskHandler, MessagingError, QueuedTask, TaskHandler, TaskQueue,
    TaskWorker,
};
use order_lifecycle::state_machine::OrderKind;

use crate::common::Harness;

/// Handler that fails every call and counts them
#[derive(Default)]
struct FailingHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl TaskHandler for FailingHandler {
    async fn handle(&self, task: &QueuedTask) -> Result<(), MessagingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(MessagingError::handler_failed(
            task.task_name(),
            "CRM returned 503",
        ))
    }
}

fn immediate_retries() -> WorkerConfig {
    WorkerConfig {
        retry_backoff_ms: 0,
        poll_interval_ms: 10,
        ..WorkerConfig::default()
    }
}

fn deal_sync() -> QueuedTask {
    QueuedTask::SyncCrmDeal {
        order_id: Uuid::new_v4(),
        kind: OrderKind::BulkPurchaseOrder,
    }
}

#[tokio::test]
async fn test_successful_tasks_are_acked() {
    let harness = Harness::new();
    for _ in 0..3 {
        harness
            .queue
            .enqueue(deal_sync(), EnqueueOptions::default())
            .await
            .unwrap();
    }

    let worker = TaskWorker::new(
        harness.queue.clone(),
        harness.machine.clone(),
        Arc::new(LoggingTaskHandler),
        WorkerConfig::default(),
    );
    let report = worker.run_once().await.unwrap();

    assert_eq!(report.received, 3);
    assert_eq!(report.acked, 3);
    assert!(harness.queue.is_empty().await);
    assert_eq!(harness.queue.total_acked(), 3);
}

#[tokio::test]
async fn test_failing_task_is_retried_then_archived() {
    let harness = Harness::new();
    let options = EnqueueOptions {
        max_retry: 1,
        ..EnqueueOptions::default()
    };
    harness.queue.enqueue(deal_sync(), options).await.unwrap();

    let handler = Arc::new(FailingHandler::default());
    let worker = TaskWorker::new(
        harness.queue.clone(),
        harness.machine.clone(),
        handler.clone(),
        immediate_retries(),
    );

    let first = worker.run_once().await.unwrap();
    assert_eq!(first.retried, 1);
    assert_eq!(harness.queue.len().await, 1);

    let second = worker.run_once().await.unwrap();
    assert_eq!(second.archived, 1);
    assert!(harness.queue.is_empty().await);
    assert_eq!(harness.queue.archived_tasks().await.len(), 1);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let harness = Harness::new();
    harness
        .queue
        .enqueue(deal_sync(), EnqueueOptions::default())
        .await
        .unwrap();

    let worker = Arc::new(TaskWorker::new(
        harness.queue.clone(),
        harness.machine.clone(),
        Arc::new(LoggingTaskHandler),
        immediate_retries(),
    ));
    let running = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    worker.shutdown();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("worker should stop promptly")
        .unwrap();

    assert!(harness.queue.is_empty().await);
}
