//! # Side-Effect Worker
//!
//! Polls the task queue for due tasks. Scheduled transitions are executed
//! through the [`OrderStateMachine`]; every other task kind is handed to a
//! [`TaskHandler`] that talks to the outside world (CRM, notifications,
//! invoicing).
//!
//! Delivery is at-least-once: a task is acked after it succeeds, redelivered
//! with exponential backoff after a failure, and archived once its retries are
//! exhausted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::errors::MessagingError;
use super::queue::{ReceivedTask, TaskQueue};
use super::tasks::QueuedTask;
use crate::config::WorkerConfig;
use crate::logging::log_task_operation;
use crate::state_machine::context::Actor;
use crate::state_machine::errors::StateMachineError;
use crate::state_machine::events::TrackingAction;
use crate::state_machine::order_state_machine::{OrderStateMachine, ScheduledFire};

/// Executes side-effect tasks against external systems
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &QueuedTask) -> Result<(), MessagingError>;
}

/// Handler that only records what would have been sent
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTaskHandler;

#[async_trait]
impl TaskHandler for LoggingTaskHandler {
    async fn handle(&self, task: &QueuedTask) -> Result<(), MessagingError> {
        let payload = serde_json::to_string(task)?;
        info!(
            task_name = task.task_name(),
            order_id = ?task.order_id(),
            payload = %payload,
            "📤 Side effect handled"
        );
        Ok(())
    }
}

/// What the worker did with one delivered task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDisposition {
    Acked,
    Retried,
    Archived,
}

/// Counts for one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerBatchReport {
    pub received: usize,
    pub acked: usize,
    pub retried: usize,
    pub archived: usize,
}

pub struct TaskWorker {
    queue: Arc<dyn TaskQueue>,
    machine: OrderStateMachine,
    handler: Arc<dyn TaskHandler>,
    config: WorkerConfig,
    shutdown_notify: Notify,
    stop_requested: AtomicBool,
}

impl TaskWorker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        machine: OrderStateMachine,
        handler: Arc<dyn TaskHandler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            machine,
            handler,
            config,
            shutdown_notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Ask a running [`TaskWorker::run`] loop to stop after its current batch
    pub fn shutdown(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.shutdown_notify.notify_one();
    }

    fn should_continue(&self) -> bool {
        !self.stop_requested.load(Ordering::Acquire)
    }

    /// Poll until [`TaskWorker::shutdown`] is called
    pub async fn run(&self) {
        info!(
            queue = self.queue.queue_name(),
            batch_size = self.config.batch_size,
            "🚀 Task worker started"
        );

        while self.should_continue() {
            let wait_time = match self.run_once().await {
                Ok(report) if report.received > 0 => {
                    debug!(?report, "Worker batch processed");
                    // Drain a busy queue without sleeping
                    continue;
                }
                Ok(_) => self.config.poll_interval(),
                Err(err) => {
                    error!(error = %err, "❌ Failed to receive tasks");
                    self.config.poll_interval() * 2
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait_time) => {},
                _ = self.shutdown_notify.notified() => {
                    debug!("Shutdown notification received");
                    break;
                }
            }
        }

        info!(queue = self.queue.queue_name(), "🛑 Task worker stopped");
    }

    /// Receive one batch of due tasks and process them concurrently
    pub async fn run_once(&self) -> Result<WorkerBatchReport, MessagingError> {
        let tasks = self
            .queue
            .receive_due(self.config.batch_size, self.config.visibility_timeout())
            .await?;

        let mut report = WorkerBatchReport {
            received: tasks.len(),
            ..WorkerBatchReport::default()
        };
        let dispositions = join_all(tasks.into_iter().map(|task| self.process(task))).await;
        for disposition in dispositions {
            match disposition {
                Ok(TaskDisposition::Acked) => report.acked += 1,
                Ok(TaskDisposition::Retried) => report.retried += 1,
                Ok(TaskDisposition::Archived) => report.archived += 1,
                Err(err) => {
                    // Left invisible; it comes back after the visibility timeout
                    warn!(error = %err, "⚠️ Failed to settle task");
                }
            }
        }
        Ok(report)
    }

    async fn process(&self, received: ReceivedTask) -> Result<TaskDisposition, MessagingError> {
        let task = &received.envelope.task;
        let task_name = task.task_name();
        let result = match task {
            QueuedTask::ScheduledTransition {
                order_id,
                action,
                actor,
                scheduled_for,
            } => {
                self.fire_scheduled(*order_id, *action, *actor, *scheduled_for)
                    .await
            }
            other => self.handler.handle(other).await,
        };

        match result {
            Ok(()) => {
                self.queue.ack(received.message_id).await?;
                log_task_operation(
                    "execute",
                    task_name,
                    Some(received.message_id),
                    task.order_id(),
                    "succeeded",
                    None,
                );
                Ok(TaskDisposition::Acked)
            }
            Err(err) if received.retries_exhausted() => {
                self.queue.archive(received.message_id).await?;
                error!(
                    task_name = task_name,
                    message_id = received.message_id,
                    attempt = received.attempt,
                    error = %err,
                    "❌ Task failed, retries exhausted, archived"
                );
                Ok(TaskDisposition::Archived)
            }
            Err(err) => {
                let delay = self.config.retry_delay(received.attempt);
                self.queue.retry(received.message_id, delay).await?;
                let details = format!("attempt {} failed: {err}; retry in {delay:?}", received.attempt);
                log_task_operation(
                    "execute",
                    task_name,
                    Some(received.message_id),
                    task.order_id(),
                    "retrying",
                    Some(&details),
                );
                Ok(TaskDisposition::Retried)
            }
        }
    }

    async fn fire_scheduled(
        &self,
        order_id: Uuid,
        action: TrackingAction,
        actor: Actor,
        scheduled_for: DateTime<Utc>,
    ) -> Result<(), MessagingError> {
        match self
            .machine
            .fire_scheduled_transition(order_id, action, actor, scheduled_for)
            .await
        {
            Ok(ScheduledFire::Applied(outcome)) => {
                debug!(
                    order_id = %order_id,
                    to_status = %outcome.order.tracking_status,
                    "Scheduled transition applied"
                );
                Ok(())
            }
            Ok(ScheduledFire::Superseded { .. }) => Ok(()),
            // The order moved on since scheduling; running it again cannot help
            Err(
                err @ (StateMachineError::InvalidTransition { .. }
                | StateMachineError::NotFound { .. }
                | StateMachineError::Unauthorized { .. }
                | StateMachineError::GuardFailed { .. }),
            ) => {
                warn!(
                    order_id = %order_id,
                    action = %action,
                    error = %err,
                    "⏭️ Scheduled transition no longer applies, dropping"
                );
                Ok(())
            }
            Err(err) => Err(MessagingError::handler_failed(
                "scheduled_transition",
                err.to_string(),
            )),
        }
    }
}
