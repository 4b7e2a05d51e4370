//! # Side-Effect Dispatcher
//!
//! Turns a committed transition into queued tasks. Dispatch runs only after
//! the transition is durable and never fails the transition: planning errors,
//! enqueue errors and enqueue timeouts are logged and counted in the
//! [`DispatchReport`].

use std::sync::Arc;

use tracing::{debug, warn};

use super::errors::MessagingError;
use super::queue::{EnqueueOptions, TaskQueue};
use super::tasks::QueuedTask;
use crate::config::QueueConfig;
use crate::logging::log_task_operation;
use crate::state_machine::actions::{default_actions, CommittedTransition, StateAction};

/// Outcome of dispatching one or more transitions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub enqueued: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.enqueued += other.enqueued;
        self.failed += other.failed;
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

pub struct SideEffectDispatcher {
    queue: Arc<dyn TaskQueue>,
    actions: Vec<Box<dyn StateAction>>,
    config: QueueConfig,
}

impl std::fmt::Debug for SideEffectDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideEffectDispatcher")
            .field("queue", &self.queue.queue_name())
            .field(
                "actions",
                &self.actions.iter().map(|a| a.description()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl SideEffectDispatcher {
    pub fn new(queue: Arc<dyn TaskQueue>, config: QueueConfig) -> Self {
        Self::with_actions(queue, config, default_actions())
    }

    pub fn with_actions(
        queue: Arc<dyn TaskQueue>,
        config: QueueConfig,
        actions: Vec<Box<dyn StateAction>>,
    ) -> Self {
        Self {
            queue,
            actions,
            config,
        }
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// Tasks every registered action plans for `transition`
    pub fn plan(&self, transition: &CommittedTransition) -> (Vec<QueuedTask>, usize) {
        let mut tasks = Vec::new();
        let mut failed = 0;
        for action in &self.actions {
            match action.plan(transition) {
                Ok(planned) => tasks.extend(planned),
                Err(err) => {
                    failed += 1;
                    warn!(
                        order_id = %transition.order.id,
                        action = action.description(),
                        error = %err,
                        "⚠️ Failed to plan side effect"
                    );
                }
            }
        }
        (tasks, failed)
    }

    /// Plan and enqueue side effects for a committed transition
    pub async fn dispatch(&self, transition: &CommittedTransition) -> DispatchReport {
        let (tasks, planning_failures) = self.plan(transition);
        let mut report = DispatchReport {
            enqueued: 0,
            failed: planning_failures,
        };

        let options = EnqueueOptions::from_config(&self.config);
        for task in tasks {
            if self.enqueue_best_effort(task, options.clone()).await {
                report.enqueued += 1;
            } else {
                report.failed += 1;
            }
        }

        debug!(
            order_id = %transition.order.id,
            enqueued = report.enqueued,
            failed = report.failed,
            "📨 Side effects dispatched"
        );
        report
    }

    pub async fn dispatch_all(&self, transitions: &[CommittedTransition]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for transition in transitions {
            report.merge(self.dispatch(transition).await);
        }
        report
    }

    /// Enqueue under the configured timeout, propagating failures
    pub async fn enqueue(
        &self,
        task: QueuedTask,
        options: EnqueueOptions,
    ) -> Result<i64, MessagingError> {
        let timeout = self.config.enqueue_timeout();
        match tokio::time::timeout(timeout, self.queue.enqueue(task, options)).await {
            Ok(result) => result,
            Err(_) => Err(MessagingError::timeout(
                "enqueue",
                timeout.as_millis() as u64,
            )),
        }
    }

    /// Enqueue under the configured timeout; failures are logged, never raised
    pub async fn enqueue_best_effort(&self, task: QueuedTask, options: EnqueueOptions) -> bool {
        let task_name = task.task_name();
        let order_id = task.order_id();
        match self.enqueue(task, options).await {
            Ok(message_id) => {
                log_task_operation("enqueue", task_name, Some(message_id), order_id, "queued", None);
                true
            }
            Err(err) => {
                warn!(
                    task_name = task_name,
                    order_id = ?order_id,
                    queue = self.queue.queue_name(),
                    error = %err,
                    "⚠️ Failed to enqueue side effect, transition stays committed"
                );
                false
            }
        }
    }
}
