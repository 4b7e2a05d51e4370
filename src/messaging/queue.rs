use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::MessagingError;
use super::tasks::QueuedTask;
use crate::config::QueueConfig;

/// Per-task delivery options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Redeliveries allowed after the first attempt fails
    pub max_retry: u32,
    /// How long a finished task is kept for inspection
    pub retention: Duration,
    /// Deliver no earlier than this instant
    pub process_at: Option<DateTime<Utc>>,
}

impl EnqueueOptions {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_retry: config.max_retry,
            retention: Duration::from_secs(config.retention_hours * 3600),
            process_at: None,
        }
    }

    /// Deliver at `at` with the normal retry budget; a redelivered transition
    /// is skipped once its schedule marker has been cleared
    pub fn scheduled(config: &QueueConfig, at: DateTime<Utc>) -> Self {
        Self {
            process_at: Some(at),
            ..Self::from_config(config)
        }
    }
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// Task plus its delivery options as stored in the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task: QueuedTask,
    pub max_retry: u32,
    pub retention_secs: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(task: QueuedTask, options: &EnqueueOptions) -> Self {
        Self {
            task,
            max_retry: options.max_retry,
            retention_secs: options.retention.as_secs(),
            enqueued_at: Utc::now(),
        }
    }
}

/// A task handed to a worker, invisible to other readers until acked or retried
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedTask {
    pub message_id: i64,
    /// 1 on first delivery
    pub attempt: u32,
    pub envelope: TaskEnvelope,
}

impl ReceivedTask {
    pub fn retries_exhausted(&self) -> bool {
        self.attempt > self.envelope.max_retry
    }
}

/// Durable, at-least-once task queue
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task and return its message id
    async fn enqueue(
        &self,
        task: QueuedTask,
        options: EnqueueOptions,
    ) -> Result<i64, MessagingError>;

    /// Receive up to `max_tasks` due tasks, hiding them for `visibility_timeout`
    async fn receive_due(
        &self,
        max_tasks: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedTask>, MessagingError>;

    /// Mark a task as done
    async fn ack(&self, message_id: i64) -> Result<(), MessagingError>;

    /// Make a task visible again after `delay`
    async fn retry(&self, message_id: i64, delay: Duration) -> Result<(), MessagingError>;

    /// Move a task out of the live queue without running it again
    async fn archive(&self, message_id: i64) -> Result<(), MessagingError>;

    fn queue_name(&self) -> &str;
}
