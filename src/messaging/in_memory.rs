//! # In-Memory Task Queue
//!
//! Thread-safe queue for tests and local development. Supports delayed
//! delivery and visibility timeouts with the same semantics as the pgmq
//! backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::errors::MessagingError;
use super::queue::{EnqueueOptions, ReceivedTask, TaskEnvelope, TaskQueue};
use super::tasks::QueuedTask;

#[derive(Debug, Clone)]
struct StoredTask {
    id: i64,
    envelope: TaskEnvelope,
    /// Hidden until this instant (delayed or in flight)
    visible_at: DateTime<Utc>,
    read_count: u32,
}

#[derive(Debug)]
pub struct InMemoryTaskQueue {
    name: String,
    live: RwLock<VecDeque<StoredTask>>,
    archived: RwLock<Vec<TaskEnvelope>>,
    next_id: AtomicI64,
    total_sent: AtomicU64,
    total_acked: AtomicU64,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new("order_lifecycle_tasks")
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

impl InMemoryTaskQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            live: RwLock::new(VecDeque::new()),
            archived: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            total_sent: AtomicU64::new(0),
            total_acked: AtomicU64::new(0),
        }
    }

    /// Every task still in the queue, due or not, in enqueue order
    pub async fn pending_tasks(&self) -> Vec<QueuedTask> {
        self.live
            .read()
            .await
            .iter()
            .map(|stored| stored.envelope.task.clone())
            .collect()
    }

    /// Pending tasks with the instant they become visible
    pub async fn pending_schedule(&self) -> Vec<(QueuedTask, DateTime<Utc>)> {
        self.live
            .read()
            .await
            .iter()
            .map(|stored| (stored.envelope.task.clone(), stored.visible_at))
            .collect()
    }

    pub async fn archived_tasks(&self) -> Vec<QueuedTask> {
        self.archived
            .read()
            .await
            .iter()
            .map(|envelope| envelope.task.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.live.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.live.read().await.is_empty()
    }

    pub fn total_sent(&self) -> u64 {
        self.total_sent.load(Ordering::Relaxed)
    }

    pub fn total_acked(&self) -> u64 {
        self.total_acked.load(Ordering::Relaxed)
    }

    /// Make every delayed task due now
    pub async fn fast_forward(&self) {
        let now = Utc::now();
        for stored in self.live.write().await.iter_mut() {
            stored.visible_at = now;
        }
    }

    async fn take(&self, message_id: i64) -> Result<StoredTask, MessagingError> {
        let mut live = self.live.write().await;
        let position = live
            .iter()
            .position(|stored| stored.id == message_id)
            .ok_or(MessagingError::MessageNotFound { message_id })?;
        live.remove(position)
            .ok_or(MessagingError::MessageNotFound { message_id })
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(
        &self,
        task: QueuedTask,
        options: EnqueueOptions,
    ) -> Result<i64, MessagingError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stored = StoredTask {
            id,
            visible_at: options.process_at.unwrap_or_else(Utc::now),
            envelope: TaskEnvelope::new(task, &options),
            read_count: 0,
        };

        self.live.write().await.push_back(stored);
        self.total_sent.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    async fn receive_due(
        &self,
        max_tasks: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedTask>, MessagingError> {
        let now = Utc::now();
        let hidden_until = now + to_chrono(visibility_timeout);
        let mut live = self.live.write().await;

        let received = live
            .iter_mut()
            .filter(|stored| stored.visible_at <= now)
            .take(max_tasks)
            .map(|stored| {
                stored.visible_at = hidden_until;
                stored.read_count += 1;
                ReceivedTask {
                    message_id: stored.id,
                    attempt: stored.read_count,
                    envelope: stored.envelope.clone(),
                }
            })
            .collect();

        Ok(received)
    }

    async fn ack(&self, message_id: i64) -> Result<(), MessagingError> {
        let stored = self.take(message_id).await?;
        self.total_acked.fetch_add(1, Ordering::Relaxed);
        if stored.envelope.retention_secs > 0 {
            self.archived.write().await.push(stored.envelope);
        }
        Ok(())
    }

    async fn retry(&self, message_id: i64, delay: Duration) -> Result<(), MessagingError> {
        let mut live = self.live.write().await;
        let stored = live
            .iter_mut()
            .find(|stored| stored.id == message_id)
            .ok_or(MessagingError::MessageNotFound { message_id })?;
        stored.visible_at = Utc::now() + to_chrono(delay);
        Ok(())
    }

    async fn archive(&self, message_id: i64) -> Result<(), MessagingError> {
        let stored = self.take(message_id).await?;
        self.archived.write().await.push(stored.envelope);
        Ok(())
    }

    fn queue_name(&self) -> &str {
        &self.name
    }
}
