//! # pgmq Task Queue
//!
//! [`TaskQueue`] backed by the PostgreSQL `pgmq` extension, called through
//! plain sqlx queries on a shared pool. Delayed delivery uses the `delay`
//! argument of `pgmq.send`, redelivery uses `pgmq.set_vt`, and acked tasks with
//! a retention period are moved to the pgmq archive table instead of deleted.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, warn};

use super::errors::MessagingError;
use super::queue::{EnqueueOptions, ReceivedTask, TaskEnvelope, TaskQueue};
use super::tasks::QueuedTask;

#[derive(Debug, FromRow)]
struct PgmqMessageRow {
    msg_id: i64,
    read_ct: i32,
    message: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct PgmqTaskQueue {
    pool: PgPool,
    queue_name: String,
}

impl PgmqTaskQueue {
    /// Wrap an existing pool; `queue_name` ends up in table names, so it must
    /// be a plain identifier
    pub fn new(pool: PgPool, queue_name: impl Into<String>) -> Result<Self, MessagingError> {
        let queue_name = queue_name.into();
        let valid = !queue_name.is_empty()
            && queue_name.len() <= 47
            && queue_name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(MessagingError::queue_operation(
                queue_name,
                "new",
                "queue names must be lowercase alphanumeric or underscore, at most 47 characters",
            ));
        }
        Ok(Self { pool, queue_name })
    }

    /// Create the queue if it doesn't exist
    pub async fn ensure_queue(&self) -> Result<(), MessagingError> {
        debug!("📋 Creating queue: {}", self.queue_name);
        sqlx::query("SELECT pgmq.create($1)")
            .bind(&self.queue_name)
            .execute(&self.pool)
            .await
            .map_err(|e| self.operation_error("create", e))?;
        info!("✅ Queue ready: {}", self.queue_name);
        Ok(())
    }

    /// Drop archived tasks whose retention has passed; returns how many were removed
    pub async fn prune_archive(&self) -> Result<u64, MessagingError> {
        let query = format!(
            "DELETE FROM pgmq.a_{} \
             WHERE archived_at < now() - make_interval(secs => COALESCE((message->>'retention_secs')::double precision, 0))",
            self.queue_name
        );
        let result = sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| self.operation_error("prune_archive", e))?;
        Ok(result.rows_affected())
    }

    /// Number of tasks in the live queue, visible or not
    pub async fn queue_depth(&self) -> Result<i64, MessagingError> {
        let query = format!("SELECT COUNT(*) FROM pgmq.q_{}", self.queue_name);
        let count: i64 = sqlx::query_scalar(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.operation_error("queue_depth", e))?;
        Ok(count)
    }

    fn operation_error(&self, operation: &str, err: sqlx::Error) -> MessagingError {
        MessagingError::queue_operation(&self.queue_name, operation, err.to_string())
    }
}

fn whole_seconds(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

#[async_trait]
impl TaskQueue for PgmqTaskQueue {
    async fn enqueue(
        &self,
        task: QueuedTask,
        options: EnqueueOptions,
    ) -> Result<i64, MessagingError> {
        let delay_seconds = options
            .process_at
            .map(|at| (at - Utc::now()).num_seconds().clamp(0, i64::from(i32::MAX)) as i32)
            .unwrap_or(0);
        let envelope = TaskEnvelope::new(task, &options);
        let message = serde_json::to_value(&envelope)?;

        let message_id: i64 = sqlx::query_scalar("SELECT * FROM pgmq.send($1, $2, $3)")
            .bind(&self.queue_name)
            .bind(message)
            .bind(delay_seconds)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.operation_error("send", e))?;

        debug!(
            queue = %self.queue_name,
            message_id = message_id,
            task_name = envelope.task.task_name(),
            delay_seconds = delay_seconds,
            "📤 Task sent"
        );
        Ok(message_id)
    }

    async fn receive_due(
        &self,
        max_tasks: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedTask>, MessagingError> {
        let rows: Vec<PgmqMessageRow> =
            sqlx::query_as("SELECT msg_id, read_ct, message FROM pgmq.read($1, $2, $3)")
                .bind(&self.queue_name)
                .bind(whole_seconds(visibility_timeout))
                .bind(i32::try_from(max_tasks).unwrap_or(i32::MAX))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| self.operation_error("read", e))?;

        let mut received = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<TaskEnvelope>(row.message) {
                Ok(envelope) => received.push(ReceivedTask {
                    message_id: row.msg_id,
                    attempt: u32::try_from(row.read_ct).unwrap_or(1),
                    envelope,
                }),
                Err(err) => {
                    // Unreadable payloads would be redelivered forever
                    warn!(
                        queue = %self.queue_name,
                        message_id = row.msg_id,
                        error = %err,
                        "⚠️ Archiving undecodable task"
                    );
                    self.archive(row.msg_id).await?;
                }
            }
        }

        debug!(
            "📨 Read {} tasks from queue: {}",
            received.len(),
            self.queue_name
        );
        Ok(received)
    }

    async fn ack(&self, message_id: i64) -> Result<(), MessagingError> {
        let retained: Option<bool> = sqlx::query_scalar(&format!(
            "SELECT COALESCE((message->>'retention_secs')::bigint, 0) > 0 FROM pgmq.q_{} WHERE msg_id = $1",
            self.queue_name
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| self.operation_error("ack", e))?;

        match retained {
            None => Err(MessagingError::MessageNotFound { message_id }),
            Some(true) => self.archive(message_id).await,
            Some(false) => {
                sqlx::query("SELECT pgmq.delete($1, $2)")
                    .bind(&self.queue_name)
                    .bind(message_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| self.operation_error("delete", e))?;
                Ok(())
            }
        }
    }

    async fn retry(&self, message_id: i64, delay: Duration) -> Result<(), MessagingError> {
        sqlx::query("SELECT msg_id FROM pgmq.set_vt($1, $2, $3)")
            .bind(&self.queue_name)
            .bind(message_id)
            .bind(whole_seconds(delay))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.operation_error("set_vt", e))?
            .ok_or(MessagingError::MessageNotFound { message_id })?;
        Ok(())
    }

    async fn archive(&self, message_id: i64) -> Result<(), MessagingError> {
        let archived: bool = sqlx::query_scalar("SELECT pgmq.archive($1, $2)")
            .bind(&self.queue_name)
            .bind(message_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.operation_error("archive", e))?;
        if !archived {
            return Err(MessagingError::MessageNotFound { message_id });
        }
        debug!("📦 Task {} archived in queue: {}", message_id, self.queue_name);
        Ok(())
    }

    fn queue_name(&self) -> &str {
        &self.queue_name
    }
}
