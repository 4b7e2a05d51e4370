//! # PostgreSQL Stores
//!
//! sqlx implementations of [`OrderStore`] and [`NoteStore`].
//!
//! Every commit runs in one transaction: the order row is locked with
//! `SELECT ... FOR UPDATE`, its version is compared, and the status update,
//! milestone upsert and tracking log insert are written together. Checkout
//! session batches lock all sibling rows in id order inside a single
//! transaction, so a batch is all-or-nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::models::note::NoteRow;
use crate::models::order::OrderRow;
use crate::models::payment_milestone::PaymentMilestoneRow;
use crate::models::tracking_log::TrackingLogRow;
use crate::models::{
    NewNote, NewOrder, Note, NoteTarget, Order, Page, Pagination, PaymentMilestone,
    TrackingLogEntry,
};
use crate::services::note_service::NoteStore;
use crate::state_machine::errors::{PersistenceError, PersistenceResult};
use crate::state_machine::persistence::{
    ensure_version, BatchCommit, CommittedChange, OrderMutation, OrderStore,
};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> PersistenceResult<Order> {
    let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(PersistenceError::OrderNotFound { order_id })?;
    Order::try_from(row)
}

/// Write one mutation against an order row already locked by the caller
async fn apply_locked(
    conn: &mut PgConnection,
    mutation: OrderMutation,
) -> PersistenceResult<CommittedChange> {
    let row = sqlx::query_as::<_, OrderRow>(
        r#"
        UPDATE orders
        SET tracking_status = $2,
            payment_status = $3,
            assignee_ids = COALESCE($5, assignee_ids),
            version = version + 1,
            updated_at = now()
        WHERE id = $1 AND version = $4
        RETURNING *
        "#,
    )
    .bind(mutation.order_id)
    .bind(mutation.tracking_status.as_str())
    .bind(mutation.payment_status.as_str())
    .bind(mutation.expected_version)
    .bind(mutation.assignee_ids.as_deref())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(PersistenceError::StaleVersion {
        order_id: mutation.order_id,
        expected: mutation.expected_version,
        actual: mutation.expected_version + 1,
    })?;
    let order = Order::try_from(row)?;

    if let Some(update) = &mutation.milestone {
        sqlx::query(
            r#"
            INSERT INTO payment_milestones
                (order_id, milestone, checkout_session_id, paid, approved_by_user_id, approved_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_id, milestone) DO UPDATE
            SET paid = EXCLUDED.paid,
                checkout_session_id = EXCLUDED.checkout_session_id,
                approved_by_user_id = EXCLUDED.approved_by_user_id,
                approved_at = EXCLUDED.approved_at
            "#,
        )
        .bind(order.id)
        .bind(update.milestone.as_str())
        .bind(order.checkout_session_id.as_deref())
        .bind(update.paid)
        .bind(update.approved_by_user_id)
        .bind(update.approved_at)
        .execute(&mut *conn)
        .await?;
    }

    let entry = mutation.log_entry;
    let row = sqlx::query_as::<_, TrackingLogRow>(
        r#"
        INSERT INTO order_tracking_logs
            (id, order_id, sort_key, action, from_status, to_status, payment_from, payment_to,
             actor_user_id, actor_role, note, attachments, metadata, created_at)
        VALUES (
            $1, $2,
            (SELECT COALESCE(MAX(sort_key), 0) + 1 FROM order_tracking_logs WHERE order_id = $2),
            $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now()
        )
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.order_id)
    .bind(&entry.action)
    .bind(entry.from_status.as_str())
    .bind(entry.to_status.as_str())
    .bind(entry.payment_from.map(|s| s.as_str()))
    .bind(entry.payment_to.map(|s| s.as_str()))
    .bind(entry.actor_user_id)
    .bind(&entry.actor_role)
    .bind(entry.note.as_deref())
    .bind(serde_json::to_value(&entry.attachments)?)
    .bind(&entry.metadata)
    .fetch_one(&mut *conn)
    .await?;

    Ok(CommittedChange {
        order,
        entry: TrackingLogEntry::try_from(row)?,
    })
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_order(&self, new_order: NewOrder) -> PersistenceResult<Order> {
        let order = new_order.into_order(Utc::now());
        let result = sqlx::query_as::<_, OrderRow>(
            r#"
            INSERT INTO orders
                (id, reference_id, kind, tracking_status, payment_status, user_id, seller_id,
                 assignee_ids, checkout_session_id, inquiry_id, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(&order.reference_id)
        .bind(order.kind.as_str())
        .bind(order.tracking_status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.user_id)
        .bind(order.seller_id)
        .bind(&order.assignee_ids)
        .bind(order.checkout_session_id.as_deref())
        .bind(order.inquiry_id)
        .bind(order.version)
        .bind(order.created_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Order::try_from(row),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(PersistenceError::DuplicateReference {
                    reference_id: order.reference_id,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_order(&self, order_id: Uuid) -> PersistenceResult<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_by_checkout_session(
        &self,
        checkout_session_id: &str,
    ) -> PersistenceResult<Vec<Order>> {
        sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE checkout_session_id = $1 ORDER BY id",
        )
        .bind(checkout_session_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Order::try_from)
        .collect()
    }

    async fn commit(&self, mutation: OrderMutation) -> PersistenceResult<CommittedChange> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, mutation.order_id).await?;
        ensure_version(&order, mutation.expected_version)?;
        let change = apply_locked(&mut tx, mutation).await?;
        tx.commit().await?;
        Ok(change)
    }

    async fn commit_batch(&self, mutations: Vec<OrderMutation>) -> PersistenceResult<BatchCommit> {
        let mut ids: Vec<Uuid> = mutations.iter().map(|m| m.order_id).collect();
        ids.sort();

        let mut tx = self.pool.begin().await?;
        let locked = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Order::try_from)
        .collect::<PersistenceResult<Vec<_>>>()?;

        for mutation in &mutations {
            let order = locked
                .iter()
                .find(|order| order.id == mutation.order_id)
                .ok_or(PersistenceError::OrderNotFound {
                    order_id: mutation.order_id,
                })?;
            ensure_version(order, mutation.expected_version)?;
        }

        let mut committed = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            committed.push(apply_locked(&mut tx, mutation).await?);
        }
        tx.commit().await?;

        debug!(orders = committed.len(), "Batch committed");
        Ok(BatchCommit::Complete(committed))
    }

    async fn tracking_log(
        &self,
        order_id: Uuid,
        pagination: Pagination,
    ) -> PersistenceResult<Page<TrackingLogEntry>> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM order_tracking_logs WHERE order_id = $1")
                .bind(order_id)
                .fetch_one(&self.pool)
                .await?;

        let entries = sqlx::query_as::<_, TrackingLogRow>(
            r#"
            SELECT * FROM order_tracking_logs
            WHERE order_id = $1
            ORDER BY sort_key DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(order_id)
        .bind(i64::from(pagination.limit()))
        .bind(i64::from(pagination.offset()))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(TrackingLogEntry::try_from)
        .collect::<PersistenceResult<Vec<_>>>()?;

        Ok(Page::new(entries, total.max(0) as u64, pagination))
    }

    async fn payment_milestones(&self, order_id: Uuid) -> PersistenceResult<Vec<PaymentMilestone>> {
        sqlx::query_as::<_, PaymentMilestoneRow>(
            r#"
            SELECT order_id, checkout_session_id, milestone, paid, approved_by_user_id, approved_at
            FROM payment_milestones
            WHERE order_id = $1
            ORDER BY CASE milestone WHEN 'first' THEN 0 ELSE 1 END
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PaymentMilestone::try_from)
        .collect()
    }

    async fn set_scheduled_transition_at(
        &self,
        order_id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> PersistenceResult<()> {
        let result = sqlx::query("UPDATE orders SET scheduled_transition_at = $2 WHERE id = $1")
            .bind(order_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::OrderNotFound { order_id });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PgNoteStore {
    pool: PgPool,
}

impl PgNoteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoteStore for PgNoteStore {
    async fn insert_note(&self, note: NewNote) -> PersistenceResult<Note> {
        let note = note.into_note(Utc::now());
        let row = sqlx::query_as::<_, NoteRow>(
            r#"
            INSERT INTO order_notes
                (id, target_type, target_id, author_user_id, body, mentioned_user_ids, attachments, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(note.id)
        .bind(&note.target.target_type)
        .bind(note.target.target_id)
        .bind(note.author_user_id)
        .bind(&note.body)
        .bind(&note.mentioned_user_ids)
        .bind(serde_json::to_value(&note.attachments)?)
        .bind(note.created_at)
        .fetch_one(&self.pool)
        .await?;
        Note::try_from(row)
    }

    async fn list_notes(
        &self,
        target: &NoteTarget,
        pagination: Pagination,
    ) -> PersistenceResult<Page<Note>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM order_notes WHERE target_type = $1 AND target_id = $2",
        )
        .bind(&target.target_type)
        .bind(target.target_id)
        .fetch_one(&self.pool)
        .await?;

        let notes = sqlx::query_as::<_, NoteRow>(
            r#"
            SELECT * FROM order_notes
            WHERE target_type = $1 AND target_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&target.target_type)
        .bind(target.target_id)
        .bind(i64::from(pagination.limit()))
        .bind(i64::from(pagination.offset()))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Note::try_from)
        .collect::<PersistenceResult<Vec<_>>>()?;

        Ok(Page::new(notes, total.max(0) as u64, pagination))
    }

    async fn mark_seen(
        &self,
        user_id: Uuid,
        target: &NoteTarget,
        seen_at: DateTime<Utc>,
    ) -> PersistenceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_note_seen_markers (user_id, target_type, target_id, seen_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, target_type, target_id) DO UPDATE
            SET seen_at = GREATEST(order_note_seen_markers.seen_at, EXCLUDED.seen_at)
            "#,
        )
        .bind(user_id)
        .bind(&target.target_type)
        .bind(target.target_id)
        .bind(seen_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unread_count(&self, user_id: Uuid, target: &NoteTarget) -> PersistenceResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM order_notes n
            WHERE n.target_type = $2
              AND n.target_id = $3
              AND n.author_user_id <> $1
              AND n.created_at > COALESCE(
                  (SELECT seen_at FROM order_note_seen_markers
                   WHERE user_id = $1 AND target_type = $2 AND target_id = $3),
                  '-infinity'::timestamptz)
            "#,
        )
        .bind(user_id)
        .bind(&target.target_type)
        .bind(target.target_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}
