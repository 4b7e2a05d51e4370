//! # State Machine Persistence Layer
//!
//! The executor never writes order fields directly; it hands an
//! [`OrderMutation`] to an [`OrderStore`], which must apply the status change,
//! the assignee replacement, the milestone upsert and the tracking log entry
//! atomically, and only if the stored version still equals `expected_version`.
//!
//! Multi-order payments go through [`OrderStore::commit_batch`]. Stores that can
//! lock several rows in one transaction override it to be all-or-nothing; the
//! default falls back to committing row by row and reports what is left over so
//! the executor can compensate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::{PersistenceError, PersistenceResult};
use super::events::MilestoneType;
use super::states::{PaymentStatus, TrackingStatus};
use crate::models::{
    NewOrder, NewTrackingLogEntry, Order, Page, Pagination, PaymentMilestone, TrackingLogEntry,
};

/// Upsert of one payment milestone row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneUpdate {
    pub milestone: MilestoneType,
    pub paid: bool,
    pub approved_by_user_id: Uuid,
    pub approved_at: DateTime<Utc>,
}

/// Compare-and-swap write of a single order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderMutation {
    pub order_id: Uuid,
    pub expected_version: i64,
    pub tracking_status: TrackingStatus,
    pub payment_status: PaymentStatus,
    pub milestone: Option<MilestoneUpdate>,
    /// Replacement persons in charge; `None` keeps the current list
    pub assignee_ids: Option<Vec<Uuid>>,
    pub log_entry: NewTrackingLogEntry,
}

/// Order snapshot and log entry produced by one committed mutation
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedChange {
    pub order: Order,
    pub entry: TrackingLogEntry,
}

/// Outcome of a batch commit
#[derive(Debug)]
pub enum BatchCommit {
    Complete(Vec<CommittedChange>),
    /// Some rows committed, the rest failed individually
    Partial {
        committed: Vec<CommittedChange>,
        failed: Vec<(Uuid, PersistenceError)>,
    },
}

/// Storage for orders, their tracking log and payment milestones
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: NewOrder) -> PersistenceResult<Order>;

    async fn find_order(&self, order_id: Uuid) -> PersistenceResult<Option<Order>>;

    /// Every order sharing `checkout_session_id`, ordered by id
    async fn find_by_checkout_session(
        &self,
        checkout_session_id: &str,
    ) -> PersistenceResult<Vec<Order>>;

    /// Apply one mutation atomically; `StaleVersion` when the order moved on
    async fn commit(&self, mutation: OrderMutation) -> PersistenceResult<CommittedChange>;

    /// Apply several mutations.
    ///
    /// The default commits row by row: a stale first row aborts before anything
    /// is written, later failures are collected into [`BatchCommit::Partial`].
    async fn commit_batch(&self, mutations: Vec<OrderMutation>) -> PersistenceResult<BatchCommit> {
        let mut committed = Vec::with_capacity(mutations.len());
        let mut failed = Vec::new();

        for mutation in mutations {
            let order_id = mutation.order_id;
            match self.commit(mutation).await {
                Ok(change) => committed.push(change),
                Err(err) if committed.is_empty() && failed.is_empty() => return Err(err),
                Err(err) => failed.push((order_id, err)),
            }
        }

        if failed.is_empty() {
            Ok(BatchCommit::Complete(committed))
        } else {
            Ok(BatchCommit::Partial { committed, failed })
        }
    }

    /// Tracking log for an order, newest first
    async fn tracking_log(
        &self,
        order_id: Uuid,
        pagination: Pagination,
    ) -> PersistenceResult<Page<TrackingLogEntry>>;

    async fn payment_milestones(&self, order_id: Uuid) -> PersistenceResult<Vec<PaymentMilestone>>;

    /// Record when the latest deferred transition for an order is due
    async fn set_scheduled_transition_at(
        &self,
        order_id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> PersistenceResult<()>;
}

/// Check the optimistic concurrency token of a loaded order
pub fn ensure_version(order: &Order, expected_version: i64) -> PersistenceResult<()> {
    if order.version != expected_version {
        return Err(PersistenceError::StaleVersion {
            order_id: order.id,
            expected: expected_version,
            actual: order.version,
        });
    }
    Ok(())
}
