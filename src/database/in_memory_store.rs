//! In-process order and note stores.
//!
//! All order state lives behind one `parking_lot::Mutex`, so every commit
//! (including a whole checkout-session batch) is a single critical section
//! and readers never observe a half-applied batch.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::{
    NewNote, NewOrder, Note, NoteTarget, Order, Page, Pagination, PaymentMilestone,
    TrackingLogEntry,
};
use crate::services::note_service::NoteStore;
use crate::state_machine::errors::{PersistenceError, PersistenceResult};
use crate::state_machine::events::MilestoneType;
use crate::state_machine::persistence::{
    ensure_version, BatchCommit, CommittedChange, OrderMutation, OrderStore,
};

#[derive(Debug, Default)]
struct OrderState {
    orders: HashMap<Uuid, Order>,
    references: HashSet<String>,
    logs: HashMap<Uuid, Vec<TrackingLogEntry>>,
    milestones: HashMap<(Uuid, MilestoneType), PaymentMilestone>,
}

impl OrderState {
    fn check(&self, mutation: &OrderMutation) -> PersistenceResult<()> {
        let order = self
            .orders
            .get(&mutation.order_id)
            .ok_or(PersistenceError::OrderNotFound {
                order_id: mutation.order_id,
            })?;
        ensure_version(order, mutation.expected_version)
    }

    fn apply(&mut self, mutation: OrderMutation, now: DateTime<Utc>) -> PersistenceResult<CommittedChange> {
        self.check(&mutation)?;
        let order = self
            .orders
            .get_mut(&mutation.order_id)
            .ok_or(PersistenceError::OrderNotFound {
                order_id: mutation.order_id,
            })?;

        order.tracking_status = mutation.tracking_status;
        order.payment_status = mutation.payment_status;
        if let Some(assignee_ids) = &mutation.assignee_ids {
            order.assignee_ids = assignee_ids.clone();
        }
        order.version += 1;
        order.updated_at = now;
        let order = order.clone();

        if let Some(update) = mutation.milestone {
            self.milestones.insert(
                (order.id, update.milestone),
                PaymentMilestone {
                    order_id: order.id,
                    checkout_session_id: order.checkout_session_id.clone(),
                    milestone: update.milestone,
                    paid: update.paid,
                    approved_by_user_id: Some(update.approved_by_user_id),
                    approved_at: Some(update.approved_at),
                },
            );
        }

        let log = self.logs.entry(order.id).or_default();
        let entry = mutation.log_entry.into_entry(log.len() as i32 + 1, now);
        log.push(entry.clone());

        Ok(CommittedChange { order, entry })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    state: Mutex<OrderState>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of log entries across all orders
    pub fn total_log_entries(&self) -> usize {
        self.state.lock().logs.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, new_order: NewOrder) -> PersistenceResult<Order> {
        let mut state = self.state.lock();
        if !state.references.insert(new_order.reference_id.clone()) {
            return Err(PersistenceError::DuplicateReference {
                reference_id: new_order.reference_id,
            });
        }
        let order = new_order.into_order(Utc::now());
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_order(&self, order_id: Uuid) -> PersistenceResult<Option<Order>> {
        Ok(self.state.lock().orders.get(&order_id).cloned())
    }

    async fn find_by_checkout_session(
        &self,
        checkout_session_id: &str,
    ) -> PersistenceResult<Vec<Order>> {
        let state = self.state.lock();
        let mut siblings: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.checkout_session_id.as_deref() == Some(checkout_session_id))
            .cloned()
            .collect();
        siblings.sort_by_key(|order| order.id);
        Ok(siblings)
    }

    async fn commit(&self, mutation: OrderMutation) -> PersistenceResult<CommittedChange> {
        self.state.lock().apply(mutation, Utc::now())
    }

    async fn commit_batch(&self, mutations: Vec<OrderMutation>) -> PersistenceResult<BatchCommit> {
        let mut state = self.state.lock();
        for mutation in &mutations {
            state.check(mutation)?;
        }

        let now = Utc::now();
        let committed = mutations
            .into_iter()
            .map(|mutation| state.apply(mutation, now))
            .collect::<PersistenceResult<Vec<_>>>()?;
        Ok(BatchCommit::Complete(committed))
    }

    async fn tracking_log(
        &self,
        order_id: Uuid,
        pagination: Pagination,
    ) -> PersistenceResult<Page<TrackingLogEntry>> {
        let mut entries = self
            .state
            .lock()
            .logs
            .get(&order_id)
            .cloned()
            .unwrap_or_default();
        entries.reverse();
        Ok(Page::from_sorted(entries, pagination))
    }

    async fn payment_milestones(&self, order_id: Uuid) -> PersistenceResult<Vec<PaymentMilestone>> {
        let state = self.state.lock();
        Ok([MilestoneType::First, MilestoneType::Final]
            .into_iter()
            .filter_map(|milestone| state.milestones.get(&(order_id, milestone)).cloned())
            .collect())
    }

    async fn set_scheduled_transition_at(
        &self,
        order_id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> PersistenceResult<()> {
        let mut state = self.state.lock();
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(PersistenceError::OrderNotFound { order_id })?;
        order.scheduled_transition_at = at;
        Ok(())
    }
}

/// Notes in a vector, seen markers in a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryNoteStore {
    notes: RwLock<Vec<Note>>,
    seen: DashMap<(Uuid, NoteTarget), DateTime<Utc>>,
}

impl InMemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NoteStore for InMemoryNoteStore {
    async fn insert_note(&self, note: NewNote) -> PersistenceResult<Note> {
        let note = note.into_note(Utc::now());
        self.notes.write().push(note.clone());
        Ok(note)
    }

    async fn list_notes(
        &self,
        target: &NoteTarget,
        pagination: Pagination,
    ) -> PersistenceResult<Page<Note>> {
        let notes: Vec<Note> = self
            .notes
            .read()
            .iter()
            .rev()
            .filter(|note| &note.target == target)
            .cloned()
            .collect();
        Ok(Page::from_sorted(notes, pagination))
    }

    async fn mark_seen(
        &self,
        user_id: Uuid,
        target: &NoteTarget,
        seen_at: DateTime<Utc>,
    ) -> PersistenceResult<()> {
        self.seen
            .entry((user_id, target.clone()))
            .and_modify(|existing| *existing = (*existing).max(seen_at))
            .or_insert(seen_at);
        Ok(())
    }

    async fn unread_count(&self, user_id: Uuid, target: &NoteTarget) -> PersistenceResult<u64> {
        let last_seen = self
            .seen
            .get(&(user_id, target.clone()))
            .map(|entry| *entry.value());

        let count = self
            .notes
            .read()
            .iter()
            .filter(|note| &note.target == target && note.author_user_id != user_id)
            .filter(|note| last_seen.map_or(true, |seen| note.created_at > seen))
            .count();
        Ok(count as u64)
    }
}
