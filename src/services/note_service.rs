use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::messaging::dispatcher::{DispatchReport, SideEffectDispatcher};
use crate::messaging::queue::EnqueueOptions;
use crate::messaging::tasks::QueuedTask;
use crate::models::{NewNote, Note, NoteTarget, Page, Pagination};
use crate::state_machine::errors::{PersistenceError, PersistenceResult};
use crate::state_machine::persistence::OrderStore;
use crate::state_machine::states::OrderKind;

/// Storage for notes and per-user seen markers
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn insert_note(&self, note: NewNote) -> PersistenceResult<Note>;

    /// Notes on `target`, newest first
    async fn list_notes(
        &self,
        target: &NoteTarget,
        pagination: Pagination,
    ) -> PersistenceResult<Page<Note>>;

    /// Record that `user_id` has read `target` up to `seen_at`; markers never move backwards
    async fn mark_seen(
        &self,
        user_id: Uuid,
        target: &NoteTarget,
        seen_at: DateTime<Utc>,
    ) -> PersistenceResult<()>;

    /// Notes by other users on `target` newer than the user's seen marker
    async fn unread_count(&self, user_id: Uuid, target: &NoteTarget) -> PersistenceResult<u64>;
}

#[derive(Error, Debug)]
pub enum NoteError {
    #[error("Note body must not be empty")]
    EmptyBody,

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

pub type NoteResult<T> = Result<T, NoteError>;

/// A stored note and the fan-out it triggered
#[derive(Debug, Clone, PartialEq)]
pub struct AddedNote {
    pub note: Note,
    pub recipient_user_ids: Vec<Uuid>,
    pub dispatch: DispatchReport,
}

/// Notes on orders and their sub-entities
pub struct NoteService {
    notes: Arc<dyn NoteStore>,
    orders: Arc<dyn OrderStore>,
    dispatcher: Arc<SideEffectDispatcher>,
    enqueue_options: EnqueueOptions,
}

impl NoteService {
    pub fn new(
        notes: Arc<dyn NoteStore>,
        orders: Arc<dyn OrderStore>,
        dispatcher: Arc<SideEffectDispatcher>,
        enqueue_options: EnqueueOptions,
    ) -> Self {
        Self {
            notes,
            orders,
            dispatcher,
            enqueue_options,
        }
    }

    /// Store a note and notify mentioned users and the order's participants
    pub async fn add_note(&self, note: NewNote) -> NoteResult<AddedNote> {
        if note.body.trim().is_empty() && note.attachments.is_empty() {
            return Err(NoteError::EmptyBody);
        }

        let note = self.notes.insert_note(note).await?;
        let recipient_user_ids = self.recipients(&note).await?;

        let mut dispatch = DispatchReport::default();
        if !recipient_user_ids.is_empty() {
            let task = QueuedTask::NewOrderNote {
                note_id: note.id,
                target: note.target.clone(),
                author_user_id: note.author_user_id,
                recipient_user_ids: recipient_user_ids.clone(),
            };
            if self
                .dispatcher
                .enqueue_best_effort(task, self.enqueue_options.clone())
                .await
            {
                dispatch.enqueued += 1;
            } else {
                dispatch.failed += 1;
            }
        }

        info!(
            note_id = %note.id,
            target_type = %note.target.target_type,
            target_id = %note.target.target_id,
            recipients = recipient_user_ids.len(),
            "📝 Note added"
        );

        Ok(AddedNote {
            note,
            recipient_user_ids,
            dispatch,
        })
    }

    pub async fn paginate(
        &self,
        target: &NoteTarget,
        pagination: Pagination,
    ) -> NoteResult<Page<Note>> {
        Ok(self.notes.list_notes(target, pagination).await?)
    }

    pub async fn mark_seen(&self, user_id: Uuid, target: &NoteTarget) -> NoteResult<()> {
        self.notes.mark_seen(user_id, target, Utc::now()).await?;
        debug!(user_id = %user_id, target_id = %target.target_id, "Notes marked seen");
        Ok(())
    }

    pub async fn unread_count(&self, user_id: Uuid, target: &NoteTarget) -> NoteResult<u64> {
        Ok(self.notes.unread_count(user_id, target).await?)
    }

    /// Mentioned users plus, for order targets, the buyer, seller and assignees
    async fn recipients(&self, note: &Note) -> PersistenceResult<Vec<Uuid>> {
        let mut recipients = note.mentioned_user_ids.clone();

        if OrderKind::from_str(&note.target.target_type).is_ok() {
            if let Some(order) = self.orders.find_order(note.target.target_id).await? {
                recipients.push(order.user_id);
                recipients.extend(order.seller_id);
                recipients.extend(order.assignee_ids.iter().copied());
            }
        }

        recipients.retain(|user_id| *user_id != note.author_user_id);
        recipients.sort();
        recipients.dedup();
        Ok(recipients)
    }
}
