//! # Notes
//!
//! Free-text comments attached to an order or one of its sub-entities, with
//! mention lists and per-user seen markers for unread counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use super::order::Attachment;
use crate::state_machine::errors::PersistenceError;

/// What a note is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteTarget {
    /// e.g. `bulk_purchase_order`, `purchase_order`, `inquiry_seller_request`
    pub target_type: String,
    pub target_id: Uuid,
}

impl NoteTarget {
    pub fn new(target_type: impl Into<String>, target_id: Uuid) -> Self {
        Self {
            target_type: target_type.into(),
            target_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub target: NoteTarget,
    pub author_user_id: Uuid,
    pub body: String,
    pub mentioned_user_ids: Vec<Uuid>,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNote {
    pub target: NoteTarget,
    pub author_user_id: Uuid,
    pub body: String,
    pub mentioned_user_ids: Vec<Uuid>,
    pub attachments: Vec<Attachment>,
}

impl NewNote {
    pub fn into_note(self, created_at: DateTime<Utc>) -> Note {
        Note {
            id: Uuid::new_v4(),
            target: self.target,
            author_user_id: self.author_user_id,
            body: self.body,
            mentioned_user_ids: self.mentioned_user_ids,
            attachments: self.attachments,
            created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct NoteRow {
    pub id: Uuid,
    pub target_type: String,
    pub target_id: Uuid,
    pub author_user_id: Uuid,
    pub body: String,
    pub mentioned_user_ids: Vec<Uuid>,
    pub attachments: Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<NoteRow> for Note {
    type Error = PersistenceError;

    fn try_from(row: NoteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            target: NoteTarget::new(row.target_type, row.target_id),
            author_user_id: row.author_user_id,
            body: row.body,
            mentioned_user_ids: row.mentioned_user_ids,
            attachments: serde_json::from_value(row.attachments)?,
            created_at: row.created_at,
        })
    }
}
