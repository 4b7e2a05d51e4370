//! # Transition Context
//!
//! Attribution carried through every lifecycle operation.
//!
//! Callers authenticate upstream and pass an explicit [`Actor`]; nothing in the
//! core reads ambient request state. The optional correlation id links a
//! transition to the request (or scheduled task) that caused it and is merged
//! into the tracking log metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::models::Attachment;

/// Role an actor holds on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Admin,
    Buyer,
    Seller,
    /// Scheduled tasks and other automation
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller of a lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: ActorRole) -> Self {
        Self { user_id, role }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, ActorRole::Admin)
    }

    pub fn buyer(user_id: Uuid) -> Self {
        Self::new(user_id, ActorRole::Buyer)
    }

    pub fn seller(user_id: Uuid) -> Self {
        Self::new(user_id, ActorRole::Seller)
    }

    pub fn system(user_id: Uuid) -> Self {
        Self::new(user_id, ActorRole::System)
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, ActorRole::Admin | ActorRole::System)
    }
}

/// Who performed a transition and what they attached to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionContext {
    pub actor: Actor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl TransitionContext {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            note: None,
            attachments: Vec::new(),
            correlation_id: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Non-blank note text, if any
    pub fn reason(&self) -> Option<&str> {
        self.note.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    /// Merge attribution into existing transition metadata.
    ///
    /// Non-object metadata is replaced by an object holding the attribution.
    pub fn merge_into_metadata(&self, metadata: Value) -> Value {
        let mut map = match metadata {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        map.insert("actor_role".to_string(), Value::from(self.actor.role.as_str()));
        if let Some(correlation_id) = self.correlation_id {
            map.insert(
                "correlation_id".to_string(),
                Value::from(correlation_id.to_string()),
            );
        }
        Value::Object(map)
    }
}
