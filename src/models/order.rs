//! # Order Model
//!
//! Aggregate root for sample, bulk and seller purchase orders.
//!
//! The tracking and payment statuses are only ever written by the lifecycle
//! executor; every write bumps `version`, which the executor uses as its
//! optimistic concurrency token.
//!
//! ## Database Schema
//!
//! Maps to the `orders` table:
//! ```sql
//! CREATE TABLE orders (
//!   id UUID PRIMARY KEY,
//!   reference_id TEXT NOT NULL UNIQUE,
//!   kind TEXT NOT NULL,
//!   tracking_status TEXT NOT NULL,
//!   payment_status TEXT NOT NULL,
//!   user_id UUID NOT NULL,
//!   seller_id UUID,
//!   assignee_ids UUID[] NOT NULL,
//!   checkout_session_id TEXT,
//!   inquiry_id UUID,
//!   scheduled_transition_at TIMESTAMPTZ,
//!   version BIGINT NOT NULL,
//!   -- ... timestamps
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::state_machine::errors::PersistenceError;
use crate::state_machine::states::{OrderKind, PaymentStatus, TrackingStatus};

/// File attached to a transition or a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn new(file_key: impl Into<String>) -> Self {
        Self {
            file_key: file_key.into(),
            file_name: None,
            content_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Human-readable reference shown to buyers and staff
    pub reference_id: String,
    pub kind: OrderKind,
    pub tracking_status: TrackingStatus,
    pub payment_status: PaymentStatus,
    /// Owning buyer
    pub user_id: Uuid,
    /// Factory fulfilling a seller purchase order
    pub seller_id: Option<Uuid>,
    /// Staff persons-in-charge
    pub assignee_ids: Vec<Uuid>,
    /// Orders paid together share a checkout session
    pub checkout_session_id: Option<String>,
    pub inquiry_id: Option<Uuid>,
    /// When the latest deferred transition for this order is due
    pub scheduled_transition_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_terminal(&self) -> bool {
        self.tracking_status.is_terminal()
    }

    /// Whether `user_id` is the buyer, the seller or a PIC on this order
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
            || self.seller_id == Some(user_id)
            || self.assignee_ids.contains(&user_id)
    }
}

/// New order for insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub reference_id: String,
    pub kind: OrderKind,
    pub user_id: Uuid,
    pub seller_id: Option<Uuid>,
    pub assignee_ids: Vec<Uuid>,
    pub checkout_session_id: Option<String>,
    pub inquiry_id: Option<Uuid>,
}

impl NewOrder {
    pub fn new(reference_id: impl Into<String>, kind: OrderKind, user_id: Uuid) -> Self {
        Self {
            reference_id: reference_id.into(),
            kind,
            user_id,
            seller_id: None,
            assignee_ids: Vec::new(),
            checkout_session_id: None,
            inquiry_id: None,
        }
    }

    pub fn with_checkout_session(mut self, checkout_session_id: impl Into<String>) -> Self {
        self.checkout_session_id = Some(checkout_session_id.into());
        self
    }

    pub fn with_seller(mut self, seller_id: Uuid) -> Self {
        self.seller_id = Some(seller_id);
        self
    }

    pub fn with_assignees(mut self, assignee_ids: Vec<Uuid>) -> Self {
        self.assignee_ids = assignee_ids;
        self
    }

    pub fn with_inquiry(mut self, inquiry_id: Uuid) -> Self {
        self.inquiry_id = Some(inquiry_id);
        self
    }

    /// Materialize the order in its initial state
    pub fn into_order(self, now: DateTime<Utc>) -> Order {
        Order {
            id: Uuid::new_v4(),
            reference_id: self.reference_id,
            kind: self.kind,
            tracking_status: TrackingStatus::Created,
            payment_status: PaymentStatus::Unpaid,
            user_id: self.user_id,
            seller_id: self.seller_id,
            assignee_ids: self.assignee_ids,
            checkout_session_id: self.checkout_session_id,
            inquiry_id: self.inquiry_id,
            scheduled_transition_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Raw `orders` row; statuses are stored as text
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub reference_id: String,
    pub kind: String,
    pub tracking_status: String,
    pub payment_status: String,
    pub user_id: Uuid,
    pub seller_id: Option<Uuid>,
    pub assignee_ids: Vec<Uuid>,
    pub checkout_session_id: Option<String>,
    pub inquiry_id: Option<Uuid>,
    pub scheduled_transition_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = PersistenceError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            kind: row
                .kind
                .parse()
                .map_err(|_| PersistenceError::InvalidStoredValue {
                    field: "orders.kind",
                    value: row.kind.clone(),
                })?,
            tracking_status: row.tracking_status.parse().map_err(|_| {
                PersistenceError::InvalidStoredValue {
                    field: "orders.tracking_status",
                    value: row.tracking_status.clone(),
                }
            })?,
            payment_status: row.payment_status.parse().map_err(|_| {
                PersistenceError::InvalidStoredValue {
                    field: "orders.payment_status",
                    value: row.payment_status.clone(),
                }
            })?,
            reference_id: row.reference_id,
            user_id: row.user_id,
            seller_id: row.seller_id,
            assignee_ids: row.assignee_ids,
            checkout_session_id: row.checkout_session_id,
            inquiry_id: row.inquiry_id,
            scheduled_transition_at: row.scheduled_transition_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
