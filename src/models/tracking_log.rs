//! # Tracking Log
//!
//! Append-only audit trail of every committed order transition, including
//! payment operations that leave the tracking status untouched.
//!
//! Entries are ordered per order by `sort_key`, which is assigned inside the
//! same transaction that writes the order row, so it is gapless and monotonic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use super::order::Attachment;
use crate::state_machine::errors::PersistenceError;
use crate::state_machine::states::{PaymentStatus, TrackingStatus};

/// Immutable record of a single transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingLogEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub sort_key: i32,
    /// Tracking action or `operation:milestone` for payment operations
    pub action: String,
    pub from_status: TrackingStatus,
    pub to_status: TrackingStatus,
    pub payment_from: Option<PaymentStatus>,
    pub payment_to: Option<PaymentStatus>,
    pub actor_user_id: Uuid,
    pub actor_role: String,
    pub note: Option<String>,
    pub attachments: Vec<Attachment>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl TrackingLogEntry {
    /// Payment entries that did not change the payment status
    pub fn is_no_op(&self) -> bool {
        self.from_status == self.to_status && self.payment_from == self.payment_to
    }
}

/// Entry to append; `sort_key` and `created_at` are assigned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrackingLogEntry {
    pub order_id: Uuid,
    pub action: String,
    pub from_status: TrackingStatus,
    pub to_status: TrackingStatus,
    pub payment_from: Option<PaymentStatus>,
    pub payment_to: Option<PaymentStatus>,
    pub actor_user_id: Uuid,
    pub actor_role: String,
    pub note: Option<String>,
    pub attachments: Vec<Attachment>,
    pub metadata: Value,
}

impl NewTrackingLogEntry {
    pub fn into_entry(self, sort_key: i32, created_at: DateTime<Utc>) -> TrackingLogEntry {
        TrackingLogEntry {
            id: Uuid::new_v4(),
            order_id: self.order_id,
            sort_key,
            action: self.action,
            from_status: self.from_status,
            to_status: self.to_status,
            payment_from: self.payment_from,
            payment_to: self.payment_to,
            actor_user_id: self.actor_user_id,
            actor_role: self.actor_role,
            note: self.note,
            attachments: self.attachments,
            metadata: self.metadata,
            created_at,
        }
    }
}

/// Raw `order_tracking_logs` row
#[derive(Debug, Clone, FromRow)]
pub struct TrackingLogRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub sort_key: i32,
    pub action: String,
    pub from_status: String,
    pub to_status: String,
    pub payment_from: Option<String>,
    pub payment_to: Option<String>,
    pub actor_user_id: Uuid,
    pub actor_role: String,
    pub note: Option<String>,
    pub attachments: Value,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

fn parse_column<T: std::str::FromStr>(
    field: &'static str,
    value: &str,
) -> Result<T, PersistenceError> {
    value
        .parse()
        .map_err(|_| PersistenceError::InvalidStoredValue {
            field,
            value: value.to_string(),
        })
}

impl TryFrom<TrackingLogRow> for TrackingLogEntry {
    type Error = PersistenceError;

    fn try_from(row: TrackingLogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            sort_key: row.sort_key,
            from_status: parse_column("order_tracking_logs.from_status", &row.from_status)?,
            to_status: parse_column("order_tracking_logs.to_status", &row.to_status)?,
            payment_from: row
                .payment_from
                .as_deref()
                .map(|v| parse_column("order_tracking_logs.payment_from", v))
                .transpose()?,
            payment_to: row
                .payment_to
                .as_deref()
                .map(|v| parse_column("order_tracking_logs.payment_to", v))
                .transpose()?,
            attachments: serde_json::from_value(row.attachments)?,
            action: row.action,
            actor_user_id: row.actor_user_id,
            actor_role: row.actor_role,
            note: row.note,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}
