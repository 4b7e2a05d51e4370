use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::state_machine::errors::PersistenceError;
use crate::state_machine::events::MilestoneType;

/// Paid/unpaid flag for one milestone of one order.
///
/// Rows are upserted on every payment operation that changes the status, so siblings in a
/// checkout session always carry the same value after a batch commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMilestone {
    pub order_id: Uuid,
    pub checkout_session_id: Option<String>,
    pub milestone: MilestoneType,
    pub paid: bool,
    pub approved_by_user_id: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentMilestoneRow {
    pub order_id: Uuid,
    pub checkout_session_id: Option<String>,
    pub milestone: String,
    pub paid: bool,
    pub approved_by_user_id: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentMilestoneRow> for PaymentMilestone {
    type Error = PersistenceError;

    fn try_from(row: PaymentMilestoneRow) -> Result<Self, Self::Error> {
        let milestone = row
            .milestone
            .parse()
            .map_err(|_| PersistenceError::InvalidStoredValue {
                field: "payment_milestones.milestone",
                value: row.milestone.clone(),
            })?;

        Ok(Self {
            order_id: row.order_id,
            checkout_session_id: row.checkout_session_id,
            milestone,
            paid: row.paid,
            approved_by_user_id: row.approved_by_user_id,
            approved_at: row.approved_at,
        })
    }
}
