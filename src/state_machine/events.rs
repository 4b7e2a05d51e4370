use serde::{Deserialize, Serialize};
use std::fmt;

/// Actions that move an order through its tracking pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingAction {
    SendQuotation,
    ApproveQuotation,
    RejectQuotation,
    UpdateDesign,
    ApproveDesign,
    RejectDesign,
    SellerApprovePo,
    SellerRejectPo,
    MarkRawMaterial,
    MarkPps,
    MarkProduction,
    MarkInspection,
    MarkQc,
    BuyerApproveQc,
    MarkMaking,
    MarkSubmit,
    MarkDelivering,
    /// Buyer confirms receipt
    ConfirmDelivered,
    /// Staff closes delivery without buyer confirmation
    MarkDelivered,
    Cancel,
    Refund,
}

impl TrackingAction {
    pub const ALL: [TrackingAction; 21] = [
        Self::SendQuotation,
        Self::ApproveQuotation,
        Self::RejectQuotation,
        Self::UpdateDesign,
        Self::ApproveDesign,
        Self::RejectDesign,
        Self::SellerApprovePo,
        Self::SellerRejectPo,
        Self::MarkRawMaterial,
        Self::MarkPps,
        Self::MarkProduction,
        Self::MarkInspection,
        Self::MarkQc,
        Self::BuyerApproveQc,
        Self::MarkMaking,
        Self::MarkSubmit,
        Self::MarkDelivering,
        Self::ConfirmDelivered,
        Self::MarkDelivered,
        Self::Cancel,
        Self::Refund,
    ];

    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SendQuotation => "send_quotation",
            Self::ApproveQuotation => "approve_quotation",
            Self::RejectQuotation => "reject_quotation",
            Self::UpdateDesign => "update_design",
            Self::ApproveDesign => "approve_design",
            Self::RejectDesign => "reject_design",
            Self::SellerApprovePo => "seller_approve_po",
            Self::SellerRejectPo => "seller_reject_po",
            Self::MarkRawMaterial => "mark_raw_material",
            Self::MarkPps => "mark_pps",
            Self::MarkProduction => "mark_production",
            Self::MarkInspection => "mark_inspection",
            Self::MarkQc => "mark_qc",
            Self::BuyerApproveQc => "buyer_approve_qc",
            Self::MarkMaking => "mark_making",
            Self::MarkSubmit => "mark_submit",
            Self::MarkDelivering => "mark_delivering",
            Self::ConfirmDelivered => "confirm_delivered",
            Self::MarkDelivered => "mark_delivered",
            Self::Cancel => "cancel",
            Self::Refund => "refund",
        }
    }

    /// Payment-adjacent actions stay legal after an order reaches a terminal state
    pub fn is_payment_adjacent(&self) -> bool {
        matches!(self, Self::Refund)
    }

    /// Rejections and cancellations must carry a reason
    pub fn requires_reason(&self) -> bool {
        matches!(
            self,
            Self::RejectQuotation | Self::RejectDesign | Self::SellerRejectPo | Self::Cancel
        )
    }
}

impl fmt::Display for TrackingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

impl std::str::FromStr for TrackingAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|action| action.event_type() == s)
            .copied()
            .ok_or_else(|| format!("Invalid tracking action: {s}"))
    }
}

/// Payment milestone targeted by a payment operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneType {
    First,
    Final,
}

impl MilestoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Final => "final",
        }
    }
}

impl fmt::Display for MilestoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MilestoneType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "final" => Ok(Self::Final),
            _ => Err(format!("Invalid milestone type: {s}")),
        }
    }
}

/// Operations on the payment sub-state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOperation {
    /// Buyer reports a transfer; awaits staff confirmation
    SubmitPayment,
    MarkPaid,
    MarkUnpaid,
}

impl PaymentOperation {
    pub const ALL: [PaymentOperation; 3] = [Self::SubmitPayment, Self::MarkPaid, Self::MarkUnpaid];

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SubmitPayment => "submit_payment",
            Self::MarkPaid => "mark_paid",
            Self::MarkUnpaid => "mark_unpaid",
        }
    }
}

impl fmt::Display for PaymentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

/// Anything that produces a tracking log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Tracking {
        action: TrackingAction,
    },
    Payment {
        operation: PaymentOperation,
        milestone: MilestoneType,
    },
    /// Staff replace the order's persons in charge; statuses are untouched
    AssignPic,
}

impl LifecycleEvent {
    /// Name stored in the tracking log `action` column
    pub fn event_type(&self) -> String {
        match self {
            Self::Tracking { action } => action.event_type().to_string(),
            Self::Payment {
                operation,
                milestone,
            } => format!("{}:{}", operation.event_type(), milestone.as_str()),
            Self::AssignPic => "assign_pic".to_string(),
        }
    }

    pub fn tracking_action(&self) -> Option<TrackingAction> {
        match self {
            Self::Tracking { action } => Some(*action),
            Self::Payment { .. } | Self::AssignPic => None,
        }
    }

    pub fn is_payment(&self) -> bool {
        match self {
            Self::Tracking { action } => action.is_payment_adjacent(),
            Self::Payment { .. } => true,
            Self::AssignPic => false,
        }
    }
}

impl From<TrackingAction> for LifecycleEvent {
    fn from(action: TrackingAction) -> Self {
        Self::Tracking { action }
    }
}
