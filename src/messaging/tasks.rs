//! # Side-Effect Tasks
//!
//! Closed catalogue of asynchronous tasks the lifecycle core hands to the
//! task queue. Each variant carries a typed payload with enough data for a
//! worker to replay it without reading the transition that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::models::NoteTarget;
use crate::state_machine::context::Actor;
use crate::state_machine::events::{
    LifecycleEvent, MilestoneType, PaymentOperation, TrackingAction,
};
use crate::state_machine::states::OrderKind;

/// CRM events tracked for buyers and sellers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrmEvent {
    BulkPoSendQuotation,
    BulkPoApproveQuotation,
    BulkPoRejectQuotation,
    BulkPoMarkRawMaterial,
    BulkPoMarkPps,
    BulkPoMarkProduction,
    BulkPoMarkQc,
    BulkPoBuyerApproveQc,
    BulkPoMarkDelivering,
    BulkPoBuyerConfirmDelivered,
    BulkPoMarkDelivered,
    BulkPoFirstPaymentSubmitted,
    BulkPoFirstPaymentSucceeded,
    BulkPoFinalPaymentSubmitted,
    BulkPoFinalPaymentSucceeded,
    BulkPoPaymentReverted,
    BulkPoCanceled,
    BulkPoRefunded,
    PoUpdateDesign,
    PoApproveDesign,
    PoBuyerRejectDesign,
    PoMarkRawMaterial,
    PoMarkMaking,
    PoMarkSubmit,
    PoMarkDelivering,
    PoConfirmDelivered,
    PoMarkDelivered,
    PoBuyerPaymentSubmitted,
    PoBuyerPaymentSucceeded,
    PoPaymentReverted,
    AdminPoCanceled,
    PoRefunded,
    SellerPoApproved,
    SellerPoRejected,
    SellerPoStatusChanged,
    SellerPoCanceled,
}

impl CrmEvent {
    /// CRM event for a committed transition; `changed` is false for payment no-ops
    pub fn for_transition(kind: OrderKind, event: &LifecycleEvent, changed: bool) -> Option<Self> {
        match event {
            LifecycleEvent::Tracking { action } => Self::for_tracking(kind, *action),
            LifecycleEvent::Payment {
                operation,
                milestone,
            } if changed => Self::for_payment(kind, *operation, *milestone),
            LifecycleEvent::Payment { .. } | LifecycleEvent::AssignPic => None,
        }
    }

    fn for_tracking(kind: OrderKind, action: TrackingAction) -> Option<Self> {
        use TrackingAction as A;
        let event = match kind {
            OrderKind::BulkPurchaseOrder => match action {
                A::SendQuotation => Self::BulkPoSendQuotation,
                A::ApproveQuotation => Self::BulkPoApproveQuotation,
                A::RejectQuotation => Self::BulkPoRejectQuotation,
                A::MarkRawMaterial => Self::BulkPoMarkRawMaterial,
                A::MarkPps => Self::BulkPoMarkPps,
                A::MarkProduction => Self::BulkPoMarkProduction,
                A::MarkQc => Self::BulkPoMarkQc,
                A::BuyerApproveQc => Self::BulkPoBuyerApproveQc,
                A::MarkDelivering => Self::BulkPoMarkDelivering,
                A::ConfirmDelivered => Self::BulkPoBuyerConfirmDelivered,
                A::MarkDelivered => Self::BulkPoMarkDelivered,
                A::Cancel => Self::BulkPoCanceled,
                A::Refund => Self::BulkPoRefunded,
                _ => return None,
            },
            OrderKind::PurchaseOrder => match action {
                A::UpdateDesign => Self::PoUpdateDesign,
                A::ApproveDesign => Self::PoApproveDesign,
                A::RejectDesign => Self::PoBuyerRejectDesign,
                A::MarkRawMaterial => Self::PoMarkRawMaterial,
                A::MarkMaking => Self::PoMarkMaking,
                A::MarkSubmit => Self::PoMarkSubmit,
                A::MarkDelivering => Self::PoMarkDelivering,
                A::ConfirmDelivered => Self::PoConfirmDelivered,
                A::MarkDelivered => Self::PoMarkDelivered,
                A::Cancel => Self::AdminPoCanceled,
                A::Refund => Self::PoRefunded,
                _ => return None,
            },
            OrderKind::SellerPurchaseOrder => match action {
                A::SellerApprovePo => Self::SellerPoApproved,
                A::SellerRejectPo => Self::SellerPoRejected,
                A::Cancel => Self::SellerPoCanceled,
                _ => Self::SellerPoStatusChanged,
            },
        };
        Some(event)
    }

    fn for_payment(
        kind: OrderKind,
        operation: PaymentOperation,
        milestone: MilestoneType,
    ) -> Option<Self> {
        use MilestoneType::{Final, First};
        use PaymentOperation::{MarkPaid, MarkUnpaid, SubmitPayment};
        let event = match (kind, operation, milestone) {
            (OrderKind::BulkPurchaseOrder, SubmitPayment, First) => Self::BulkPoFirstPaymentSubmitted,
            (OrderKind::BulkPurchaseOrder, SubmitPayment, Final) => Self::BulkPoFinalPaymentSubmitted,
            (OrderKind::BulkPurchaseOrder, MarkPaid, First) => Self::BulkPoFirstPaymentSucceeded,
            (OrderKind::BulkPurchaseOrder, MarkPaid, Final) => Self::BulkPoFinalPaymentSucceeded,
            (OrderKind::BulkPurchaseOrder, MarkUnpaid, _) => Self::BulkPoPaymentReverted,
            (OrderKind::PurchaseOrder, SubmitPayment, _) => Self::PoBuyerPaymentSubmitted,
            (OrderKind::PurchaseOrder, MarkPaid, _) => Self::PoBuyerPaymentSucceeded,
            (OrderKind::PurchaseOrder, MarkUnpaid, _) => Self::PoPaymentReverted,
            (OrderKind::SellerPurchaseOrder, _, _) => return None,
        };
        Some(event)
    }
}

/// In-app notification categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    OrderStatusChanged,
    PaymentSubmitted,
    PaymentConfirmed,
    PaymentReverted,
    NoteMentioned,
    PicAssigned,
}

/// A task for the asynchronous worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum QueuedTask {
    TrackCrmEvent {
        user_id: Uuid,
        event: CrmEvent,
        data: Value,
    },
    CreateUserNotification {
        user_id: Uuid,
        notification_type: NotificationType,
        message: String,
        order_id: Uuid,
        reference_id: String,
        actor_user_id: Uuid,
    },
    SyncCrmDeal {
        order_id: Uuid,
        kind: OrderKind,
    },
    CreatePaymentInvoice {
        order_id: Uuid,
        milestone: MilestoneType,
        approved_by_user_id: Uuid,
    },
    NotifyAdminConfirmPayment {
        order_id: Uuid,
        reference_id: String,
        milestone: MilestoneType,
    },
    NewOrderNote {
        note_id: Uuid,
        target: NoteTarget,
        author_user_id: Uuid,
        recipient_user_ids: Vec<Uuid>,
    },
    /// Deferred call back into the transition executor
    ScheduledTransition {
        order_id: Uuid,
        action: TrackingAction,
        actor: Actor,
        scheduled_for: DateTime<Utc>,
    },
}

impl QueuedTask {
    pub fn task_name(&self) -> &'static str {
        match self {
            Self::TrackCrmEvent { .. } => "track_crm_event",
            Self::CreateUserNotification { .. } => "create_user_notification",
            Self::SyncCrmDeal { .. } => "sync_crm_deal",
            Self::CreatePaymentInvoice { .. } => "create_payment_invoice",
            Self::NotifyAdminConfirmPayment { .. } => "notify_admin_confirm_payment",
            Self::NewOrderNote { .. } => "new_order_note",
            Self::ScheduledTransition { .. } => "scheduled_transition",
        }
    }

    /// Order this task concerns, if any
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            Self::TrackCrmEvent { .. } | Self::NewOrderNote { .. } => None,
            Self::CreateUserNotification { order_id, .. }
            | Self::SyncCrmDeal { order_id, .. }
            | Self::CreatePaymentInvoice { order_id, .. }
            | Self::NotifyAdminConfirmPayment { order_id, .. }
            | Self::ScheduledTransition { order_id, .. } => Some(*order_id),
        }
    }
}

impl fmt::Display for QueuedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.task_name())
    }
}
