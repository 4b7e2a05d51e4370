use serde_json::json;

use super::context::Actor;
use super::errors::ActionResult;
use super::events::{LifecycleEvent, PaymentOperation};
use super::states::OrderKind;
use crate::messaging::tasks::{CrmEvent, NotificationType, QueuedTask};
use crate::models::{Order, TrackingLogEntry};

/// A transition that has been durably committed
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedTransition {
    pub order: Order,
    pub entry: TrackingLogEntry,
    pub event: LifecycleEvent,
    pub actor: Actor,
}

impl CommittedTransition {
    /// False for payment operations that left the status untouched
    pub fn changed(&self) -> bool {
        self.event == LifecycleEvent::AssignPic || !self.entry.is_no_op()
    }

    /// Common CRM/notification payload
    pub fn event_data(&self) -> serde_json::Value {
        json!({
            "order_id": self.order.id,
            "reference_id": self.order.reference_id,
            "kind": self.order.kind,
            "action": self.entry.action,
            "from_status": self.entry.from_status,
            "to_status": self.entry.to_status,
            "payment_status": self.order.payment_status,
            "actor_role": self.actor.role,
        })
    }
}

/// Plans side-effect tasks for a committed transition
pub trait StateAction: Send + Sync {
    fn plan(&self, transition: &CommittedTransition) -> ActionResult<Vec<QueuedTask>>;

    /// Get a description of this action for logging
    fn description(&self) -> &'static str;
}

/// Track a CRM event for the party the order belongs to
pub struct TrackCrmEventAction;

impl StateAction for TrackCrmEventAction {
    fn plan(&self, transition: &CommittedTransition) -> ActionResult<Vec<QueuedTask>> {
        let order = &transition.order;
        let Some(event) = CrmEvent::for_transition(order.kind, &transition.event, transition.changed())
        else {
            return Ok(Vec::new());
        };

        let user_id = match order.kind {
            OrderKind::SellerPurchaseOrder => order.seller_id.unwrap_or(order.user_id),
            _ => order.user_id,
        };

        Ok(vec![QueuedTask::TrackCrmEvent {
            user_id,
            event,
            data: transition.event_data(),
        }])
    }

    fn description(&self) -> &'static str {
        "Track CRM event for transition"
    }
}

/// In-app notification for whoever did not perform the transition
pub struct UserNotificationAction;

impl UserNotificationAction {
    fn notification_type(event: &LifecycleEvent) -> NotificationType {
        match event {
            LifecycleEvent::Tracking { .. } => NotificationType::OrderStatusChanged,
            LifecycleEvent::Payment { operation, .. } => match operation {
                PaymentOperation::SubmitPayment => NotificationType::PaymentSubmitted,
                PaymentOperation::MarkPaid => NotificationType::PaymentConfirmed,
                PaymentOperation::MarkUnpaid => NotificationType::PaymentReverted,
            },
            LifecycleEvent::AssignPic => NotificationType::PicAssigned,
        }
    }

    fn message(transition: &CommittedTransition) -> String {
        let order = &transition.order;
        match transition.event {
            LifecycleEvent::Tracking { .. } => format!(
                "{} moved from {} to {}",
                order.reference_id, transition.entry.from_status, transition.entry.to_status
            ),
            LifecycleEvent::Payment {
                operation,
                milestone,
            } => format!(
                "{} {} payment: {}",
                order.reference_id, milestone, match operation {
                    PaymentOperation::SubmitPayment => "submitted, awaiting confirmation",
                    PaymentOperation::MarkPaid => "confirmed",
                    PaymentOperation::MarkUnpaid => "marked as unpaid",
                }
            ),
            LifecycleEvent::AssignPic => format!("You are now in charge of {}", order.reference_id),
        }
    }
}

impl StateAction for UserNotificationAction {
    fn plan(&self, transition: &CommittedTransition) -> ActionResult<Vec<QueuedTask>> {
        if !transition.changed() {
            return Ok(Vec::new());
        }

        let order = &transition.order;
        let actor_id = transition.actor.user_id;
        // Only the persons in charge hear about an assignment
        let assignment = transition.event == LifecycleEvent::AssignPic;
        let mut recipients = if assignment || order.user_id == actor_id {
            order.assignee_ids.clone()
        } else {
            vec![order.user_id]
        };
        if !assignment {
            if let Some(seller_id) = order.seller_id {
                recipients.push(seller_id);
            }
        }
        recipients.retain(|user_id| *user_id != actor_id);
        recipients.sort();
        recipients.dedup();

        let notification_type = Self::notification_type(&transition.event);
        let message = Self::message(transition);
        Ok(recipients
            .into_iter()
            .map(|user_id| QueuedTask::CreateUserNotification {
                user_id,
                notification_type,
                message: message.clone(),
                order_id: order.id,
                reference_id: order.reference_id.clone(),
                actor_user_id: actor_id,
            })
            .collect())
    }

    fn description(&self) -> &'static str {
        "Notify order participants"
    }
}

/// Keep the CRM deal in step with buyer-facing orders
pub struct CrmDealSyncAction;

impl StateAction for CrmDealSyncAction {
    fn plan(&self, transition: &CommittedTransition) -> ActionResult<Vec<QueuedTask>> {
        let order = &transition.order;
        if !transition.changed() || order.kind == OrderKind::SellerPurchaseOrder {
            return Ok(Vec::new());
        }
        Ok(vec![QueuedTask::SyncCrmDeal {
            order_id: order.id,
            kind: order.kind,
        }])
    }

    fn description(&self) -> &'static str {
        "Sync CRM deal"
    }
}

/// Invoice confirmed payments, ask staff to confirm submitted ones
pub struct PaymentInvoiceAction;

impl StateAction for PaymentInvoiceAction {
    fn plan(&self, transition: &CommittedTransition) -> ActionResult<Vec<QueuedTask>> {
        let LifecycleEvent::Payment {
            operation,
            milestone,
        } = transition.event
        else {
            return Ok(Vec::new());
        };
        if !transition.changed() {
            return Ok(Vec::new());
        }

        let order = &transition.order;
        let task = match operation {
            PaymentOperation::MarkPaid => QueuedTask::CreatePaymentInvoice {
                order_id: order.id,
                milestone,
                approved_by_user_id: transition.actor.user_id,
            },
            PaymentOperation::SubmitPayment => QueuedTask::NotifyAdminConfirmPayment {
                order_id: order.id,
                reference_id: order.reference_id.clone(),
                milestone,
            },
            PaymentOperation::MarkUnpaid => return Ok(Vec::new()),
        };
        Ok(vec![task])
    }

    fn description(&self) -> &'static str {
        "Payment invoice and confirmation requests"
    }
}

/// Planners run for every committed transition, in order
pub fn default_actions() -> Vec<Box<dyn StateAction>> {
    vec![
        Box::new(TrackCrmEventAction),
        Box::new(UserNotificationAction),
        Box::new(CrmDealSyncAction),
        Box::new(PaymentInvoiceAction),
    ]
}
