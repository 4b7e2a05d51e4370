use async_trait::async_trait;

use super::context::{Actor, ActorRole, TransitionContext};
use super::errors::{business_rule_violation, GuardError, GuardResult};
use super::events::{LifecycleEvent, PaymentOperation, TrackingAction};
use super::states::{OrderKind, PaymentStatus};
use crate::models::Order;

/// Trait for implementing state transition guards
#[async_trait]
pub trait StateGuard: Send + Sync {
    /// Reject the transition with a `GuardError` when the rule does not hold
    async fn check(
        &self,
        order: &Order,
        event: &LifecycleEvent,
        context: &TransitionContext,
    ) -> GuardResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Rejections and cancellations must explain themselves in the note
pub struct ReasonRequiredGuard;

#[async_trait]
impl StateGuard for ReasonRequiredGuard {
    async fn check(
        &self,
        order: &Order,
        event: &LifecycleEvent,
        context: &TransitionContext,
    ) -> GuardResult<()> {
        match event.tracking_action() {
            Some(action) if action.requires_reason() && context.reason().is_none() => {
                Err(business_rule_violation(format!(
                    "{action} on order {} requires a reason",
                    order.reference_id
                )))
            }
            _ => Ok(()),
        }
    }

    fn description(&self) -> &'static str {
        "Rejections and cancellations require a reason"
    }
}

/// Bulk orders ship only once the final payment is confirmed
pub struct FinalPaymentBeforeDeliveryGuard;

#[async_trait]
impl StateGuard for FinalPaymentBeforeDeliveryGuard {
    async fn check(
        &self,
        order: &Order,
        event: &LifecycleEvent,
        _context: &TransitionContext,
    ) -> GuardResult<()> {
        let ships = event.tracking_action() == Some(TrackingAction::MarkDelivering);
        if ships
            && order.kind == OrderKind::BulkPurchaseOrder
            && order.payment_status != PaymentStatus::FinalPaymentConfirmed
        {
            return Err(business_rule_violation(format!(
                "order {} cannot ship before the final payment is confirmed (payment status: {})",
                order.reference_id, order.payment_status
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Bulk orders must be fully paid before delivery"
    }
}

/// Decides whether an actor may perform an event on an order.
///
/// Authentication happens upstream; implementations only answer "is this
/// actor known" and "is this actor allowed".
#[async_trait]
pub trait ActionPolicy: Send + Sync {
    async fn authorize(
        &self,
        actor: &Actor,
        order: &Order,
        event: &LifecycleEvent,
    ) -> GuardResult<()>;
}

/// Default policy keyed on the actor's role and relation to the order
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleBasedPolicy;

impl RoleBasedPolicy {
    fn buyer_may(event: &LifecycleEvent) -> bool {
        use TrackingAction as A;
        match event {
            LifecycleEvent::Tracking { action } => matches!(
                action,
                A::ApproveQuotation
                    | A::RejectQuotation
                    | A::ApproveDesign
                    | A::RejectDesign
                    | A::BuyerApproveQc
                    | A::ConfirmDelivered
            ),
            LifecycleEvent::Payment { operation, .. } => {
                *operation == PaymentOperation::SubmitPayment
            }
            LifecycleEvent::AssignPic => false,
        }
    }

    fn seller_may(event: &LifecycleEvent) -> bool {
        use TrackingAction as A;
        matches!(
            event.tracking_action(),
            Some(
                A::SellerApprovePo
                    | A::SellerRejectPo
                    | A::MarkRawMaterial
                    | A::MarkPps
                    | A::MarkProduction
                    | A::MarkInspection
                    | A::MarkQc
                    | A::MarkDelivering
                    | A::MarkDelivered
            )
        )
    }
}

#[async_trait]
impl ActionPolicy for RoleBasedPolicy {
    async fn authorize(
        &self,
        actor: &Actor,
        order: &Order,
        event: &LifecycleEvent,
    ) -> GuardResult<()> {
        if actor.user_id.is_nil() {
            return Err(GuardError::UnknownActor {
                user_id: actor.user_id,
            });
        }

        let allowed = match actor.role {
            ActorRole::Admin | ActorRole::System => true,
            ActorRole::Buyer => order.user_id == actor.user_id && Self::buyer_may(event),
            ActorRole::Seller => {
                order.kind == OrderKind::SellerPurchaseOrder
                    && order.seller_id == Some(actor.user_id)
                    && Self::seller_may(event)
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(GuardError::Forbidden {
                user_id: actor.user_id,
                role: actor.role.to_string(),
                action: event.event_type(),
            })
        }
    }
}
