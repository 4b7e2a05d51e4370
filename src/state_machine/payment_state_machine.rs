//! # Payment Milestone Tracker
//!
//! Payment operations on top of the transition executor. An order that belongs
//! to a checkout session is paid together with every sibling in that session:
//! all siblings are validated before anything is written, then committed as
//! one batch.
//!
//! When the store can only commit sibling by sibling and some rows fail, the
//! pending siblings are reloaded and retried with backoff. Anything still
//! pending afterwards is reported as [`StateMachineError::PartialMultiOrderFailure`].

use tracing::{error, info, warn};
use uuid::Uuid;

use super::actions::CommittedTransition;
use super::context::TransitionContext;
use super::errors::{StateMachineError, StateMachineResult};
use super::events::{LifecycleEvent, MilestoneType, PaymentOperation};
use super::order_state_machine::{OrderStateMachine, PlannedMutation};
use super::persistence::{BatchCommit, CommittedChange};
use crate::messaging::dispatcher::DispatchReport;
use crate::models::{Order, PaymentMilestone, TrackingLogEntry};

/// Which orders a payment operation addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentTarget {
    /// One order; widened to its checkout session when it has one
    Order(Uuid),
    CheckoutSession(String),
}

/// Result of a payment operation across every affected order
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReport {
    pub orders: Vec<Order>,
    pub entries: Vec<TrackingLogEntry>,
    pub dispatch: DispatchReport,
}

impl PaymentReport {
    /// False when every order already reflected the request
    pub fn changed(&self) -> bool {
        self.entries.iter().any(|entry| !entry.is_no_op())
    }
}

#[derive(Debug, Clone)]
pub struct PaymentMilestoneTracker {
    machine: OrderStateMachine,
}

impl PaymentMilestoneTracker {
    pub fn new(machine: OrderStateMachine) -> Self {
        Self { machine }
    }

    /// Buyer reports a transfer; the milestone becomes pending
    pub async fn submit_payment(
        &self,
        target: PaymentTarget,
        milestone: MilestoneType,
        context: TransitionContext,
    ) -> StateMachineResult<PaymentReport> {
        self.apply(target, PaymentOperation::SubmitPayment, milestone, context)
            .await
    }

    /// Staff confirm a milestone; re-confirming is a logged no-op
    pub async fn mark_paid(
        &self,
        target: PaymentTarget,
        milestone: MilestoneType,
        context: TransitionContext,
    ) -> StateMachineResult<PaymentReport> {
        self.apply(target, PaymentOperation::MarkPaid, milestone, context)
            .await
    }

    /// Staff revert a milestone
    pub async fn mark_unpaid(
        &self,
        target: PaymentTarget,
        milestone: MilestoneType,
        context: TransitionContext,
    ) -> StateMachineResult<PaymentReport> {
        self.apply(target, PaymentOperation::MarkUnpaid, milestone, context)
            .await
    }

    pub async fn milestones(&self, order_id: Uuid) -> StateMachineResult<Vec<PaymentMilestone>> {
        self.machine.payment_milestones(order_id).await
    }

    /// Orders addressed by `target`, ordered by id, plus their checkout session
    async fn resolve_orders(
        &self,
        target: &PaymentTarget,
    ) -> StateMachineResult<(Option<String>, Vec<Order>)> {
        let session_id = match target {
            PaymentTarget::Order(order_id) => {
                let order = self.machine.order(*order_id).await?;
                match order.checkout_session_id.clone() {
                    Some(session_id) => session_id,
                    None => return Ok((None, vec![order])),
                }
            }
            PaymentTarget::CheckoutSession(session_id) => session_id.clone(),
        };

        let orders = self
            .machine
            .store()
            .find_by_checkout_session(&session_id)
            .await?;
        if orders.is_empty() {
            return Err(StateMachineError::NotFound {
                entity: "checkout_session",
                id: session_id,
            });
        }
        Ok((Some(session_id), orders))
    }

    async fn apply(
        &self,
        target: PaymentTarget,
        operation: PaymentOperation,
        milestone: MilestoneType,
        context: TransitionContext,
    ) -> StateMachineResult<PaymentReport> {
        let event = LifecycleEvent::Payment {
            operation,
            milestone,
        };
        let (session_id, orders) = self.resolve_orders(&target).await?;

        // Every sibling must accept the operation before any of them is written
        let mut planned: Vec<PlannedMutation> = Vec::with_capacity(orders.len());
        for order in &orders {
            planned.push(self.machine.plan_mutation(order, event, &context).await?);
        }

        let committed = match (session_id, planned.len()) {
            (Some(session_id), count) if count > 1 => {
                self.commit_siblings(session_id, planned, event, &context)
                    .await?
            }
            _ => {
                let mut committed = Vec::with_capacity(planned.len());
                for plan in planned {
                    committed.push(self.machine.commit(plan).await?);
                }
                committed
            }
        };

        let dispatch = self.machine.dispatcher().dispatch_all(&committed).await;
        info!(
            event = %event.event_type(),
            orders = committed.len(),
            enqueued = dispatch.enqueued,
            "💳 Payment operation applied"
        );

        let (orders, entries) = committed
            .into_iter()
            .map(|transition| (transition.order, transition.entry))
            .unzip();
        Ok(PaymentReport {
            orders,
            entries,
            dispatch,
        })
    }

    async fn commit_siblings(
        &self,
        session_id: String,
        planned: Vec<PlannedMutation>,
        event: LifecycleEvent,
        context: &TransitionContext,
    ) -> StateMachineResult<Vec<CommittedTransition>> {
        let actor = context.actor;
        let mutations = planned.into_iter().map(|plan| plan.mutation).collect();
        let to_transition = |change: CommittedChange| {
            OrderStateMachine::committed(change.order, change.entry, event, actor)
        };

        let (mut committed, failed) = match self.machine.store().commit_batch(mutations).await? {
            BatchCommit::Complete(changes) => {
                return Ok(changes.into_iter().map(to_transition).collect());
            }
            BatchCommit::Partial { committed, failed } => (
                committed.into_iter().map(to_transition).collect::<Vec<_>>(),
                failed,
            ),
        };

        let pending: Vec<Uuid> = failed
            .into_iter()
            .map(|(order_id, err)| {
                warn!(
                    checkout_session_id = %session_id,
                    order_id = %order_id,
                    error = %err,
                    "⚠️ Sibling commit failed, compensating"
                );
                order_id
            })
            .collect();

        let pending = self
            .compensate(pending, event, context, &mut committed)
            .await;
        if pending.is_empty() {
            return Ok(committed);
        }

        // Applied siblings are durable; their side effects still go out
        self.machine.dispatcher().dispatch_all(&committed).await;
        let applied: Vec<Uuid> = committed.iter().map(|t| t.order.id).collect();
        error!(
            checkout_session_id = %session_id,
            applied = ?applied,
            pending = ?pending,
            "❌ Multi-order payment left siblings pending"
        );
        Err(StateMachineError::PartialMultiOrderFailure {
            checkout_session_id: session_id,
            applied,
            pending,
        })
    }

    /// Retry pending siblings; returns those still pending
    async fn compensate(
        &self,
        mut pending: Vec<Uuid>,
        event: LifecycleEvent,
        context: &TransitionContext,
        committed: &mut Vec<CommittedTransition>,
    ) -> Vec<Uuid> {
        let executor = &self.machine.config().executor;
        for attempt in 1..=executor.compensation_retries {
            if pending.is_empty() {
                break;
            }
            let backoff = executor
                .compensation_backoff()
                .saturating_mul(2u32.saturating_pow(attempt - 1));
            tokio::time::sleep(backoff).await;

            let mut remaining = Vec::new();
            for order_id in pending {
                match self.retry_sibling(order_id, event, context).await {
                    Ok(transition) => committed.push(transition),
                    Err(err) => {
                        warn!(
                            order_id = %order_id,
                            attempt = attempt,
                            error = %err,
                            "🔄 Compensation attempt failed"
                        );
                        remaining.push(order_id);
                    }
                }
            }
            pending = remaining;
        }
        pending
    }

    async fn retry_sibling(
        &self,
        order_id: Uuid,
        event: LifecycleEvent,
        context: &TransitionContext,
    ) -> StateMachineResult<CommittedTransition> {
        let order = self.machine.order(order_id).await?;
        let planned = self.machine.plan_mutation(&order, event, context).await?;
        self.machine.commit(planned).await
    }
}
