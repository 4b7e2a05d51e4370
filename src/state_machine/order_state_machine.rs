use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::actions::CommittedTransition;
use super::context::{Actor, TransitionContext};
use super::errors::{order_not_found, StateMachineError, StateMachineResult};
use super::events::{LifecycleEvent, TrackingAction};
use super::guards::{
    ActionPolicy, FinalPaymentBeforeDeliveryGuard, ReasonRequiredGuard, StateGuard,
};
use super::payment_table::{PaymentOutcome, PaymentTable};
use super::persistence::{MilestoneUpdate, OrderMutation, OrderStore};
use super::states::PaymentStatus;
use super::transition_table::TransitionTable;
use crate::config::LifecycleConfig;
use crate::logging::log_order_transition;
use crate::messaging::dispatcher::{DispatchReport, SideEffectDispatcher};
use crate::messaging::queue::EnqueueOptions;
use crate::messaging::tasks::QueuedTask;
use crate::models::{
    Attachment, NewOrder, NewTrackingLogEntry, Order, Page, Pagination, PaymentMilestone,
    TrackingLogEntry,
};

/// A tracking action requested against one order
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub order_id: Uuid,
    pub action: TrackingAction,
    pub context: TransitionContext,
}

impl TransitionRequest {
    pub fn new(order_id: Uuid, action: TrackingAction, actor: Actor) -> Self {
        Self {
            order_id,
            action,
            context: TransitionContext::new(actor),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.context = self.context.with_note(note);
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.context = self.context.with_attachments(attachments);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.context = self.context.with_correlation_id(correlation_id);
        self
    }
}

/// Result of a committed transition
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub order: Order,
    pub entry: TrackingLogEntry,
    pub dispatch: DispatchReport,
}

/// Handle for a deferred transition sitting in the task queue
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTransitionHandle {
    pub message_id: i64,
    pub order_id: Uuid,
    pub action: TrackingAction,
    pub scheduled_for: DateTime<Utc>,
}

/// What happened when a deferred transition came due
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduledFire {
    Applied(TransitionOutcome),
    /// The order was rescheduled or its schedule already fired
    Superseded {
        current: Option<DateTime<Utc>>,
    },
}

/// Mutation planned against a loaded order, ready to commit
#[derive(Debug, Clone)]
pub(crate) struct PlannedMutation {
    pub mutation: OrderMutation,
    pub event: LifecycleEvent,
    pub actor: Actor,
}

/// Order lifecycle executor.
///
/// Every state change goes through [`OrderStateMachine::apply_transition`] (or the
/// payment tracker built on top of it): load, authorize, look up the table, run
/// guards, then commit the status change and its tracking entry as one
/// compare-and-swap. Side effects are dispatched only after the commit.
#[derive(Clone)]
pub struct OrderStateMachine {
    store: Arc<dyn OrderStore>,
    dispatcher: Arc<SideEffectDispatcher>,
    policy: Arc<dyn ActionPolicy>,
    guards: Arc<Vec<Box<dyn StateGuard>>>,
    config: Arc<LifecycleConfig>,
}

impl std::fmt::Debug for OrderStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderStateMachine")
            .field("dispatcher", &self.dispatcher)
            .field(
                "guards",
                &self.guards.iter().map(|g| g.description()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl OrderStateMachine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        dispatcher: Arc<SideEffectDispatcher>,
        policy: Arc<dyn ActionPolicy>,
        config: Arc<LifecycleConfig>,
    ) -> Self {
        let mut guards: Vec<Box<dyn StateGuard>> = vec![Box::new(ReasonRequiredGuard)];
        if config.executor.require_final_payment_before_delivery {
            guards.push(Box::new(FinalPaymentBeforeDeliveryGuard));
        }
        Self {
            store,
            dispatcher,
            policy,
            guards: Arc::new(guards),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<SideEffectDispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Persist a new order in `created` / `unpaid`
    pub async fn create_order(&self, new_order: NewOrder) -> StateMachineResult<Order> {
        let order = self.store.insert_order(new_order).await?;
        info!(
            order_id = %order.id,
            reference_id = %order.reference_id,
            kind = %order.kind,
            "🆕 Order created"
        );
        Ok(order)
    }

    pub async fn order(&self, order_id: Uuid) -> StateMachineResult<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))
    }

    /// Tracking log for an order, newest first
    pub async fn tracking_log(
        &self,
        order_id: Uuid,
        pagination: Pagination,
    ) -> StateMachineResult<Page<TrackingLogEntry>> {
        // Unknown orders are an error, not an empty page
        self.order(order_id).await?;
        Ok(self.store.tracking_log(order_id, pagination).await?)
    }

    pub async fn payment_milestones(
        &self,
        order_id: Uuid,
    ) -> StateMachineResult<Vec<PaymentMilestone>> {
        self.order(order_id).await?;
        Ok(self.store.payment_milestones(order_id).await?)
    }

    /// Tracking actions currently legal for `order`
    pub fn legal_actions(order: &Order) -> Vec<TrackingAction> {
        TransitionTable::legal_actions(order.kind, order.tracking_status)
    }

    /// Validate and commit a tracking action, then dispatch its side effects
    pub async fn apply_transition(
        &self,
        request: TransitionRequest,
    ) -> StateMachineResult<TransitionOutcome> {
        let TransitionRequest {
            order_id,
            action,
            context,
        } = request;

        let order = self.order(order_id).await?;
        let planned = self
            .plan_mutation(&order, LifecycleEvent::from(action), &context)
            .await?;
        let committed = self.commit(planned).await?;
        let dispatch = self.dispatcher.dispatch(&committed).await;

        Ok(TransitionOutcome {
            order: committed.order,
            entry: committed.entry,
            dispatch,
        })
    }

    /// Enqueue `action` to run against the order at `at`.
    ///
    /// Only authorization is checked now; legality is checked when the task fires.
    pub async fn schedule_transition(
        &self,
        order_id: Uuid,
        action: TrackingAction,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> StateMachineResult<ScheduledTransitionHandle> {
        let order = self.order(order_id).await?;
        self.policy
            .authorize(&actor, &order, &LifecycleEvent::from(action))
            .await?;

        // The marker goes first so a task due immediately still finds it
        self.store.set_scheduled_transition_at(order_id, Some(at)).await?;

        let task = QueuedTask::ScheduledTransition {
            order_id,
            action,
            actor,
            scheduled_for: at,
        };
        let message_id = match self
            .dispatcher
            .enqueue(task, EnqueueOptions::scheduled(&self.config.queue, at))
            .await
        {
            Ok(message_id) => message_id,
            Err(err) => {
                if let Err(restore_err) = self
                    .store
                    .set_scheduled_transition_at(order_id, order.scheduled_transition_at)
                    .await
                {
                    warn!(
                        order_id = %order_id,
                        error = %restore_err,
                        "⚠️ Failed to restore schedule marker"
                    );
                }
                return Err(err.into());
            }
        };

        info!(
            order_id = %order_id,
            action = %action,
            scheduled_for = %at,
            message_id = message_id,
            "⏰ Transition scheduled"
        );

        Ok(ScheduledTransitionHandle {
            message_id,
            order_id,
            action,
            scheduled_for: at,
        })
    }

    /// Replace the order's persons in charge.
    ///
    /// Statuses are untouched; the change is versioned and logged like any
    /// other transition and the new assignees are notified.
    pub async fn assign_pic(
        &self,
        order_id: Uuid,
        mut assignee_ids: Vec<Uuid>,
        context: TransitionContext,
    ) -> StateMachineResult<TransitionOutcome> {
        assignee_ids.sort();
        assignee_ids.dedup();

        let order = self.order(order_id).await?;
        let mut planned = self
            .plan_mutation(&order, LifecycleEvent::AssignPic, &context)
            .await?;
        if let Some(metadata) = planned.mutation.log_entry.metadata.as_object_mut() {
            metadata.insert("previous_assignee_ids".into(), json!(order.assignee_ids));
            metadata.insert("assignee_ids".into(), json!(assignee_ids));
        }
        planned.mutation.assignee_ids = Some(assignee_ids);

        let committed = self.commit(planned).await?;
        let dispatch = self.dispatcher.dispatch(&committed).await;
        info!(
            order_id = %order_id,
            assignees = ?committed.order.assignee_ids,
            enqueued = dispatch.enqueued,
            "👥 Persons in charge assigned"
        );

        Ok(TransitionOutcome {
            order: committed.order,
            entry: committed.entry,
            dispatch,
        })
    }

    /// Run a deferred transition as the actor who scheduled it
    pub async fn fire_scheduled_transition(
        &self,
        order_id: Uuid,
        action: TrackingAction,
        actor: Actor,
        scheduled_for: DateTime<Utc>,
    ) -> StateMachineResult<ScheduledFire> {
        let order = self.order(order_id).await?;
        let tolerance = chrono::Duration::seconds(self.config.executor.schedule_drift_tolerance_seconds);

        // A cleared or moved marker means this task was already consumed or replaced
        let current = order.scheduled_transition_at;
        let still_current = current.is_some_and(|at| (at - scheduled_for).abs() <= tolerance);
        if !still_current {
            warn!(
                order_id = %order_id,
                action = %action,
                scheduled_for = %scheduled_for,
                current = ?current,
                "⏭️ Scheduled transition superseded"
            );
            return Ok(ScheduledFire::Superseded { current });
        }

        let request = TransitionRequest::new(order_id, action, actor)
            .with_note(format!("Scheduled {action} for {scheduled_for}"));
        let outcome = self.apply_transition(request).await?;

        if let Err(err) = self.store.set_scheduled_transition_at(order_id, None).await {
            warn!(order_id = %order_id, error = %err, "⚠️ Failed to clear schedule marker");
        }

        Ok(ScheduledFire::Applied(outcome))
    }

    /// Authorize, validate and build the mutation for `event` on `order`
    pub(crate) async fn plan_mutation(
        &self,
        order: &Order,
        event: LifecycleEvent,
        context: &TransitionContext,
    ) -> StateMachineResult<PlannedMutation> {
        self.policy.authorize(&context.actor, order, &event).await?;

        let (tracking_status, payment_status, milestone) = match event {
            LifecycleEvent::Tracking { action } => {
                let to = TransitionTable::is_legal(order.kind, order.tracking_status, action)
                    .ok_or_else(|| invalid_tracking_transition(order, action))?;
                let payment = if action == TrackingAction::Refund {
                    PaymentStatus::Refunded
                } else {
                    order.payment_status
                };
                (to, payment, None)
            }
            LifecycleEvent::Payment {
                operation,
                milestone,
            } => {
                let outcome =
                    PaymentTable::resolve(order.kind, order.payment_status, operation, milestone)
                        .ok_or_else(|| invalid_payment_transition(order, &event))?;
                let payment = outcome.resulting_status(order.payment_status);
                // A no-op keeps the existing approver and approval time
                let update = match outcome {
                    PaymentOutcome::NoOp => None,
                    PaymentOutcome::Transition(_) => Some(MilestoneUpdate {
                        milestone,
                        paid: PaymentTable::milestone_paid(payment, milestone),
                        approved_by_user_id: context.actor.user_id,
                        approved_at: Utc::now(),
                    }),
                };
                (order.tracking_status, payment, update)
            }
            LifecycleEvent::AssignPic => (order.tracking_status, order.payment_status, None),
        };

        for guard in self.guards.iter() {
            guard.check(order, &event, context).await.map_err(|err| {
                debug!(
                    order_id = %order.id,
                    guard = guard.description(),
                    error = %err,
                    "🚫 Guard rejected transition"
                );
                StateMachineError::from(err)
            })?;
        }

        let touches_payment = event.is_payment();
        let log_entry = NewTrackingLogEntry {
            order_id: order.id,
            action: event.event_type(),
            from_status: order.tracking_status,
            to_status: tracking_status,
            payment_from: touches_payment.then_some(order.payment_status),
            payment_to: touches_payment.then_some(payment_status),
            actor_user_id: context.actor.user_id,
            actor_role: context.actor.role.to_string(),
            note: context.reason().map(str::to_string),
            attachments: context.attachments.clone(),
            metadata: context.merge_into_metadata(json!({
                "kind": order.kind,
                "version": order.version,
            })),
        };

        Ok(PlannedMutation {
            mutation: OrderMutation {
                order_id: order.id,
                expected_version: order.version,
                tracking_status,
                payment_status,
                milestone,
                assignee_ids: None,
                log_entry,
            },
            event,
            actor: context.actor,
        })
    }

    /// Commit one planned mutation
    pub(crate) async fn commit(
        &self,
        planned: PlannedMutation,
    ) -> StateMachineResult<CommittedTransition> {
        let PlannedMutation {
            mutation,
            event,
            actor,
        } = planned;
        let change = self.store.commit(mutation).await?;
        Ok(Self::committed(change.order, change.entry, event, actor))
    }

    pub(crate) fn committed(
        order: Order,
        entry: TrackingLogEntry,
        event: LifecycleEvent,
        actor: Actor,
    ) -> CommittedTransition {
        log_order_transition(
            order.id,
            &order.reference_id,
            &entry.action,
            entry.from_status.as_str(),
            entry.to_status.as_str(),
            actor.user_id,
        );
        CommittedTransition {
            order,
            entry,
            event,
            actor,
        }
    }
}

fn invalid_tracking_transition(order: &Order, action: TrackingAction) -> StateMachineError {
    StateMachineError::InvalidTransition {
        kind: order.kind.to_string(),
        from: order.tracking_status.to_string(),
        action: action.to_string(),
        legal_actions: TransitionTable::legal_actions(order.kind, order.tracking_status)
            .into_iter()
            .map(|a| a.to_string())
            .collect(),
    }
}

fn invalid_payment_transition(order: &Order, event: &LifecycleEvent) -> StateMachineError {
    StateMachineError::InvalidTransition {
        kind: order.kind.to_string(),
        from: order.payment_status.to_string(),
        action: event.event_type(),
        legal_actions: PaymentTable::legal_operations(order.kind, order.payment_status)
            .into_iter()
            .map(|(operation, milestone)| format!("{operation}:{milestone}"))
            .collect(),
    }
}
