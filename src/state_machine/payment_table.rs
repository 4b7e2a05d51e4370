//! Payment milestone sub-state machine.
//!
//! Bulk orders pay a deposit and a balance:
//! `unpaid -> first_payment_pending -> first_payment_confirmed -> final_payment_pending -> final_payment_confirmed`.
//! Sample and seller orders pay once: `unpaid -> payment_pending -> paid`.
//!
//! Reverse moves are listed explicitly. A confirmed final payment (or a confirmed single
//! payment) cannot be marked unpaid; the correction path is a refund.

use super::events::{MilestoneType, PaymentOperation};
use super::states::{OrderKind, PaymentStatus};

/// Result of applying a payment operation to a payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The payment status moves to a new value
    Transition(PaymentStatus),
    /// The status already reflects the request; a log entry is still written
    NoOp,
}

impl PaymentOutcome {
    pub fn resulting_status(&self, current: PaymentStatus) -> PaymentStatus {
        match self {
            Self::Transition(next) => *next,
            Self::NoOp => current,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentTable;

impl PaymentTable {
    /// Outcome of `operation` on `milestone`, or `None` when the request is illegal
    pub fn resolve(
        kind: OrderKind,
        current: PaymentStatus,
        operation: PaymentOperation,
        milestone: MilestoneType,
    ) -> Option<PaymentOutcome> {
        if current == PaymentStatus::Refunded {
            return None;
        }
        if kind.has_split_payment() {
            split_payment(current, operation, milestone)
        } else {
            single_payment(current, operation, milestone)
        }
    }

    /// Operations accepted from `current`, for error reporting
    pub fn legal_operations(
        kind: OrderKind,
        current: PaymentStatus,
    ) -> Vec<(PaymentOperation, MilestoneType)> {
        let mut legal = Vec::new();
        for operation in PaymentOperation::ALL {
            for milestone in [MilestoneType::First, MilestoneType::Final] {
                if Self::resolve(kind, current, operation, milestone).is_some() {
                    legal.push((operation, milestone));
                }
            }
        }
        legal
    }

    /// Whether `milestone` counts as paid in `status`
    pub fn milestone_paid(status: PaymentStatus, milestone: MilestoneType) -> bool {
        use PaymentStatus as P;
        match milestone {
            MilestoneType::First => matches!(
                status,
                P::FirstPaymentConfirmed | P::FinalPaymentPending | P::FinalPaymentConfirmed | P::Paid
            ),
            MilestoneType::Final => matches!(status, P::FinalPaymentConfirmed),
        }
    }
}

fn split_payment(
    current: PaymentStatus,
    operation: PaymentOperation,
    milestone: MilestoneType,
) -> Option<PaymentOutcome> {
    use MilestoneType::{Final, First};
    use PaymentOperation::{MarkPaid, MarkUnpaid, SubmitPayment};
    use PaymentOutcome::{NoOp, Transition};
    use PaymentStatus as P;

    let outcome = match (current, operation, milestone) {
        (P::Unpaid, SubmitPayment, First) => Transition(P::FirstPaymentPending),
        (P::FirstPaymentPending, SubmitPayment, First) => NoOp,
        (P::FirstPaymentConfirmed, SubmitPayment, Final) => Transition(P::FinalPaymentPending),
        (P::FinalPaymentPending, SubmitPayment, Final) => NoOp,

        (P::Unpaid | P::FirstPaymentPending, MarkPaid, First) => {
            Transition(P::FirstPaymentConfirmed)
        }
        (P::FirstPaymentConfirmed | P::FinalPaymentPending | P::FinalPaymentConfirmed, MarkPaid, First) => {
            NoOp
        }
        (P::FirstPaymentConfirmed | P::FinalPaymentPending, MarkPaid, Final) => {
            Transition(P::FinalPaymentConfirmed)
        }
        (P::FinalPaymentConfirmed, MarkPaid, Final) => NoOp,

        (P::FirstPaymentPending | P::FirstPaymentConfirmed, MarkUnpaid, First) => {
            Transition(P::Unpaid)
        }
        (P::Unpaid, MarkUnpaid, First) => NoOp,
        (P::FinalPaymentPending, MarkUnpaid, Final) => Transition(P::FirstPaymentConfirmed),
        (P::Unpaid | P::FirstPaymentPending | P::FirstPaymentConfirmed, MarkUnpaid, Final) => NoOp,

        _ => return None,
    };
    Some(outcome)
}

fn single_payment(
    current: PaymentStatus,
    operation: PaymentOperation,
    milestone: MilestoneType,
) -> Option<PaymentOutcome> {
    use PaymentOperation::{MarkPaid, MarkUnpaid, SubmitPayment};
    use PaymentOutcome::{NoOp, Transition};
    use PaymentStatus as P;

    if milestone != MilestoneType::First {
        return None;
    }

    let outcome = match (current, operation) {
        (P::Unpaid, SubmitPayment) => Transition(P::PaymentPending),
        (P::PaymentPending, SubmitPayment) => NoOp,
        (P::Unpaid | P::PaymentPending, MarkPaid) => Transition(P::Paid),
        (P::Paid, MarkPaid) => NoOp,
        (P::PaymentPending, MarkUnpaid) => Transition(P::Unpaid),
        (P::Unpaid, MarkUnpaid) => NoOp,
        _ => return None,
    };
    Some(outcome)
}
