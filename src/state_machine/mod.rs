// Order lifecycle state machine
//
// Tracking statuses and payment statuses move only through the static tables in
// `transition_table` and `payment_table`; the executor and the payment tracker
// are the only writers.

pub mod states;
pub mod events;
pub mod transition_table;
pub mod payment_table;
pub mod context;
pub mod guards;
pub mod actions;
pub mod persistence;
pub mod order_state_machine;
pub mod payment_state_machine;
pub mod errors;

// Re-export main types for convenient access
pub use states::{OrderKind, PaymentStatus, TrackingStatus};
pub use events::{LifecycleEvent, MilestoneType, PaymentOperation, TrackingAction};
pub use transition_table::TransitionTable;
pub use payment_table::{PaymentOutcome, PaymentTable};
pub use context::{Actor, ActorRole, TransitionContext};
pub use order_state_machine::{
    OrderStateMachine, ScheduledFire, ScheduledTransitionHandle, TransitionOutcome,
    TransitionRequest,
};
pub use payment_state_machine::{PaymentMilestoneTracker, PaymentReport, PaymentTarget};
pub use errors::{ActionError, GuardError, PersistenceError, StateMachineError, StateMachineResult};

// Common traits and utilities
pub use guards::{ActionPolicy, RoleBasedPolicy, StateGuard};
pub use actions::{CommittedTransition, StateAction};
pub use persistence::OrderStore;
