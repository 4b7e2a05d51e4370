use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the order lifecycle state machine
#[derive(Error, Debug)]
pub enum StateMachineError {
    #[error("Not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    #[error(
        "Invalid transition for {kind} order: {action} is not legal from {from} (legal actions: {legal_actions:?})"
    )]
    InvalidTransition {
        kind: String,
        from: String,
        action: String,
        legal_actions: Vec<String>,
    },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("Conflict: order {order_id} was modified concurrently (expected version {expected_version})")]
    Conflict { order_id: Uuid, expected_version: i64 },

    #[error(
        "Partial multi-order failure for checkout session {checkout_session_id}: {} applied, {} pending",
        .applied.len(),
        .pending.len()
    )]
    PartialMultiOrderFailure {
        checkout_session_id: String,
        applied: Vec<Uuid>,
        pending: Vec<Uuid>,
    },

    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },

    #[error("Persistence operation failed: {reason}")]
    PersistenceFailed { reason: String },

    #[error("Task queue error: {0}")]
    Messaging(#[from] crate::messaging::MessagingError),
}

impl StateMachineError {
    /// Whether the caller may retry the same request and expect a different outcome
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::PartialMultiOrderFailure { .. }
        )
    }
}

/// Guard and policy failures
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Business rule violation: {rule}")]
    BusinessRuleViolation { rule: String },

    #[error("Actor {user_id} could not be resolved")]
    UnknownActor { user_id: Uuid },

    #[error("Actor {user_id} ({role}) may not perform {action}")]
    Forbidden {
        user_id: Uuid,
        role: String,
        action: String,
    },
}

/// Failures raised while planning side effects for a committed transition
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Failed to build payload for {task}: {reason}")]
    PayloadFailed { task: &'static str, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage failures
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Order {order_id} not found")]
    OrderNotFound { order_id: Uuid },

    #[error("Stale version for order {order_id}: expected {expected}, found {actual}")]
    StaleVersion {
        order_id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("Order reference {reference_id} already exists")]
    DuplicateReference { reference_id: String },

    #[error("Invalid stored value for {field}: {value}")]
    InvalidStoredValue { field: &'static str, value: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<GuardError> for StateMachineError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::UnknownActor { user_id } => Self::NotFound {
                entity: "actor",
                id: user_id.to_string(),
            },
            GuardError::Forbidden { .. } => Self::Unauthorized {
                reason: err.to_string(),
            },
            GuardError::BusinessRuleViolation { .. } => Self::GuardFailed {
                reason: err.to_string(),
            },
        }
    }
}

impl From<PersistenceError> for StateMachineError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::OrderNotFound { order_id } => Self::NotFound {
                entity: "order",
                id: order_id.to_string(),
            },
            PersistenceError::StaleVersion {
                order_id, expected, ..
            } => Self::Conflict {
                order_id,
                expected_version: expected,
            },
            other => Self::PersistenceFailed {
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type GuardResult<T> = Result<T, GuardError>;
pub type ActionResult<T> = Result<T, ActionError>;
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Helper function to create business rule violations
pub fn business_rule_violation(rule: impl Into<String>) -> GuardError {
    GuardError::BusinessRuleViolation { rule: rule.into() }
}

/// Helper function to create a not-found error for an order
pub fn order_not_found(order_id: Uuid) -> StateMachineError {
    StateMachineError::NotFound {
        entity: "order",
        id: order_id.to_string(),
    }
}
