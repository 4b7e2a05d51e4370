use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::services::NoteError;
use crate::state_machine::errors::{PersistenceError, StateMachineError};

/// Any error the crate can surface, for callers that don't care which layer failed
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Notes(#[from] NoteError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
