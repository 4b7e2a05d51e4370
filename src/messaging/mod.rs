//! # Messaging Module
//!
//! Asynchronous side effects of committed transitions: the closed task
//! catalogue, the queue abstraction with in-memory and pgmq backends, the
//! dispatcher that enqueues planned tasks and the worker that executes them.

pub mod dispatcher;
pub mod errors;
pub mod in_memory;
pub mod pgmq;
pub mod queue;
pub mod tasks;
pub mod worker;

pub use dispatcher::{DispatchReport, SideEffectDispatcher};
pub use errors::MessagingError;
pub use in_memory::InMemoryTaskQueue;
pub use pgmq::PgmqTaskQueue;
pub use queue::{EnqueueOptions, ReceivedTask, TaskEnvelope, TaskQueue};
pub use tasks::{CrmEvent, NotificationType, QueuedTask};
pub use worker::{
    LoggingTaskHandler, TaskDisposition, TaskHandler, TaskWorker, WorkerBatchReport,
};
