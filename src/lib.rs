#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Order Lifecycle
//!
//! Order lifecycle core for a B2B sourcing platform: the tracking status and
//! payment milestone state machines of purchase orders, bulk purchase orders
//! and seller purchase orders.
//!
//! ## Overview
//!
//! Every state change is validated against a static per-kind transition
//! table, committed together with an append-only tracking log entry under
//! optimistic concurrency control, and only then fanned out to asynchronous
//! side effects (CRM events, notifications, deal sync, invoices) through a
//! durable task queue.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - statuses, transition tables, the executor and the payment tracker
//! - [`models`] - orders, tracking log entries, payment milestones, notes
//! - [`database`] - Postgres and in-memory stores, migrations
//! - [`messaging`] - task catalogue, queue backends, dispatcher and worker
//! - [`services`] - order notes
//! - [`config`] - layered configuration
//! - [`logging`] - structured logging setup
//! - [`error`] - crate-level error aggregation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use order_lifecycle::config::LifecycleConfig;
//! use order_lifecycle::database::InMemoryOrderStore;
//! use order_lifecycle::messaging::{InMemoryTaskQueue, SideEffectDispatcher};
//! use order_lifecycle::models::NewOrder;
//! use order_lifecycle::state_machine::{
//!     Actor, OrderKind, OrderStateMachine, RoleBasedPolicy, TrackingAction, TransitionRequest,
//! };
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(LifecycleConfig::default());
//! let queue = Arc::new(InMemoryTaskQueue::default());
//! let dispatcher = Arc::new(SideEffectDispatcher::new(queue, config.queue.clone()));
//! let machine = OrderStateMachine::new(
//!     Arc::new(InMemoryOrderStore::new()),
//!     dispatcher,
//!     Arc::new(RoleBasedPolicy),
//!     config,
//! );
//!
//! let order = machine
//!     .create_order(NewOrder::new("BPO-1", OrderKind::BulkPurchaseOrder, Uuid::new_v4()))
//!     .await?;
//! let admin = Actor::admin(Uuid::new_v4());
//! machine
//!     .apply_transition(TransitionRequest::new(order.id, TrackingAction::SendQuotation, admin))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod services;
pub mod state_machine;

pub use config::{ConfigManager, LifecycleConfig};
pub use error::{LifecycleError, Result};
pub use logging::init_structured_logging;
pub use state_machine::{
    Actor, ActorRole, MilestoneType, OrderKind, OrderStateMachine, PaymentMilestoneTracker,
    PaymentStatus, PaymentTarget, StateMachineError, TrackingAction, TrackingStatus,
    TransitionContext, TransitionRequest,
};
