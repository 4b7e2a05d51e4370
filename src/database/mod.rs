//! # Database Operations
//!
//! Storage backends for orders, tracking logs, payment milestones and notes.
//!
//! - [`connection`] - pooled PostgreSQL connection built from `DatabaseConfig`
//! - [`migrator`] - embedded schema migrations
//! - [`pg_store`] - sqlx implementations of the store traits
//! - [`in_memory_store`] - lock-based implementations for tests and local runs

pub mod connection;
pub mod in_memory_store;
pub mod migrator;
pub mod pg_store;

pub use connection::DatabaseConnection;
pub use in_memory_store::{InMemoryNoteStore, InMemoryOrderStore};
pub use migrator::MIGRATOR;
pub use pg_store::{PgNoteStore, PgOrderStore};
