//! # Data Models
//!
//! Plain data carried through the lifecycle core plus the raw row types the
//! Postgres stores decode into. Row types keep statuses as text and convert
//! with `TryFrom`, so an unknown value in the database surfaces as a
//! `PersistenceError` rather than a panic.

pub mod note;
pub mod order;
pub mod pagination;
pub mod payment_milestone;
pub mod tracking_log;

pub use note::{NewNote, Note, NoteTarget};
pub use order::{Attachment, NewOrder, Order};
pub use pagination::{Page, Pagination};
pub use payment_milestone::PaymentMilestone;
pub use tracking_log::{NewTrackingLogEntry, TrackingLogEntry};
