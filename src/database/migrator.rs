//! Embedded schema migrations

/// Migrations under `migrations/`, embedded at compile time
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
