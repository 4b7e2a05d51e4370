//! # Structured Logging Module
//!
//! Environment-aware structured logging. Development and test get a
//! human-readable console layer; production emits JSON lines.

use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

use crate::config::ConfigManager;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber, and
/// an already-installed global subscriber is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let filter = EnvFilter::try_from_env("ORDER_LIFECYCLE_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(default_log_level(&environment)));

        let json_output = environment == "production";
        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(!json_output);

        let result = if json_output {
            tracing_subscriber::registry()
                .with(console.json().with_filter(filter))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(console.with_filter(filter))
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            json = json_output,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get log level based on environment
fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

/// Log a committed order transition
pub fn log_order_transition(
    order_id: Uuid,
    reference_id: &str,
    action: &str,
    from_status: &str,
    to_status: &str,
    actor_user_id: Uuid,
) {
    tracing::info!(
        order_id = %order_id,
        reference_id = %reference_id,
        action = %action,
        from_status = %from_status,
        to_status = %to_status,
        actor_user_id = %actor_user_id,
        "📦 ORDER_TRANSITION"
    );
}

/// Log a side-effect task event (enqueue, execution, retry, archive)
pub fn log_task_operation(
    operation: &str,
    task_name: &str,
    message_id: Option<i64>,
    order_id: Option<Uuid>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_name = %task_name,
        message_id = message_id,
        order_id = ?order_id,
        status = %status,
        details = details,
        "📨 TASK_OPERATION"
    );
}
