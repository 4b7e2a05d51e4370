//! Order Lifecycle Worker Binary
//!
//! Runs the side-effect worker against the pgmq task queue: executes CRM,
//! notification and invoice tasks and fires scheduled transitions.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::info;

use order_lifecycle::config::ConfigManager;
use order_lifecycle::database::{DatabaseConnection, PgOrderStore};
use order_lifecycle::logging::init_structured_logging;
use order_lifecycle::messaging::{
    LoggingTaskHandler, PgmqTaskQueue, SideEffectDispatcher, TaskWorker,
};
use order_lifecycle::state_machine::{OrderStateMachine, RoleBasedPolicy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("failed to load configuration")?;
    let config = Arc::new(manager.config().clone());
    info!(environment = %manager.environment(), "Starting order lifecycle worker");

    let connection = DatabaseConnection::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    if config.database.run_migrations {
        connection.migrate().await.context("failed to run migrations")?;
    }
    let pool = connection.pool().clone();

    let queue = Arc::new(PgmqTaskQueue::new(pool.clone(), config.queue.name.clone())?);
    queue.ensure_queue().await?;

    let dispatcher = Arc::new(SideEffectDispatcher::new(queue.clone(), config.queue.clone()));
    let machine = OrderStateMachine::new(
        Arc::new(PgOrderStore::new(pool)),
        dispatcher,
        Arc::new(RoleBasedPolicy),
        config.clone(),
    );
    let worker = Arc::new(TaskWorker::new(
        queue.clone(),
        machine,
        Arc::new(LoggingTaskHandler),
        config.worker.clone(),
    ));

    let running = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    signal::ctrl_c().await?;
    info!("Shutdown signal received");
    worker.shutdown();
    running.await.context("worker task panicked")?;

    match queue.prune_archive().await {
        Ok(pruned) => info!(pruned = pruned, "Archive pruned"),
        Err(err) => tracing::warn!(error = %err, "Archive pruning failed"),
    }

    connection.close().await;
    info!("Order lifecycle worker stopped");
    Ok(())
}
