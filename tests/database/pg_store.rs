//! PostgreSQL store tests.
//!
//! Each test gets a fresh database from `#[sqlx::test]` with the crate's
//! migrations applied. Run with `DATABASE_URL` set and `--ignored`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use order_lifecycle::config::LifecycleConfig;
use order_lifecycle::database::{PgNoteStore, PgOrderStore};
use order_lifecycle::messaging::{
    EnqueueOptions, InMemoryTaskQueue, PgmqTaskQueue, QueuedTask, SideEffectDispatcher,
    TaskQueue,
};
use order_lifecycle::models::{NewNote, NewOrder, NewTrackingLogEntry, NoteTarget, Pagination};
use order_lifecycle::services::NoteStore;
use order_lifecycle::state_machine::persistence::OrderMutation;
use order_lifecycle::state_machine::{
    Actor, MilestoneType, OrderKind, OrderStateMachine, OrderStore, PaymentMilestoneTracker,
    PaymentStatus, PaymentTarget, PersistenceError, RoleBasedPolicy, TrackingAction,
    TrackingStatus, TransitionContext, TransitionRequest,
};

fn machine(pool: PgPool) -> OrderStateMachine {
    let config = Arc::new(LifecycleConfig::default());
    let dispatcher = Arc::new(SideEffectDispatcher::new(
        Arc::new(InMemoryTaskQueue::default()),
        config.queue.clone(),
    ));
    OrderStateMachine::new(
        Arc::new(PgOrderStore::new(pool)),
        dispatcher,
        Arc::new(RoleBasedPolicy),
        config,
    )
}

#[sqlx::test(migrator = "order_lifecycle::database::migrator::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_transition_writes_order_and_log_atomically(pool: PgPool) -> sqlx::Result<()> {
    let machine = machine(pool.clone());
    let admin = Actor::admin(Uuid::new_v4());
    let order = machine
        .create_order(NewOrder::new("BPO-PG-1", OrderKind::BulkPurchaseOrder, Uuid::new_v4()))
        .await
        .unwrap();

    let outcome = machine
        .apply_transition(
            TransitionRequest::new(order.id, TrackingAction::SendQuotation, admin)
                .with_note("quote v1"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.order.tracking_status, TrackingStatus::QuotationSent);
    assert_eq!(outcome.order.version, 1);
    assert_eq!(outcome.entry.sort_key, 1);

    let log = machine
        .tracking_log(order.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(log.total, 1);
    assert_eq!(log.items[0].note.as_deref(), Some("quote v1"));

    let stored: String = sqlx::query_scalar("SELECT tracking_status FROM orders WHERE id = $1")
        .bind(order.id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(stored, "quotation_sent");
    Ok(())
}

#[sqlx::test(migrator = "order_lifecycle::database::migrator::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_assign_pic_persists_assignees(pool: PgPool) -> sqlx::Result<()> {
    let machine = machine(pool.clone());
    let admin = Actor::admin(Uuid::new_v4());
    let order = machine
        .create_order(NewOrder::new("BPO-PG-9", OrderKind::BulkPurchaseOrder, Uuid::new_v4()))
        .await
        .unwrap();

    let pic = Uuid::new_v4();
    let outcome = machine
        .assign_pic(order.id, vec![pic], TransitionContext::new(admin))
        .await
        .unwrap();
    assert_eq!(outcome.order.assignee_ids, vec![pic]);
    assert_eq!(outcome.order.version, 1);

    // a later transition leaves the assignees alone
    let moved = machine
        .apply_transition(TransitionRequest::new(order.id, TrackingAction::SendQuotation, admin))
        .await
        .unwrap();
    assert_eq!(moved.order.assignee_ids, vec![pic]);

    let stored: Vec<Uuid> = sqlx::query_scalar("SELECT assignee_ids FROM orders WHERE id = $1")
        .bind(order.id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(stored, vec![pic]);
    Ok(())
}

#[sqlx::test(migrator = "order_lifecycle::database::migrator::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_stale_version_is_rejected_without_writing(pool: PgPool) -> sqlx::Result<()> {
    let store = PgOrderStore::new(pool.clone());
    let order = store
        .insert_order(NewOrder::new("PO-PG-2", OrderKind::PurchaseOrder, Uuid::new_v4()))
        .await
        .unwrap();

    let mutation = |expected_version| OrderMutation {
        order_id: order.id,
        expected_version,
        tracking_status: TrackingStatus::WaitingForApproval,
        payment_status: PaymentStatus::Unpaid,
        milestone: None,
        assignee_ids: None,
        log_entry: NewTrackingLogEntry {
            order_id: order.id,
            action: "update_design".to_string(),
            from_status: TrackingStatus::Created,
            to_status: TrackingStatus::WaitingForApproval,
            payment_from: None,
            payment_to: None,
            actor_user_id: Uuid::new_v4(),
            actor_role: "admin".to_string(),
            note: None,
            attachments: vec![],
            metadata: json!({}),
        },
    };

    store.commit(mutation(0)).await.unwrap();
    let err = store.commit(mutation(0)).await.unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::StaleVersion { expected: 0, actual: 1, .. }
    ));

    let entries: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM order_tracking_logs WHERE order_id = $1")
            .bind(order.id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(entries, 1);
    Ok(())
}

#[sqlx::test(migrator = "order_lifecycle::database::migrator::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_reference_is_reported(pool: PgPool) -> sqlx::Result<()> {
    let store = PgOrderStore::new(pool);
    let new_order = NewOrder::new("BPO-DUP", OrderKind::BulkPurchaseOrder, Uuid::new_v4());
    store.insert_order(new_order.clone()).await.unwrap();

    let err = store.insert_order(new_order).await.unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::DuplicateReference { ref reference_id } if reference_id == "BPO-DUP"
    ));
    Ok(())
}

#[sqlx::test(migrator = "order_lifecycle::database::migrator::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_checkout_session_batch_commits_all_siblings(pool: PgPool) -> sqlx::Result<()> {
    let machine = machine(pool.clone());
    let buyer = Uuid::new_v4();
    for n in 0..3 {
        machine
            .create_order(
                NewOrder::new(format!("BPO-CS-{n}"), OrderKind::BulkPurchaseOrder, buyer)
                    .with_checkout_session("cs_pg"),
            )
            .await
            .unwrap();
    }

    let report = PaymentMilestoneTracker::new(machine)
        .mark_paid(
            PaymentTarget::CheckoutSession("cs_pg".to_string()),
            MilestoneType::First,
            TransitionContext::new(Actor::admin(Uuid::new_v4())),
        )
        .await
        .unwrap();
    assert_eq!(report.orders.len(), 3);

    let paid: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payment_milestones WHERE checkout_session_id = 'cs_pg' AND paid",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(paid, 3);
    Ok(())
}

#[sqlx::test(migrator = "order_lifecycle::database::migrator::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_note_seen_markers_never_move_backwards(pool: PgPool) -> sqlx::Result<()> {
    let notes = PgNoteStore::new(pool);
    let target = NoteTarget::new("bulk_purchase_order", Uuid::new_v4());
    let reader = Uuid::new_v4();

    notes
        .insert_note(NewNote {
            target: target.clone(),
            author_user_id: Uuid::new_v4(),
            body: "trims sourced".to_string(),
            mentioned_user_ids: vec![reader],
            attachments: vec![],
        })
        .await
        .unwrap();
    assert_eq!(notes.unread_count(reader, &target).await.unwrap(), 1);

    let now = Utc::now();
    notes.mark_seen(reader, &target, now).await.unwrap();
    notes
        .mark_seen(reader, &target, now - chrono::Duration::days(1))
        .await
        .unwrap();
    assert_eq!(notes.unread_count(reader, &target).await.unwrap(), 0);
    Ok(())
}

#[sqlx::test(migrator = "order_lifecycle::database::migrator::MIGRATOR")]
#[ignore = "requires DATABASE_URL with the pgmq extension"]
async fn test_pgmq_queue_delivers_and_acks(pool: PgPool) -> sqlx::Result<()> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS pgmq")
        .execute(&pool)
        .await?;
    let queue = PgmqTaskQueue::new(pool, "lifecycle_test").unwrap();
    queue.ensure_queue().await.unwrap();

    let task = QueuedTask::SyncCrmDeal {
        order_id: Uuid::new_v4(),
        kind: OrderKind::PurchaseOrder,
    };
    let message_id = queue
        .enqueue(task.clone(), EnqueueOptions::default())
        .await
        .unwrap();

    let received = queue
        .receive_due(10, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].message_id, message_id);
    assert_eq!(received[0].attempt, 1);
    assert_eq!(received[0].envelope.task, task);

    queue.ack(message_id).await.unwrap();
    assert_eq!(queue.queue_depth().await.unwrap(), 0);
    Ok(())
}
