//! Task lifecycle tests against a real database.
//!
//! Run `docker compose -f docker-compose-test.yml up -d` first, then
//! `cargo test -- --ignored`.

mod common;
mod db_utils;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::extended_header;
use common::finalization_event;
use common::signed_block;
use common::success_event;
use common::timestamp_set;
use db_utils::TestDB;
use subwatch::config::ChainConfig;
use subwatch::core::ChainClient;
use subwatch::core::MockNode;
use subwatch::rewards::EraComputer;
use subwatch::tasks::MemoryBroker;
use subwatch::tasks::MessageQueue;
use subwatch::tasks::NewTask;
use subwatch::tasks::Processed;
use subwatch::tasks::QueueName;
use subwatch::tasks::SkipReason;
use subwatch::tasks::TaskKind;
use subwatch::tasks::TaskProcessor;
use subwatch::tasks::TaskStore;
use subwatch::workers::BlockWorker;
use subwatch::workers::EraWorker;

/// Block 1000 carrying its timestamp inherent and an EraPaid(7) event.
fn era_paid_chain() -> Arc<dyn ChainClient> {
    Arc::new(
        MockNode::new()
            .with_hash(1000, "0xb1000")
            .with_block(
                "0xb1000",
                signed_block(1000, "0xb1000", vec![timestamp_set(1700000000000)]),
            )
            .with_header("0xb1000", extended_header("val_a"))
            .with_events(
                "0xb1000",
                vec![
                    success_event(0),
                    finalization_event("staking", "EraPaid", json!([7, "900000", "100000"])),
                ],
            ),
    )
}

async fn block_processor(test_db: &TestDB, broker: Arc<MemoryBroker>) -> TaskProcessor {
    TaskProcessor::new(&test_db.pgconf, broker)
        .await
        .with_handler(
            TaskKind::Block,
            Box::new(BlockWorker::new(era_paid_chain(), ChainConfig::relay())),
        )
}

#[tokio::test]
#[ignore = "needs a local test database"]
async fn processing_a_block_persists_records_and_cascades() {
    let test_db = TestDB::new("tasks_block_scenario").await;
    let broker = Arc::new(MemoryBroker::new());
    let mut processor = block_processor(&test_db, broker.clone()).await;

    let mut store = TaskStore::new(&test_db.pgconf).await;
    let message = store.create(&NewTask::block(1000)).await.unwrap();

    let outcome = processor.process(&message).await.unwrap();
    assert_eq!(outcome, Processed::Applied { derived: 1 });

    // Block, events and extrinsics persisted
    assert_eq!(test_db.count("blocks").await, 1);
    assert_eq!(test_db.count("events").await, 2);
    assert_eq!(test_db.count("extrinsics").await, 1);

    // One Era task derived, left NotProcessed until consumed on its
    // own queue
    let rows = test_db
        .client
        .query(
            "select entity_id, status::text, payload
            from subwatch.tasks
            where kind = 'era';",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<usize, i64>(0), 7);
    assert_eq!(rows[0].get::<usize, String>(1), "not_processed");
    let payload: serde_json::Value = rows[0].get(2);
    assert_eq!(payload["payout_block"], json!(1000));

    // And its message published to the staking queue
    let derived = broker.recv(QueueName::Staking).await.unwrap();
    assert_eq!(derived.kind, TaskKind::Era);
    assert_eq!(derived.entity_id, 7);
}

#[tokio::test]
#[ignore = "needs a local test database"]
async fn redelivering_a_processed_message_is_a_noop() {
    let test_db = TestDB::new("tasks_idempotency").await;
    let broker = Arc::new(MemoryBroker::new());
    let mut processor = block_processor(&test_db, broker.clone()).await;

    let mut store = TaskStore::new(&test_db.pgconf).await;
    let message = store.create(&NewTask::block(1000)).await.unwrap();

    let first = processor.process(&message).await.unwrap();
    assert_eq!(first, Processed::Applied { derived: 1 });
    let tasks_after_first = test_db.count("tasks").await;

    // Identical dedup token delivered again
    let second = processor.process(&message).await.unwrap();
    assert_eq!(second, Processed::Skipped(SkipReason::AlreadyProcessed));

    // No duplicate rows anywhere
    assert_eq!(test_db.count("blocks").await, 1);
    assert_eq!(test_db.count("events").await, 2);
    assert_eq!(test_db.count("extrinsics").await, 1);
    assert_eq!(test_db.count("tasks").await, tasks_after_first);
}

#[tokio::test]
#[ignore = "needs a local test database"]
async fn only_the_latest_task_generation_is_effective() {
    let test_db = TestDB::new("tasks_at_most_one").await;
    let broker = Arc::new(MemoryBroker::new());
    let mut processor = block_processor(&test_db, broker.clone()).await;

    // The task was created twice, e.g. by a forced reprocess; both
    // messages are in flight with different dedup tokens.
    let mut store = TaskStore::new(&test_db.pgconf).await;
    let stale = store.create(&NewTask::block(1000)).await.unwrap();
    let current = store.create(&NewTask::block(1000)).await.unwrap();
    assert_ne!(stale.dedup_token, current.dedup_token);

    let first = processor.process(&stale).await.unwrap();
    assert_eq!(first, Processed::Skipped(SkipReason::Superseded));
    assert_eq!(test_db.count("blocks").await, 0);

    let second = processor.process(&current).await.unwrap();
    assert_eq!(second, Processed::Applied { derived: 1 });
    assert_eq!(test_db.count("blocks").await, 1);

    // Exactly one of the two rows transitioned
    let processed: i64 = test_db
        .client
        .query_one(
            "select count(*)
            from subwatch.tasks
            where kind = 'block' and status = 'processed';",
            &[],
        )
        .await
        .unwrap()
        .get(0);
    assert_eq!(processed, 1);
}

#[tokio::test]
#[ignore = "needs a local test database"]
async fn missing_prerequisite_reschedules_without_requeueing() {
    let test_db = TestDB::new("tasks_reschedule").await;
    let broker = Arc::new(MemoryBroker::new());

    // An empty chain: the era's payout block cannot be resolved.
    let node: Arc<dyn ChainClient> = Arc::new(MockNode::new());
    let mut processor = TaskProcessor::new(&test_db.pgconf, broker.clone())
        .await
        .with_handler(
            TaskKind::Era,
            Box::new(EraWorker::new(EraComputer::new(node, 4))),
        );

    let mut store = TaskStore::new(&test_db.pgconf).await;
    let message = store.create(&NewTask::era(7, 555)).await.unwrap();

    let outcome = processor.process(&message).await.unwrap();
    assert_eq!(outcome, Processed::Rescheduled);

    // Nothing persisted, rolled back as a whole
    assert_eq!(test_db.count("eras").await, 0);
    assert_eq!(test_db.count("validator_rewards").await, 0);

    // A successor row with a fresh token, not processed yet
    let rows = test_db
        .client
        .query(
            "select dedup_token, status::text
            from subwatch.tasks
            where kind = 'era' and entity_id = 7
            order by row_id;",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_ne!(
        rows[0].get::<usize, String>(0),
        rows[1].get::<usize, String>(0)
    );
    assert_eq!(rows[1].get::<usize, String>(1), "not_processed");

    // Deliberately NOT republished - redelivery would loop forever
    let requeued = tokio::time::timeout(
        tokio::time::Duration::from_millis(50),
        broker.recv(QueueName::Staking),
    )
    .await;
    assert!(requeued.is_err());
}
