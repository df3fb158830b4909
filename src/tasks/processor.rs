//! Generic transactional task engine.
//!
//! One database transaction spans lock -> dedup/status checks -> handler
//! -> mark processed. Chain reads happen outside it (read-only, safe to
//! repeat after a rollback). Derived tasks are persisted and published
//! strictly after the primary commit, in a separate short transaction,
//! to avoid holding the row lock longer than necessary.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::Transaction;

use super::queue::MessageQueue;
use super::queue::QueueError;
use super::queue::QueueName;
use super::store::rows;
use super::store::TaskStore;
use super::types::NewTask;
use super::types::ProcessingTask;
use super::types::TaskKind;
use super::types::TaskMessage;
use super::types::TaskStatus;
use crate::config::PostgresConfig;
use crate::core::NodeError;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("node: {0}")]
    Node(#[from] NodeError),
    #[error("database: {0}")]
    Database(#[from] tokio_postgres::Error),
    #[error("queue: {0}")]
    Queue(#[from] QueueError),
    #[error("no handler registered for {0:?} tasks")]
    NoHandler(TaskKind),
    #[error("invalid task payload: {0}")]
    Payload(String),
    #[error("reward computation: {0}")]
    Compute(String),
}

/// What a handler produced for a successfully locked task.
#[derive(Debug)]
pub enum Outcome {
    /// Side effects written through the transaction; listed tasks are
    /// created and published after the commit.
    Done(Vec<NewTask>),
    /// A prerequisite is not indexed yet. The transaction is rolled
    /// back and a successor row is created but deliberately not
    /// published - an external supervisory sweep retries it.
    Reprocess(String),
}

/// How a message ended. Skips are acknowledged no-ops, not errors.
#[derive(Debug, PartialEq, Eq)]
pub enum Processed {
    Applied { derived: usize },
    Skipped(SkipReason),
    Rescheduled,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// No row exists for the task - removed or never created here.
    NoRow,
    /// The message's dedup token belongs to an older row generation.
    Superseded,
    /// A redelivery of an already handled task.
    AlreadyProcessed,
}

/// Kind-specific work, invoked inside the processor's open transaction.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(
        &self,
        pgtx: &Transaction<'_>,
        task: &ProcessingTask,
    ) -> Result<Outcome, ProcessError>;
}

pub struct TaskProcessor {
    store: TaskStore,
    handlers: HashMap<TaskKind, Box<dyn TaskHandler>>,
    broker: Arc<dyn MessageQueue>,
}

impl TaskProcessor {
    pub async fn new(pgconf: &PostgresConfig, broker: Arc<dyn MessageQueue>) -> Self {
        Self {
            store: TaskStore::new(pgconf).await,
            handlers: HashMap::new(),
            broker,
        }
    }

    pub fn with_handler(mut self, kind: TaskKind, handler: Box<dyn TaskHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Apply one queue message.
    ///
    /// Errors roll the transaction back and propagate; the caller
    /// leaves the message unacknowledged so the broker redelivers it.
    pub async fn process(&mut self, message: &TaskMessage) -> Result<Processed, ProcessError> {
        // Best-effort, outside the main transaction.
        self.store
            .record_attempt(message.kind, message.entity_id)
            .await;

        let handler = self
            .handlers
            .get(&message.kind)
            .ok_or(ProcessError::NoHandler(message.kind))?;

        let pgtx = self.store.transaction().await?;
        let Some(task) = rows::lock_latest(&pgtx, message.kind, message.entity_id).await? else {
            tracing::info!(
                "no row for {:?} {}, dropping message",
                message.kind,
                message.entity_id
            );
            return Ok(Processed::Skipped(SkipReason::NoRow));
        };
        if task.dedup_token != message.dedup_token {
            tracing::info!(
                "stale message for {:?} {}, a newer task row exists",
                message.kind,
                message.entity_id
            );
            return Ok(Processed::Skipped(SkipReason::Superseded));
        }
        if task.status != TaskStatus::NotProcessed {
            tracing::info!(
                "{:?} {} already processed, dropping redelivery",
                message.kind,
                message.entity_id
            );
            return Ok(Processed::Skipped(SkipReason::AlreadyProcessed));
        }

        match handler.run(&pgtx, &task).await? {
            Outcome::Done(derived) => {
                rows::mark_processed(&pgtx, task.row_id).await?;
                pgtx.commit().await?;
                let n = derived.len();
                self.cascade(derived).await?;
                Ok(Processed::Applied { derived: n })
            }
            Outcome::Reprocess(reason) => {
                pgtx.rollback().await?;
                tracing::warn!(
                    "{:?} {} needs reprocessing: {reason}",
                    task.kind,
                    task.entity_id
                );
                self.reschedule(&task).await?;
                Ok(Processed::Rescheduled)
            }
        }
    }

    /// Persist derived tasks in one short transaction, then publish.
    async fn cascade(&mut self, derived: Vec<NewTask>) -> Result<(), ProcessError> {
        if derived.is_empty() {
            return Ok(());
        }
        let messages = self.store.create_batch(&derived).await?;
        for message in messages {
            let queue = QueueName::for_kind(message.kind);
            self.broker.publish(queue, message).await?;
        }
        Ok(())
    }

    /// Create a successor row with a fresh dedup token, without
    /// publishing it - immediate re-enqueueing would loop forever on a
    /// prerequisite that stays missing.
    async fn reschedule(&mut self, task: &ProcessingTask) -> Result<(), ProcessError> {
        let successor = NewTask {
            kind: task.kind,
            entity_id: task.entity_id,
            payload: task.payload.clone(),
        };
        self.store.create(&successor).await?;
        Ok(())
    }
}
