//! Message transport seam.
//!
//! The pipeline needs at-least-once delivery, competing consumers and
//! manual acknowledgement; which broker provides that is a deployment
//! concern behind the [`MessageQueue`] trait. [`MemoryBroker`] is the
//! single-process implementation used by the binary and by tests.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use super::types::TaskKind;
use super::types::TaskMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Blocks,
    Staking,
    Balances,
    BlocksMetadata,
}

impl QueueName {
    pub fn all() -> [QueueName; 4] {
        [
            Self::Blocks,
            Self::Staking,
            Self::Balances,
            Self::BlocksMetadata,
        ]
    }

    /// Queue a task kind is consumed from.
    pub fn for_kind(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Block => Self::Blocks,
            TaskKind::Era | TaskKind::Round => Self::Staking,
            TaskKind::BlockBalance => Self::Balances,
            TaskKind::BlockMetadata => Self::BlocksMetadata,
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Blocks => "blocks",
            Self::Staking => "staking",
            Self::Balances => "balances",
            Self::BlocksMetadata => "blocks_metadata",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue {0} is closed")]
    Closed(QueueName),
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// At-least-once publish.
    async fn publish(&self, queue: QueueName, message: TaskMessage) -> Result<(), QueueError>;

    /// Next message for a competing consumer. Each consumer takes one
    /// message at a time (prefetch 1); acknowledgement is implicit in
    /// not calling [`MessageQueue::requeue`]. Returns None once the
    /// queue is closed and drained.
    async fn recv(&self, queue: QueueName) -> Option<TaskMessage>;

    /// Hand an unacknowledged message back for redelivery.
    async fn requeue(&self, queue: QueueName, message: TaskMessage) -> Result<(), QueueError>;
}

struct MemQueue {
    tx: mpsc::UnboundedSender<TaskMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<TaskMessage>>,
}

/// In-process broker backed by one channel per queue. Consumers contend
/// on the receiver lock, which serializes hand-out without coupling
/// them otherwise.
pub struct MemoryBroker {
    queues: HashMap<QueueName, MemQueue>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        let mut queues = HashMap::new();
        for name in QueueName::all() {
            let (tx, rx) = mpsc::unbounded_channel();
            queues.insert(
                name,
                MemQueue {
                    tx,
                    rx: Mutex::new(rx),
                },
            );
        }
        Self { queues }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for MemoryBroker {
    async fn publish(&self, queue: QueueName, message: TaskMessage) -> Result<(), QueueError> {
        tracing::trace!("publishing {:?} {} to {queue}", message.kind, message.entity_id);
        self.queues[&queue]
            .tx
            .send(message)
            .map_err(|_| QueueError::Closed(queue))
    }

    async fn recv(&self, queue: QueueName) -> Option<TaskMessage> {
        self.queues[&queue].rx.lock().await.recv().await
    }

    async fn requeue(&self, queue: QueueName, message: TaskMessage) -> Result<(), QueueError> {
        tracing::debug!(
            "requeueing {:?} {} on {queue}",
            message.kind,
            message.entity_id
        );
        self.publish(queue, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn message(entity_id: i64) -> TaskMessage {
        TaskMessage {
            kind: TaskKind::Block,
            entity_id,
            dedup_token: "token".into(),
            payload: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn publish_then_recv() {
        let broker = MemoryBroker::new();
        broker
            .publish(QueueName::Blocks, message(1))
            .await
            .unwrap();
        let got = broker.recv(QueueName::Blocks).await.unwrap();
        assert_eq!(got.entity_id, 1);
    }

    #[tokio::test]
    async fn requeued_message_is_redelivered() {
        let broker = MemoryBroker::new();
        broker
            .publish(QueueName::Staking, message(7))
            .await
            .unwrap();
        let first = broker.recv(QueueName::Staking).await.unwrap();
        broker.requeue(QueueName::Staking, first).await.unwrap();
        let second = broker.recv(QueueName::Staking).await.unwrap();
        assert_eq!(second.entity_id, 7);
    }

    #[test]
    fn kinds_map_to_queues() {
        assert_eq!(QueueName::for_kind(TaskKind::Era), QueueName::Staking);
        assert_eq!(QueueName::for_kind(TaskKind::Round), QueueName::Staking);
        assert_eq!(QueueName::for_kind(TaskKind::Block), QueueName::Blocks);
    }
}
