//! Sequential Block-task dispatch over height ranges.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc::Sender;

use super::queue::MessageQueue;
use super::queue::QueueName;
use super::store::TaskStore;
use super::types::NewTask;
use super::types::TaskKind;
use crate::constants::DISPATCH_CHUNK_SIZE;
use crate::constants::FINALIZED_POLL_INTERVAL;
use crate::constants::PAUSE_POLL_INTERVAL;
use crate::core::types::Height;
use crate::core::ChainClient;
use crate::monitor::MonitorMessage;
use crate::tasks::processor::ProcessError;

pub struct Dispatcher {
    store: TaskStore,
    broker: Arc<dyn MessageQueue>,
    node: Arc<dyn ChainClient>,
    pause: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    monitor_tx: Sender<MonitorMessage>,
}

impl Dispatcher {
    pub fn new(
        store: TaskStore,
        broker: Arc<dyn MessageQueue>,
        node: Arc<dyn ChainClient>,
        monitor_tx: Sender<MonitorMessage>,
    ) -> Self {
        Self {
            store,
            broker,
            node,
            pause: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            monitor_tx,
        }
    }

    /// Cooperative pause flag, checked between chunks. Shared with the
    /// monitor's pause/resume endpoints.
    pub fn pause_flag(&self) -> Arc<AtomicBool> {
        self.pause.clone()
    }

    /// Once set, no new chunks are started; the in-flight chunk runs to
    /// completion. The caller bounds how long it waits for that.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Create and publish Block tasks for an inclusive height range.
    ///
    /// Large ranges are chunked to bound transaction size; each chunk's
    /// messages are published only after its rows committed.
    pub async fn index_range(&mut self, from: Height, to: Height) -> Result<(), ProcessError> {
        tracing::info!("dispatching blocks {from}..={to}");
        for (lo, hi) in chunk_ranges(from, to, DISPATCH_CHUNK_SIZE) {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::info!("shutdown requested, stopping dispatch at {lo}");
                break;
            }
            self.wait_if_paused().await;
            self.dispatch_chunk(lo, hi).await?;
        }
        Ok(())
    }

    /// Follow the finalized head, dispatching every height exactly once.
    ///
    /// The poll may skip intermediate heights; the gap since the last
    /// dispatched height is always filled. Resumes from the task store
    /// cursor after a restart.
    pub async fn follow_finalized(&mut self, start: Height) -> Result<(), ProcessError> {
        let cursor = self.store.find_last_entity_id(TaskKind::Block).await?;
        let mut next = cursor.map(|h| h + 1).unwrap_or(start).max(start);
        tracing::info!("following finalized heads from {next}");
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::info!("shutdown requested, stopping finalized-head follow");
                return Ok(());
            }
            self.wait_if_paused().await;
            let tip = match self.node.finalized_height().await {
                Ok(height) => height,
                Err(e) => {
                    tracing::warn!("finalized head poll failed: {e}");
                    tokio::time::sleep(FINALIZED_POLL_INTERVAL).await;
                    continue;
                }
            };
            if tip >= next {
                self.index_range(next, tip).await?;
                next = tip + 1;
            } else {
                tokio::time::sleep(FINALIZED_POLL_INTERVAL).await;
            }
        }
    }

    async fn dispatch_chunk(&mut self, from: Height, to: Height) -> Result<(), ProcessError> {
        tracing::debug!("dispatching chunk {from}..={to}");
        let tasks: Vec<NewTask> = (from..=to).map(NewTask::block).collect();
        let messages = self.store.create_batch(&tasks).await?;
        for message in messages {
            self.broker.publish(QueueName::Blocks, message).await?;
        }
        let _ = self.monitor_tx.send(MonitorMessage::Dispatched(to)).await;
        Ok(())
    }

    /// Busy-wait via sleep while paused. Shutdown breaks the wait.
    async fn wait_if_paused(&self) {
        while self.pause.load(Ordering::Relaxed) && !self.shutdown.load(Ordering::Relaxed) {
            tracing::debug!("dispatch paused");
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
        }
    }
}

/// Inclusive sub-ranges of at most `size` heights.
fn chunk_ranges(from: Height, to: Height, size: i64) -> Vec<(Height, Height)> {
    assert!(size > 0);
    let mut chunks = vec![];
    let mut lo = from;
    while lo <= to {
        let hi = (lo + size - 1).min(to);
        chunks.push((lo, hi));
        lo = hi + 1;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn chunks_cover_range_without_overlap() {
        assert_eq!(
            chunk_ranges(0, 2499, 1000),
            vec![(0, 999), (1000, 1999), (2000, 2499)]
        );
    }

    #[test]
    fn single_block_range_is_one_chunk() {
        assert_eq!(chunk_ranges(42, 42, 1000), vec![(42, 42)]);
    }

    #[test]
    fn empty_range_yields_no_chunks() {
        assert_eq!(chunk_ranges(10, 9, 1000), vec![]);
    }
}
