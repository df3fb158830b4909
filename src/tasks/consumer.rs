use std::sync::Arc;

use tokio::sync::mpsc::Sender;

use super::processor::Processed;
use super::processor::TaskProcessor;
use super::queue::MessageQueue;
use super::queue::QueueName;
use crate::constants::REDELIVERY_BACKOFF;
use crate::monitor::MonitorMessage;

/// One competing consumer on one queue.
///
/// Takes a single message at a time; a processing error leaves the
/// message unacknowledged and hands it back for redelivery after a
/// back-off. Scale-out is achieved by running more consumers.
pub struct Consumer {
    id: &'static str,
    queue: QueueName,
    broker: Arc<dyn MessageQueue>,
    processor: TaskProcessor,
    monitor_tx: Sender<MonitorMessage>,
}

impl Consumer {
    pub fn new(
        id: &'static str,
        queue: QueueName,
        broker: Arc<dyn MessageQueue>,
        processor: TaskProcessor,
        monitor_tx: Sender<MonitorMessage>,
    ) -> Self {
        Self {
            id,
            queue,
            broker,
            processor,
            monitor_tx,
        }
    }

    pub async fn start(&mut self) {
        tracing::info!("[{}] consuming {}", self.id, self.queue);
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("[{}] got a ctrl-c message", self.id);
                    break;
                },
                message = self.broker.recv(self.queue) => {
                    let Some(message) = message else {
                        tracing::warn!("[{}] queue {} closed", self.id, self.queue);
                        break;
                    };
                    match self.processor.process(&message).await {
                        Ok(outcome) => {
                            let report = match outcome {
                                Processed::Applied { .. } => {
                                    MonitorMessage::TaskProcessed(message.kind)
                                }
                                Processed::Skipped(_) | Processed::Rescheduled => {
                                    MonitorMessage::TaskSkipped(message.kind)
                                }
                            };
                            let _ = self.monitor_tx.send(report).await;
                        }
                        Err(e) => {
                            tracing::error!(
                                "[{}] failed to process {:?} {}: {e}",
                                self.id,
                                message.kind,
                                message.entity_id
                            );
                            if let Err(e) = self.broker.requeue(self.queue, message).await {
                                tracing::error!("[{}] could not requeue: {e}", self.id);
                            }
                            tokio::time::sleep(REDELIVERY_BACKOFF).await;
                        }
                    }
                }
            }
        }
    }
}
