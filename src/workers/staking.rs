//! Era and Round task handlers, fronting the reward engine.

use async_trait::async_trait;
use tokio_postgres::Transaction;

use crate::rewards::ComputeError;
use crate::rewards::EraComputer;
use crate::rewards::RoundComputer;
use crate::store;
use crate::tasks::types::payload;
use crate::tasks::Outcome;
use crate::tasks::ProcessError;
use crate::tasks::ProcessingTask;
use crate::tasks::TaskHandler;

pub struct EraWorker {
    computer: EraComputer,
}

impl EraWorker {
    pub fn new(computer: EraComputer) -> Self {
        Self { computer }
    }
}

#[async_trait]
impl TaskHandler for EraWorker {
    async fn run(
        &self,
        pgtx: &Transaction<'_>,
        task: &ProcessingTask,
    ) -> Result<Outcome, ProcessError> {
        let payout_block = payload::payout_block(&task.payload).ok_or_else(|| {
            ProcessError::Payload(format!("era {} has no payout_block", task.entity_id))
        })?;
        match self.computer.compute(task.entity_id, payout_block).await {
            Ok(payout) => {
                store::rewards::persist_era(pgtx, &payout).await?;
                Ok(Outcome::Done(vec![]))
            }
            Err(e) => Ok(outcome_from(e)?),
        }
    }
}

pub struct RoundWorker {
    computer: RoundComputer,
}

impl RoundWorker {
    pub fn new(computer: RoundComputer) -> Self {
        Self { computer }
    }
}

#[async_trait]
impl TaskHandler for RoundWorker {
    async fn run(
        &self,
        pgtx: &Transaction<'_>,
        task: &ProcessingTask,
    ) -> Result<Outcome, ProcessError> {
        let payout_block = payload::payout_block(&task.payload).ok_or_else(|| {
            ProcessError::Payload(format!("round {} has no payout_block", task.entity_id))
        })?;
        match self.computer.compute(task.entity_id, payout_block).await {
            Ok(payout) => {
                store::rewards::persist_round(pgtx, &payout).await?;
                Ok(Outcome::Done(vec![]))
            }
            Err(e) => Ok(outcome_from(e)?),
        }
    }
}

/// Stale prerequisites reschedule; everything else propagates and rolls
/// the transaction back for broker redelivery.
fn outcome_from(error: ComputeError) -> Result<Outcome, ProcessError> {
    match error {
        ComputeError::Reprocess(reason) => Ok(Outcome::Reprocess(reason)),
        ComputeError::Node(e) => Err(e.into()),
        other => Err(ProcessError::Compute(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeError;

    #[test]
    fn reprocess_signal_is_not_an_error() {
        let outcome = outcome_from(ComputeError::Reprocess("era start missing".into())).unwrap();
        assert!(matches!(outcome, Outcome::Reprocess(_)));
    }

    #[test]
    fn node_errors_propagate_for_redelivery() {
        let got = outcome_from(ComputeError::Node(NodeError::NotFound("block".into())));
        assert!(matches!(got, Err(ProcessError::Node(_))));
    }
}
