//! Block task handler: decode, persist, cascade.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::Transaction;

use crate::config::ChainConfig;
use crate::constants::sections;
use crate::core::types::ChainFamily;
use crate::core::ChainClient;
use crate::decoding::BlockData;
use crate::decoding::BlockDecoder;
use crate::store;
use crate::tasks::NewTask;
use crate::tasks::Outcome;
use crate::tasks::ProcessError;
use crate::tasks::ProcessingTask;
use crate::tasks::TaskHandler;
use crate::utils::json_i64;

pub struct BlockWorker {
    node: Arc<dyn ChainClient>,
    config: ChainConfig,
}

impl BlockWorker {
    pub fn new(node: Arc<dyn ChainClient>, config: ChainConfig) -> Self {
        Self { node, config }
    }
}

#[async_trait]
impl TaskHandler for BlockWorker {
    async fn run(
        &self,
        pgtx: &Transaction<'_>,
        task: &ProcessingTask,
    ) -> Result<Outcome, ProcessError> {
        let height = task.entity_id;
        let hash = self.node.block_hash(height).await?;
        let data = BlockDecoder::new(self.node.as_ref(), self.config.family)
            .decode(height, &hash)
            .await?;

        // A forced reprocessing rewrites the height; normally these
        // deletes are no-ops.
        store::extrinsics::delete_at(pgtx, height).await?;
        store::events::delete_at(pgtx, height).await?;
        store::blocks::delete_at(pgtx, height).await?;

        store::blocks::insert(pgtx, &data.block).await?;
        store::events::insert_many(pgtx, &data.events).await?;
        store::extrinsics::insert_many(pgtx, &data.extrinsics).await?;

        Ok(Outcome::Done(cascade(&data, &self.config)))
    }
}

/// Derived tasks triggered by a decoded block.
pub fn cascade(data: &BlockData, config: &ChainConfig) -> Vec<NewTask> {
    let height = data.block.height;
    let mut derived = vec![];
    match config.family {
        ChainFamily::Relay => {
            for event in &data.events {
                if event.section != sections::STAKING {
                    continue;
                }
                // EraPayout is the pre-9090 name of the same event.
                if event.method == "EraPaid" || event.method == "EraPayout" {
                    match event.data.get(0).and_then(json_i64) {
                        Some(era) => derived.push(NewTask::era(era, height)),
                        None => tracing::warn!("malformed {} event at {height}", event.method),
                    }
                }
            }
        }
        ChainFamily::Parachain => {
            for event in &data.events {
                if event.section != sections::PARACHAIN_STAKING || event.method != "NewRound" {
                    continue;
                }
                match event.data.get(1).and_then(json_i64) {
                    Some(round) => {
                        // The round paid out now accrued a delay ago.
                        let paid_for = round - config.reward_payment_delay;
                        derived.push(NewTask::round(paid_for, height));
                    }
                    None => tracing::warn!("malformed NewRound event at {height}"),
                }
            }
        }
    }
    if config.track_balances {
        derived.push(NewTask::block_balance(height));
    }
    if config.track_metadata {
        derived.push(NewTask::block_metadata(height));
    }
    derived
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::core::types::BlockRecord;
    use crate::core::types::EventRecord;
    use crate::tasks::types::payload;
    use crate::tasks::TaskKind;

    fn block_data(height: i64, events: Vec<(&str, &str, serde_json::Value)>) -> BlockData {
        BlockData {
            block: BlockRecord {
                height,
                hash: "0xaa".into(),
                parent_hash: "0xbb".into(),
                state_root: "0xcc".into(),
                extrinsics_root: "0xdd".into(),
                digest: json!(null),
                author: None,
                timestamp: 0,
                spec_version: 1,
                era: None,
                round: None,
            },
            events: events
                .into_iter()
                .enumerate()
                .map(|(idx, (section, method, data))| EventRecord {
                    height,
                    idx: idx as i32,
                    section: section.into(),
                    method: method.into(),
                    data,
                    raw: None,
                })
                .collect(),
            extrinsics: vec![],
        }
    }

    #[test]
    fn era_paid_event_derives_one_era_task() {
        let data = block_data(1000, vec![("staking", "EraPaid", json!([7, "100", "10"]))]);
        let derived = cascade(&data, &ChainConfig::relay());
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].kind, TaskKind::Era);
        assert_eq!(derived[0].entity_id, 7);
        assert_eq!(payload::payout_block(&derived[0].payload), Some(1000));
    }

    #[test]
    fn block_without_era_event_derives_nothing() {
        let data = block_data(
            1000,
            vec![("balances", "Transfer", json!(["a", "b", "10"]))],
        );
        assert_eq!(cascade(&data, &ChainConfig::relay()), vec![]);
    }

    #[test]
    fn new_round_subtracts_payment_delay() {
        let data = block_data(
            500,
            vec![("parachainStaking", "NewRound", json!([500, 25, 8, "9000"]))],
        );
        let derived = cascade(&data, &ChainConfig::parachain(2));
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].kind, TaskKind::Round);
        assert_eq!(derived[0].entity_id, 23);
        assert_eq!(payload::payout_block(&derived[0].payload), Some(500));
    }

    #[test]
    fn balance_tracking_is_unconditional() {
        let data = block_data(42, vec![]);
        let config = ChainConfig::parachain(2).with_balance_tracking();
        let derived = cascade(&data, &config);
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].kind, TaskKind::BlockBalance);
        assert_eq!(derived[0].entity_id, 42);
    }
}
