//! BlockMetadata task handler: runtime and session context per block.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::Transaction;

use crate::constants::sections;
use crate::core::types::ChainFamily;
use crate::core::ChainClient;
use crate::store;
use crate::store::metadata::MetadataRecord;
use crate::tasks::Outcome;
use crate::tasks::ProcessError;
use crate::tasks::ProcessingTask;
use crate::tasks::TaskHandler;

pub struct MetadataWorker {
    node: Arc<dyn ChainClient>,
    family: ChainFamily,
}

impl MetadataWorker {
    pub fn new(node: Arc<dyn ChainClient>, family: ChainFamily) -> Self {
        Self { node, family }
    }
}

#[async_trait]
impl TaskHandler for MetadataWorker {
    async fn run(
        &self,
        pgtx: &Transaction<'_>,
        task: &ProcessingTask,
    ) -> Result<Outcome, ProcessError> {
        let height = task.entity_id;
        let hash = self.node.block_hash(height).await?;
        let spec_version = self.node.runtime_version(&hash).await?;

        let metadata = match self.family {
            ChainFamily::Relay => {
                let active_era = self
                    .node
                    .state(&hash, sections::STAKING, "activeEra", &[])
                    .await?;
                let session = self
                    .node
                    .state(&hash, "session", "currentIndex", &[])
                    .await?;
                serde_json::json!({
                    "active_era": active_era,
                    "session": session,
                })
            }
            ChainFamily::Parachain => {
                let round = self
                    .node
                    .state(&hash, sections::PARACHAIN_STAKING, "round", &[])
                    .await?;
                serde_json::json!({ "round": round })
            }
        };

        store::metadata::upsert(
            pgtx,
            &MetadataRecord {
                height,
                spec_version,
                metadata,
            },
        )
        .await?;
        Ok(Outcome::Done(vec![]))
    }
}
