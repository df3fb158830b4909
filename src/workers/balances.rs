//! BlockBalance task handler.
//!
//! For every account touched by a balance event in the block, records
//! its free/reserved balance and nonce as of that block.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::Transaction;

use crate::constants::sections;
use crate::core::node::models::ChainEvent;
use crate::core::types::AccountId;
use crate::core::ChainClient;
use crate::core::NodeError;
use crate::rewards::try_map;
use crate::store;
use crate::store::balances::BalanceRecord;
use crate::tasks::Outcome;
use crate::tasks::ProcessError;
use crate::tasks::ProcessingTask;
use crate::tasks::TaskHandler;
use crate::utils::json_i64;
use crate::utils::json_u128;

pub struct BalanceWorker {
    node: Arc<dyn ChainClient>,
    concurrency: usize,
}

impl BalanceWorker {
    pub fn new(node: Arc<dyn ChainClient>, concurrency: usize) -> Self {
        Self { node, concurrency }
    }
}

#[async_trait]
impl TaskHandler for BalanceWorker {
    async fn run(
        &self,
        pgtx: &Transaction<'_>,
        task: &ProcessingTask,
    ) -> Result<Outcome, ProcessError> {
        let height = task.entity_id;
        let hash = self.node.block_hash(height).await?;
        let events = self.node.events(&hash).await?;
        let accounts = touched_accounts(&events);
        if accounts.is_empty() {
            return Ok(Outcome::Done(vec![]));
        }

        let node = Arc::clone(&self.node);
        let at = hash.clone();
        let states = try_map(accounts.clone(), self.concurrency, move |account| {
            let node = Arc::clone(&node);
            let at = at.clone();
            async move {
                node.state(&at, sections::SYSTEM, "account", &[&account])
                    .await
            }
        })
        .await
        .map_err(ProcessError::Node)?;

        let records: Vec<BalanceRecord> = accounts
            .into_iter()
            .zip(states)
            .map(|(account, state)| {
                let data = state.get("data").cloned().unwrap_or(serde_json::Value::Null);
                BalanceRecord {
                    height,
                    account,
                    free: data.get("free").and_then(json_u128).unwrap_or(0),
                    reserved: data.get("reserved").and_then(json_u128).unwrap_or(0),
                    nonce: state.get("nonce").and_then(json_i64).unwrap_or(0),
                }
            })
            .collect();

        store::balances::delete_at(pgtx, height).await?;
        store::balances::insert_many(pgtx, &records).await?;
        Ok(Outcome::Done(vec![]))
    }
}

/// Accounts referenced by the block's balance events, first-seen order.
fn touched_accounts(events: &[ChainEvent]) -> Vec<AccountId> {
    let mut seen = HashSet::new();
    let mut accounts = vec![];
    for event in events {
        if event.section != sections::BALANCES {
            continue;
        }
        // Account argument positions of the events we track.
        let positions: &[usize] = match event.method.as_str() {
            "Transfer" | "ReserveRepatriated" => &[0, 1],
            "Endowed" | "Deposit" | "Withdraw" | "Reserved" | "Unreserved" | "BalanceSet"
            | "DustLost" | "Slashed" => &[0],
            _ => continue,
        };
        for &pos in positions {
            if let Some(account) = event.data.get(pos).and_then(serde_json::Value::as_str) {
                if seen.insert(account.to_owned()) {
                    accounts.push(account.to_owned());
                }
            }
        }
    }
    accounts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn event(method: &str, data: serde_json::Value) -> ChainEvent {
        serde_json::from_value(json!({
            "phase": {"applyExtrinsic": 0},
            "section": "balances",
            "method": method,
            "data": data,
        }))
        .unwrap()
    }

    #[test]
    fn transfer_touches_both_sides_once() {
        let events = vec![
            event("Transfer", json!(["alice", "bob", "10"])),
            event("Deposit", json!(["alice", "1"])),
        ];
        assert_eq!(touched_accounts(&events), vec!["alice", "bob"]);
    }

    #[test]
    fn non_balance_events_are_ignored() {
        let other: ChainEvent = serde_json::from_value(json!({
            "phase": "initialization",
            "section": "staking",
            "method": "EraPaid",
            "data": [7, "100", "10"],
        }))
        .unwrap();
        assert_eq!(touched_accounts(&[other]), Vec::<String>::new());
    }
}
