//! Round reward reconstruction for collator staking with a payment
//! delay.
//!
//! Rewards accrued in round N are disbursed over the blocks at the
//! start of round N + delay. Reconstruction walks back to N's first
//! block, snapshots stake exposure one block earlier, then scans the
//! payout window for reward-marker events and attributes each to a
//! collator or one of its delegators.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use super::fanout;
use super::strategy;
use super::strategy::Attribution;
use super::types::parse;
use super::types::CollatorPayout;
use super::types::ComputeError;
use super::types::DelegatorPayout;
use super::types::RoundPayout;
use crate::constants::sections;
use crate::core::types::AccountId;
use crate::core::types::Balance;
use crate::core::types::BlockHash;
use crate::core::types::Height;
use crate::core::types::RoundId;
use crate::core::ChainClient;
use crate::core::NodeError;
use crate::utils::json_i64;
use crate::utils::json_u128;

pub struct RoundComputer {
    node: Arc<dyn ChainClient>,
    concurrency: usize,
    payment_delay: i64,
}

#[derive(Debug, Clone, Copy)]
struct RoundInfo {
    current: RoundId,
    first: Height,
    length: i64,
}

/// Snapshot of one collator's exposure for the original round.
struct CollatorState {
    account: AccountId,
    bond: Balance,
    total: Balance,
    delegations: Vec<(AccountId, Balance)>,
    points: i64,
}

impl RoundComputer {
    pub fn new(node: Arc<dyn ChainClient>, concurrency: usize, payment_delay: i64) -> Self {
        Self {
            node,
            concurrency,
            payment_delay,
        }
    }

    pub async fn compute(
        &self,
        round: RoundId,
        payout_block: Height,
    ) -> Result<RoundPayout, ComputeError> {
        tracing::info!("computing rewards for round {round} paid at block {payout_block}");
        let payout_hash = self.hash_or_reprocess(payout_block).await?;
        let paid = self.round_info(&payout_hash).await?;
        let original = paid.current - self.payment_delay;
        if original != round {
            tracing::warn!(
                "task round {round} does not match chain round {original} at block {payout_block}"
            );
        }

        let start_block = self.find_round_start(&paid, original).await?;
        let snapshot_block = start_block - 1;
        let snapshot_hash = self.hash_or_reprocess(snapshot_block).await?;

        let mut collators = self
            .snapshot_collators(&snapshot_hash, original)
            .await?;
        let delegator_bonds = self.delegator_bonds(&snapshot_hash, &collators).await?;

        let total_stake = parse::balance(
            &self
                .node
                .state(
                    &payout_hash,
                    sections::PARACHAIN_STAKING,
                    "staked",
                    &[&original.to_string()],
                )
                .await?,
            "staked",
        )?;
        let total_points = parse::int(
            &self
                .node
                .state(
                    &payout_hash,
                    sections::PARACHAIN_STAKING,
                    "points",
                    &[&original.to_string()],
                )
                .await?,
            "points",
        )?;

        let payout_time = json_i64(
            &self
                .node
                .state(&payout_hash, sections::TIMESTAMP, "now", &[])
                .await?,
        )
        .unwrap_or(0);

        let spec_version = self.node.runtime_version(&payout_hash).await?;
        let strategy = strategy::round_strategy(spec_version);
        let rewards = self
            .scan_payouts(&paid, &collators, strategy)
            .await?;

        // Single-writer merge of scan results into the snapshot.
        let mut total_reward: Balance = 0;
        let payouts = collators
            .drain(..)
            .map(|state| {
                let reward = rewards.collators.get(&state.account).copied().unwrap_or(0);
                total_reward += reward;
                let delegators = state
                    .delegations
                    .iter()
                    .map(|(account, amount)| {
                        let reward = rewards
                            .delegators
                            .get(&(state.account.clone(), account.clone()))
                            .copied()
                            .unwrap_or(0);
                        total_reward += reward;
                        DelegatorPayout {
                            account: account.clone(),
                            amount: *amount,
                            total_bond: delegator_bonds.get(account).copied().unwrap_or(*amount),
                            reward,
                        }
                    })
                    .collect();
                CollatorPayout {
                    account: state.account,
                    points: state.points,
                    self_bond: state.bond,
                    total_stake: state.total,
                    reward,
                    delegators,
                }
            })
            .collect();

        Ok(RoundPayout {
            round: original,
            payout_block,
            payout_time,
            start_block,
            snapshot_block,
            total_points,
            total_stake,
            total_reward,
            collators: payouts,
        })
    }

    /// A missing block along the reconstruction path is a stale
    /// prerequisite (out-of-order indexing or an unfinished payout
    /// window), not a fatal error.
    async fn hash_or_reprocess(&self, height: Height) -> Result<BlockHash, ComputeError> {
        match self.node.block_hash(height).await {
            Ok(hash) => Ok(hash),
            Err(NodeError::NotFound(_)) => Err(ComputeError::Reprocess(format!(
                "block {height} not available"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn round_info(&self, at: &str) -> Result<RoundInfo, ComputeError> {
        let value = self
            .node
            .state(at, sections::PARACHAIN_STAKING, "round", &[])
            .await?;
        if value.is_null() {
            return Err(ComputeError::MissingState("parachainStaking.round".into()));
        }
        Ok(RoundInfo {
            current: parse::int(parse::field(&value, "current", "round")?, "round.current")?,
            first: parse::int(parse::field(&value, "first", "round")?, "round.first")?,
            length: parse::int(parse::field(&value, "length", "round")?, "round.length")?,
        })
    }

    /// Walk backward from the paid round's first block, one round
    /// length at a time, until the round counter matches.
    ///
    /// Assumes the round length is constant across the scan window; a
    /// counter jumping past the target means it was not, and the task
    /// is handed back for reprocessing.
    async fn find_round_start(
        &self,
        paid: &RoundInfo,
        original: RoundId,
    ) -> Result<Height, ComputeError> {
        let mut info = *paid;
        let mut probe = paid.first;
        while info.current > original {
            probe -= info.length;
            if probe < 0 {
                return Err(ComputeError::Parse(format!(
                    "round {original} precedes genesis"
                )));
            }
            let hash = self.hash_or_reprocess(probe).await?;
            info = self.round_info(&hash).await?;
            if info.current < original {
                return Err(ComputeError::Reprocess(format!(
                    "round length changed while scanning back to round {original}"
                )));
            }
        }
        Ok(info.first)
    }

    /// Exposure snapshot: the selected collator set with self-bond,
    /// ordered top delegations and awarded points, read one block
    /// before round start (where the protocol fixed it).
    async fn snapshot_collators(
        &self,
        at: &str,
        round: RoundId,
    ) -> Result<Vec<CollatorState>, ComputeError> {
        let selected = self
            .node
            .state(at, sections::PARACHAIN_STAKING, "selectedCandidates", &[])
            .await?;
        let accounts: Vec<AccountId> = selected
            .as_array()
            .ok_or_else(|| ComputeError::MissingState("selectedCandidates".into()))?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| ComputeError::Parse(format!("candidate {v}")))
            })
            .collect::<Result<_, _>>()?;

        let node = Arc::clone(&self.node);
        let at = at.to_owned();
        let round_key = round.to_string();
        fanout::try_map(accounts, self.concurrency, move |account| {
            let node = Arc::clone(&node);
            let at = at.clone();
            let round_key = round_key.clone();
            async move {
                let stake = node
                    .state(
                        &at,
                        sections::PARACHAIN_STAKING,
                        "atStake",
                        &[&round_key, &account],
                    )
                    .await?;
                let points = node
                    .state(
                        &at,
                        sections::PARACHAIN_STAKING,
                        "awardedPts",
                        &[&round_key, &account],
                    )
                    .await?;
                parse_collator_state(account, &stake, &points)
            }
        })
        .await
    }

    /// Each delegator's bond across all collators, fanned out with
    /// bounded concurrency - thousands of accounts on a busy chain.
    async fn delegator_bonds(
        &self,
        at: &str,
        collators: &[CollatorState],
    ) -> Result<HashMap<AccountId, Balance>, ComputeError> {
        let mut seen = HashSet::new();
        let accounts: Vec<AccountId> = collators
            .iter()
            .flat_map(|c| c.delegations.iter().map(|(account, _)| account.clone()))
            .filter(|account| seen.insert(account.clone()))
            .collect();

        let node = Arc::clone(&self.node);
        let at = at.to_owned();
        let bonds = fanout::try_map(accounts.clone(), self.concurrency, move |account| {
            let node = Arc::clone(&node);
            let at = at.clone();
            async move {
                let state = node
                    .state(
                        &at,
                        sections::PARACHAIN_STAKING,
                        "delegatorState",
                        &[&account],
                    )
                    .await?;
                match state.get("total").and_then(json_u128) {
                    Some(total) => Ok(total),
                    None => {
                        tracing::warn!("no delegator state for {account}");
                        Ok::<_, ComputeError>(0)
                    }
                }
            }
        })
        .await?;

        Ok(accounts.into_iter().zip(bonds).collect())
    }

    /// Forward scan over the payout window, attributing each reward
    /// marker. Collators are always paid before their delegators.
    async fn scan_payouts(
        &self,
        paid: &RoundInfo,
        collators: &[CollatorState],
        strategy: strategy::RoundStrategy,
    ) -> Result<ScannedRewards, ComputeError> {
        let awarded: Vec<&CollatorState> = collators.iter().filter(|c| c.points > 0).collect();
        let expected_slots: usize = awarded.iter().map(|c| c.delegations.len()).sum();
        let cap = strategy.max_payout_blocks(awarded.len());

        let mut rewards = ScannedRewards::default();
        let mut unpaid_collators: HashSet<&AccountId> =
            awarded.iter().map(|c| &c.account).collect();
        let mut paid_slots: HashSet<(AccountId, AccountId)> = HashSet::new();
        let mut current_collator: Option<AccountId> = None;

        for offset in 0..cap as i64 {
            if unpaid_collators.is_empty() && paid_slots.len() == expected_slots {
                break;
            }
            let height = paid.first + offset;
            let hash = self.hash_or_reprocess(height).await?;
            for event in self.node.events(&hash).await? {
                if event.section != sections::PARACHAIN_STAKING || event.method != "Rewarded" {
                    continue;
                }
                let (account, amount) = parse_rewarded(&event.data)?;
                if unpaid_collators.iter().any(|c| **c == account) {
                    unpaid_collators.retain(|c| **c != account);
                    *rewards.collators.entry(account.clone()).or_insert(0) += amount;
                    current_collator = Some(account);
                    continue;
                }
                match attribute_delegator(
                    &account,
                    &awarded,
                    &paid_slots,
                    current_collator.as_ref(),
                    strategy.attribution,
                ) {
                    Some(collator) => {
                        paid_slots.insert((collator.clone(), account.clone()));
                        *rewards
                            .delegators
                            .entry((collator, account))
                            .or_insert(0) += amount;
                    }
                    None => tracing::warn!(
                        "reward for {account} at block {height} matches no unpaid slot"
                    ),
                }
            }
        }
        if !unpaid_collators.is_empty() {
            tracing::warn!(
                "{} awarded collators had no reward marker in the payout window",
                unpaid_collators.len()
            );
        }
        Ok(rewards)
    }
}

#[derive(Default)]
struct ScannedRewards {
    collators: HashMap<AccountId, Balance>,
    delegators: HashMap<(AccountId, AccountId), Balance>,
}

/// Pick the collator a delegator reward belongs to.
///
/// The paired rule reflects runtimes that pay a collator and its
/// delegators in one block. The first-unpaid-slot fallback is a
/// documented heuristic: ambiguous when several collators share an
/// unpaid delegator in the same block.
fn attribute_delegator(
    account: &AccountId,
    awarded: &[&CollatorState],
    paid_slots: &HashSet<(AccountId, AccountId)>,
    current_collator: Option<&AccountId>,
    attribution: Attribution,
) -> Option<AccountId> {
    let unpaid_slot = |collator: &CollatorState| {
        collator
            .delegations
            .iter()
            .any(|(delegator, _)| delegator == account)
            && !paid_slots.contains(&(collator.account.clone(), account.clone()))
    };
    if attribution == Attribution::PairedCollator {
        if let Some(current) = current_collator {
            if let Some(collator) = awarded.iter().find(|c| &c.account == current) {
                if unpaid_slot(collator) {
                    return Some(current.clone());
                }
            }
        }
    }
    awarded
        .iter()
        .find(|c| unpaid_slot(c))
        .map(|c| c.account.clone())
}

fn parse_collator_state(
    account: AccountId,
    stake: &Value,
    points: &Value,
) -> Result<CollatorState, ComputeError> {
    if stake.is_null() {
        return Err(ComputeError::Reprocess(format!(
            "no stake snapshot for collator {account}"
        )));
    }
    let bond = parse::balance(parse::field(stake, "bond", "atStake")?, "atStake.bond")?;
    let total = parse::balance(parse::field(stake, "total", "atStake")?, "atStake.total")?;
    let delegations = parse::field(stake, "delegations", "atStake")?
        .as_array()
        .ok_or_else(|| ComputeError::Parse(format!("atStake.delegations of {account}")))?
        .iter()
        .map(|entry| {
            let owner = parse::field(entry, "owner", "delegation")?
                .as_str()
                .ok_or_else(|| ComputeError::Parse("delegation.owner".into()))?;
            let amount =
                parse::balance(parse::field(entry, "amount", "delegation")?, "delegation.amount")?;
            Ok((owner.to_owned(), amount))
        })
        .collect::<Result<_, ComputeError>>()?;
    Ok(CollatorState {
        account,
        bond,
        total,
        delegations,
        points: json_i64(points).unwrap_or(0),
    })
}

fn parse_rewarded(data: &Value) -> Result<(AccountId, Balance), ComputeError> {
    let entries = data
        .as_array()
        .ok_or_else(|| ComputeError::Parse(format!("Rewarded data: {data}")))?;
    let account = entries
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| ComputeError::Parse(format!("Rewarded account: {data}")))?;
    let amount = entries
        .get(1)
        .and_then(json_u128)
        .ok_or_else(|| ComputeError::Parse(format!("Rewarded amount: {data}")))?;
    Ok((account.to_owned(), amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn collator(account: &str, delegators: &[&str], points: i64) -> CollatorState {
        CollatorState {
            account: account.to_owned(),
            bond: 100,
            total: 100 + 10 * delegators.len() as Balance,
            delegations: delegators.iter().map(|d| (d.to_string(), 10)).collect(),
            points,
        }
    }

    #[test]
    fn delegator_goes_to_first_unpaid_slot() {
        let a = collator("col_a", &["dave"], 10);
        let b = collator("col_b", &["dave"], 10);
        let awarded = vec![&a, &b];
        let mut paid = HashSet::new();

        let first = attribute_delegator(
            &"dave".to_string(),
            &awarded,
            &paid,
            None,
            Attribution::FirstUnpaidSlot,
        );
        assert_eq!(first, Some("col_a".to_string()));

        paid.insert(("col_a".to_string(), "dave".to_string()));
        let second = attribute_delegator(
            &"dave".to_string(),
            &awarded,
            &paid,
            None,
            Attribution::FirstUnpaidSlot,
        );
        assert_eq!(second, Some("col_b".to_string()));
    }

    #[test]
    fn paired_attribution_prefers_current_collator() {
        let a = collator("col_a", &["dave"], 10);
        let b = collator("col_b", &["dave"], 10);
        let awarded = vec![&a, &b];
        let paid = HashSet::new();
        let current = "col_b".to_string();

        let got = attribute_delegator(
            &"dave".to_string(),
            &awarded,
            &paid,
            Some(&current),
            Attribution::PairedCollator,
        );
        assert_eq!(got, Some("col_b".to_string()));
    }

    #[test]
    fn unknown_account_is_unattributable() {
        let a = collator("col_a", &["dave"], 10);
        let awarded = vec![&a];
        let got = attribute_delegator(
            &"mallory".to_string(),
            &awarded,
            &HashSet::new(),
            None,
            Attribution::FirstUnpaidSlot,
        );
        assert_eq!(got, None);
    }

    #[test]
    fn collator_snapshot_parses_gateway_shape() {
        let stake = json!({
            "bond": "1000",
            "total": "1500",
            "delegations": [
                {"owner": "dave", "amount": "300"},
                {"owner": "erin", "amount": "200"},
            ],
        });
        let state = parse_collator_state("col".into(), &stake, &json!(40)).unwrap();
        assert_eq!(state.bond, 1000);
        assert_eq!(state.total, 1500);
        assert_eq!(state.delegations.len(), 2);
        assert_eq!(state.points, 40);
    }

    #[test]
    fn missing_snapshot_asks_for_reprocessing() {
        let got = parse_collator_state("col".into(), &Value::Null, &json!(0));
        assert!(matches!(got, Err(ComputeError::Reprocess(_))));
    }
}
