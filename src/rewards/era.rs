//! Era reward distribution for direct validator staking.
//!
//! Unlike rounds, era payouts are not scanned from events: the chain
//! records era totals and per-validator exposure, so the split is
//! recomputed with the same fixed-point arithmetic the runtime uses.

use std::sync::Arc;

use serde_json::Value;

use super::fanout;
use super::share::Share;
use super::share::PERBILL_UNIT;
use super::types::parse;
use super::types::ComputeError;
use super::types::EraPayout;
use super::types::NominatorPayout;
use super::types::ValidatorPayout;
use crate::constants::sections;
use crate::core::types::AccountId;
use crate::core::types::Balance;
use crate::core::types::EraId;
use crate::core::types::Height;
use crate::core::ChainClient;
use crate::core::NodeError;
use crate::utils::json_i64;

pub struct EraComputer {
    node: Arc<dyn ChainClient>,
    concurrency: usize,
}

/// Exposure and preferences of one validator, as fetched.
struct ValidatorState {
    account: AccountId,
    own: Balance,
    total: Balance,
    nominators: Vec<(AccountId, Balance)>,
    commission_parts: u128,
}

impl EraComputer {
    pub fn new(node: Arc<dyn ChainClient>, concurrency: usize) -> Self {
        Self { node, concurrency }
    }

    pub async fn compute(
        &self,
        era: EraId,
        payout_block: Height,
    ) -> Result<EraPayout, ComputeError> {
        tracing::info!("computing rewards for era {era} paid at block {payout_block}");
        let at = match self.node.block_hash(payout_block).await {
            Ok(hash) => hash,
            Err(NodeError::NotFound(_)) => {
                return Err(ComputeError::Reprocess(format!(
                    "payout block {payout_block} not available"
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let era_key = era.to_string();

        let reward_value = self
            .node
            .state(&at, sections::STAKING, "erasValidatorReward", &[&era_key])
            .await?;
        if reward_value.is_null() {
            // Observed when the payout event outruns era bookkeeping
            // indexed by concurrent workers.
            return Err(ComputeError::Reprocess(format!(
                "validator reward for era {era} not recorded yet"
            )));
        }
        let total_reward = parse::balance(&reward_value, "erasValidatorReward")?;

        let points_value = self
            .node
            .state(&at, sections::STAKING, "erasRewardPoints", &[&era_key])
            .await?;
        if points_value.is_null() {
            return Err(ComputeError::Reprocess(format!(
                "reward points for era {era} not recorded yet"
            )));
        }
        let total_points = parse::int(
            parse::field(&points_value, "total", "erasRewardPoints")?,
            "erasRewardPoints.total",
        )?;
        let individual = parse::field(&points_value, "individual", "erasRewardPoints")?
            .as_object()
            .ok_or_else(|| ComputeError::Parse("erasRewardPoints.individual".into()))?;
        let points: Vec<(AccountId, i64)> = individual
            .iter()
            .map(|(account, value)| {
                json_i64(value)
                    .map(|pts| (account.clone(), pts))
                    .ok_or_else(|| ComputeError::Parse(format!("points of {account}")))
            })
            .collect::<Result<_, _>>()?;

        let total_stake = parse::balance(
            &self
                .node
                .state(&at, sections::STAKING, "erasTotalStake", &[&era_key])
                .await?,
            "erasTotalStake",
        )?;

        let payout_time = json_i64(
            &self
                .node
                .state(&at, sections::TIMESTAMP, "now", &[])
                .await?,
        )
        .unwrap_or(0);

        let states = self
            .fetch_validator_states(&at, &era_key, points.iter().map(|(a, _)| a.clone()).collect())
            .await?;

        let validators = points
            .iter()
            .zip(states)
            .map(|((_, pts), state)| distribute(state, *pts, total_points, total_reward))
            .collect();

        Ok(EraPayout {
            era,
            payout_block,
            payout_time,
            total_points,
            total_stake,
            total_reward,
            validators,
        })
    }

    /// Per-validator exposure and preference lookups, fanned out with
    /// bounded concurrency. Fails as a whole on the first error.
    async fn fetch_validator_states(
        &self,
        at: &str,
        era_key: &str,
        accounts: Vec<AccountId>,
    ) -> Result<Vec<ValidatorState>, ComputeError> {
        let node = Arc::clone(&self.node);
        let at = at.to_owned();
        let era_key = era_key.to_owned();
        fanout::try_map(accounts, self.concurrency, move |account| {
            let node = Arc::clone(&node);
            let at = at.clone();
            let era_key = era_key.clone();
            async move {
                let exposure = node
                    .state(
                        &at,
                        sections::STAKING,
                        "erasStakersClipped",
                        &[&era_key, &account],
                    )
                    .await?;
                let prefs = node
                    .state(
                        &at,
                        sections::STAKING,
                        "erasValidatorPrefs",
                        &[&era_key, &account],
                    )
                    .await?;
                parse_validator_state(account, &exposure, &prefs)
            }
        })
        .await
    }
}

fn parse_validator_state(
    account: AccountId,
    exposure: &Value,
    prefs: &Value,
) -> Result<ValidatorState, ComputeError> {
    let own = parse::balance(parse::field(exposure, "own", "exposure")?, "exposure.own")?;
    let total = parse::balance(parse::field(exposure, "total", "exposure")?, "exposure.total")?;
    let others = parse::field(exposure, "others", "exposure")?
        .as_array()
        .ok_or_else(|| ComputeError::Parse(format!("exposure.others of {account}")))?;
    let nominators = others
        .iter()
        .map(|entry| {
            let who = parse::field(entry, "who", "exposure.others")?
                .as_str()
                .ok_or_else(|| ComputeError::Parse("exposure.others.who".into()))?;
            let value =
                parse::balance(parse::field(entry, "value", "exposure.others")?, "exposure.value")?;
            Ok((who.to_owned(), value))
        })
        .collect::<Result<_, ComputeError>>()?;
    let commission_parts = match prefs.get("commission") {
        Some(value) => parse::balance(value, "prefs.commission")?,
        None => 0,
    };
    Ok(ValidatorState {
        account,
        own,
        total,
        nominators,
        commission_parts,
    })
}

/// The runtime's split: points share of the era payout, commission off
/// the top, the rest proportional to exposure (own stake included).
fn distribute(
    state: ValidatorState,
    points: i64,
    total_points: i64,
    total_reward: Balance,
) -> ValidatorPayout {
    let points_share = Share::from_rational(points as u128, total_points as u128, PERBILL_UNIT);
    let validator_total = points_share.of(total_reward);

    // Chain invariant caps commission at one; clamp anyway so a bad
    // value cannot underflow the leftover.
    let commission = Share::perbill(state.commission_parts.min(PERBILL_UNIT));
    let commission_cut = commission.of(validator_total);
    let leftover = validator_total - commission_cut;

    let own_part = Share::from_rational(state.own, state.total, PERBILL_UNIT).of(leftover);

    let nominators = state
        .nominators
        .into_iter()
        .map(|(account, stake)| NominatorPayout {
            account,
            stake,
            reward: Share::from_rational(stake, state.total, PERBILL_UNIT).of(leftover),
        })
        .collect();

    ValidatorPayout {
        account: state.account,
        points,
        commission,
        own_stake: state.own,
        total_stake: state.total,
        reward: commission_cut + own_part,
        nominators,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state(own: Balance, others: Vec<(&str, Balance)>, commission: u128) -> ValidatorState {
        let total = own + others.iter().map(|(_, v)| v).sum::<Balance>();
        ValidatorState {
            account: "val".into(),
            own,
            total,
            nominators: others
                .into_iter()
                .map(|(a, v)| (a.to_owned(), v))
                .collect(),
            commission_parts: commission,
        }
    }

    #[test]
    fn full_commission_takes_everything() {
        let payout = distribute(state(100, vec![("nom", 900)], PERBILL_UNIT), 20, 80, 1_000);
        // 20/80 points -> 250 total, all of it commission.
        assert_eq!(payout.reward, 250);
        assert_eq!(payout.nominators[0].reward, 0);
    }

    #[test]
    fn split_is_proportional_to_exposure() {
        // 100% of the pot, no commission, own 1/4 of exposure.
        let payout = distribute(state(250, vec![("nom", 750)], 0), 10, 10, 1_000);
        assert_eq!(payout.reward, 250);
        assert_eq!(payout.nominators[0].reward, 750);
    }

    #[test]
    fn rewards_are_conserved_within_rounding() {
        let payout = distribute(
            state(1_000, vec![("a", 333), ("b", 333), ("c", 334)], 100_000_000),
            7,
            21,
            1_000_000_000,
        );
        let distributed: Balance =
            payout.reward + payout.nominators.iter().map(|n| n.reward).sum::<Balance>();
        let expected = 333_333_333u128; // 7/21 of the pot
        assert!(distributed.abs_diff(expected) <= 1 + payout.nominators.len() as u128);
    }
}
