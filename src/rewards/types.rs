use crate::core::types::AccountId;
use crate::core::types::Balance;
use crate::core::types::EraId;
use crate::core::types::Height;
use crate::core::types::RoundId;
use crate::core::types::Timestamp;
use crate::core::NodeError;
use crate::rewards::share::Share;

#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("node: {0}")]
    Node(#[from] NodeError),
    /// A dependency row/block is not available yet; the task should be
    /// recreated and retried later rather than fail.
    #[error("prerequisite missing: {0}")]
    Reprocess(String),
    #[error("missing chain state: {0}")]
    MissingState(String),
    #[error("unexpected chain data: {0}")]
    Parse(String),
}

/// Full reward distribution of one era, ready for persisting.
#[derive(Debug, Clone, PartialEq)]
pub struct EraPayout {
    pub era: EraId,
    pub payout_block: Height,
    pub payout_time: Timestamp,
    pub total_points: i64,
    pub total_stake: Balance,
    pub total_reward: Balance,
    pub validators: Vec<ValidatorPayout>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorPayout {
    pub account: AccountId,
    pub points: i64,
    pub commission: Share,
    pub own_stake: Balance,
    /// Own plus nominator exposure.
    pub total_stake: Balance,
    pub reward: Balance,
    pub nominators: Vec<NominatorPayout>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NominatorPayout {
    pub account: AccountId,
    pub stake: Balance,
    pub reward: Balance,
}

/// Full reward distribution of one round, ready for persisting.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundPayout {
    pub round: RoundId,
    pub payout_block: Height,
    pub payout_time: Timestamp,
    pub start_block: Height,
    /// Block the stake exposure was read at: one before round start.
    pub snapshot_block: Height,
    pub total_points: i64,
    pub total_stake: Balance,
    pub total_reward: Balance,
    pub collators: Vec<CollatorPayout>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollatorPayout {
    pub account: AccountId,
    pub points: i64,
    pub self_bond: Balance,
    /// Self-bond plus counted delegations.
    pub total_stake: Balance,
    pub reward: Balance,
    pub delegators: Vec<DelegatorPayout>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelegatorPayout {
    pub account: AccountId,
    /// Amount bonded to this collator in the round snapshot.
    pub amount: Balance,
    /// The delegator's bond across all collators.
    pub total_bond: Balance,
    pub reward: Balance,
}

/// Strict accessors for gateway state values.
pub(crate) mod parse {
    use serde_json::Value;

    use super::ComputeError;
    use crate::core::types::Balance;
    use crate::utils::json_i64;
    use crate::utils::json_u128;

    pub fn balance(value: &Value, what: &str) -> Result<Balance, ComputeError> {
        json_u128(value).ok_or_else(|| ComputeError::Parse(format!("{what}: {value}")))
    }

    pub fn int(value: &Value, what: &str) -> Result<i64, ComputeError> {
        json_i64(value).ok_or_else(|| ComputeError::Parse(format!("{what}: {value}")))
    }

    pub fn field<'a>(value: &'a Value, name: &str, what: &str) -> Result<&'a Value, ComputeError> {
        value
            .get(name)
            .ok_or_else(|| ComputeError::Parse(format!("{what} has no `{name}`: {value}")))
    }
}
