use crate::core::types::ChainFamily;
use crate::core::types::Height;

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Postgresql connection URI postgresql://[userspec@][hostspec][/dbname][?paramspec]
    pub connection_uri: String,
}

impl PostgresConfig {
    pub fn new(uri: &str) -> Self {
        Self {
            connection_uri: uri.to_owned(),
        }
    }
}

/// Chain-specific settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub family: ChainFamily,
    /// Rounds between accrual and disbursement (parachains only).
    pub reward_payment_delay: i64,
    /// Emit a BlockBalance task for every indexed block.
    pub track_balances: bool,
    /// Emit a BlockMetadata task for every indexed block.
    pub track_metadata: bool,
}

impl ChainConfig {
    pub fn relay() -> Self {
        Self {
            family: ChainFamily::Relay,
            reward_payment_delay: 0,
            track_balances: false,
            track_metadata: false,
        }
    }

    pub fn parachain(reward_payment_delay: i64) -> Self {
        Self {
            family: ChainFamily::Parachain,
            reward_payment_delay,
            track_balances: false,
            track_metadata: false,
        }
    }

    pub fn with_balance_tracking(mut self) -> Self {
        self.track_balances = true;
        self
    }

    pub fn with_metadata_tracking(mut self) -> Self {
        self.track_metadata = true;
        self
    }
}

/// Historical backfill range, inclusive on both ends.
#[derive(Debug, Clone, Copy)]
pub struct BackfillRange {
    pub from: Height,
    pub to: Height,
}
