use tokio::time::Duration;

/// Number of Block tasks persisted and published per dispatcher chunk.
///
/// Bounds transaction size during range backfills.
pub const DISPATCH_CHUNK_SIZE: i64 = 1000;

/// Default number of outstanding chain queries in reward-engine fan-outs.
pub const FANOUT_CONCURRENCY: usize = 50;

/// How often the dispatcher polls the node for a new finalized head.
pub const FINALIZED_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// How often a paused dispatcher re-checks the pause flag.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Back-off after a failed task message before the next delivery attempt.
pub const REDELIVERY_BACKOFF: Duration = Duration::from_millis(2000);

/// Bound on waiting for in-flight work during graceful shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub mod sections {
    /// System pallet, source of extrinsic success/failure markers.
    pub const SYSTEM: &str = "system";
    /// Relay-chain staking pallet.
    pub const STAKING: &str = "staking";
    /// Parachain collator-staking pallet.
    pub const PARACHAIN_STAKING: &str = "parachainStaking";
    pub const BALANCES: &str = "balances";
    pub const TIMESTAMP: &str = "timestamp";
    pub const UTILITY: &str = "utility";
    pub const MULTISIG: &str = "multisig";
    pub const PROXY: &str = "proxy";
}
