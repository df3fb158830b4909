pub mod balances;
pub mod block;
pub mod metadata;
pub mod staking;

pub use balances::BalanceWorker;
pub use block::BlockWorker;
pub use metadata::MetadataWorker;
pub use staking::EraWorker;
pub use staking::RoundWorker;
