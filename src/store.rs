//! Write-once output tables, owned by the handlers that fill them
//! inside the task transaction.

pub mod balances;
pub mod blocks;
pub mod events;
pub mod extrinsics;
pub mod metadata;
pub mod rewards;
pub mod schema;
