use rust_decimal::Decimal;

pub type AccountId = String;
pub type Balance = u128;
pub type BlockHash = String;
pub type EraId = i64;
pub type Height = i64;
pub type RoundId = i64;
pub type SpecVersion = i32;
pub type Timestamp = i64;

/// Staking flavour of the indexed chain.
///
/// Decides which cascade rules apply and which reward engine handles
/// payout reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFamily {
    /// Direct validator staking (relay chains). Rewards are computed from
    /// era exposure when an era-payout event is observed.
    Relay,
    /// Collator staking with a reward payment delay (parachains). Rewards
    /// are collected from payout events at the start of a later round.
    Parachain,
}

/// Normalized block data, one row per height.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub height: Height,
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    pub state_root: String,
    pub extrinsics_root: String,
    pub digest: serde_json::Value,
    pub author: Option<AccountId>,
    pub timestamp: Timestamp,
    pub spec_version: SpecVersion,
    /// Active era at this height (relay chains only).
    pub era: Option<EraId>,
    /// Active round at this height (parachains only).
    pub round: Option<RoundId>,
}

/// One chain event, keyed by (height, position in the block's event vector).
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub height: Height,
    pub idx: i32,
    pub section: String,
    pub method: String,
    pub data: serde_json::Value,
    pub raw: Option<String>,
}

impl EventRecord {
    /// Key referenced by extrinsic records.
    pub fn id(&self) -> String {
        event_id(self.height, self.idx)
    }
}

pub fn event_id(height: Height, idx: i32) -> String {
    format!("{height}-{idx}")
}

/// One call node, keyed by (height, hierarchical index path).
///
/// A submitted extrinsic wrapping composite calls expands into several
/// records: the wrapper itself plus every unwrapped inner call, at every
/// depth. All records of one top-level extrinsic share the same
/// referenced-event list.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtrinsicRecord {
    pub height: Height,
    /// Dash-joined indices, e.g. "2" for a top-level extrinsic and
    /// "2-0-1" for the second call of a batch nested under it.
    pub path: String,
    pub section: String,
    pub method: String,
    pub signer: Option<AccountId>,
    pub success: bool,
    pub nonce: Option<i64>,
    pub tip: Option<Balance>,
    pub ref_events: Vec<String>,
    pub call: serde_json::Value,
}

/// Widens a balance into the numeric column representation.
///
/// Amounts past 96 bits do not occur on the chains we index.
pub fn balance_to_decimal(value: Balance) -> Decimal {
    Decimal::try_from_i128_with_scale(value as i128, 0).expect("balance fits numeric column")
}

#[cfg(feature = "test-utilities")]
pub mod testutils {
    use rand::Rng;

    /// Random 32-byte hash, hex encoded with a 0x prefix.
    pub fn random_hash() -> String {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        format!("0x{hex}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn event_id_joins_height_and_index() {
        assert_eq!(event_id(1000, 3), "1000-3");
    }

    #[test]
    fn balance_to_decimal_keeps_value() {
        let d = balance_to_decimal(1_234_567_890_123_456_789u128);
        assert_eq!(d.to_string(), "1234567890123456789");
    }
}
