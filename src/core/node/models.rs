//! Response models of the decoding node gateway.

use serde::Deserialize;
use serde::Serialize;

use crate::core::types::AccountId;
use crate::core::types::Height;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHashResponse {
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedHead {
    pub height: Height,
    pub hash: String,
}

/// A block with its submitted extrinsics, calls decoded to JSON.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedBlock {
    pub header: BlockHeader,
    pub extrinsics: Vec<RawExtrinsic>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub height: Height,
    pub hash: String,
    pub parent_hash: String,
    pub state_root: String,
    pub extrinsics_root: String,
}

/// Header enriched with data only derivable from the digest.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedHeader {
    #[serde(default)]
    pub author: Option<AccountId>,
    #[serde(default)]
    pub digest: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExtrinsic {
    /// Absent for unsigned (inherent) extrinsics.
    #[serde(default)]
    pub signature: Option<ExtrinsicSignature>,
    /// Decimal string, absent for inherents.
    #[serde(default)]
    pub nonce: Option<String>,
    /// Decimal string, absent for inherents.
    #[serde(default)]
    pub tip: Option<String>,
    /// Decoded call, shape `{"section": .., "method": .., "args": ..}`,
    /// with nested calls decoded recursively where the gateway could.
    pub call: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtrinsicSignature {
    pub signer: AccountId,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub events: Vec<ChainEvent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    pub phase: Phase,
    pub section: String,
    pub method: String,
    pub data: serde_json::Value,
    #[serde(default)]
    pub raw: Option<String>,
}

/// Execution phase an event was emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Emitted while applying the extrinsic at this index.
    ApplyExtrinsic(u32),
    Initialization,
    Finalization,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersionResponse {
    pub spec_version: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    /// Decoded storage value; null when the key holds no value.
    #[serde(default)]
    pub value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn phase_deserializes_both_forms() {
        let apply: Phase = serde_json::from_str(r#"{"applyExtrinsic": 2}"#).unwrap();
        assert_eq!(apply, Phase::ApplyExtrinsic(2));
        let init: Phase = serde_json::from_str(r#""initialization""#).unwrap();
        assert_eq!(init, Phase::Initialization);
    }

    #[test]
    fn unsigned_extrinsic_deserializes() {
        let ext: RawExtrinsic = serde_json::from_str(
            r#"{"call": {"section": "timestamp", "method": "set", "args": {"now": "1"}}}"#,
        )
        .unwrap();
        assert!(ext.signature.is_none());
        assert!(ext.nonce.is_none());
    }
}
