//! Chain fixtures shared across integration tests.
#![allow(dead_code)] // not used by all tests

use serde_json::json;
use serde_json::Value;

use subwatch::core::node::models::ChainEvent;
use subwatch::core::node::models::ExtendedHeader;
use subwatch::core::node::models::SignedBlock;
use subwatch::core::types::testutils::random_hash;
use subwatch::core::types::Height;

pub fn applied_event(idx: u32, section: &str, method: &str, data: Value) -> ChainEvent {
    serde_json::from_value(json!({
        "phase": {"applyExtrinsic": idx},
        "section": section,
        "method": method,
        "data": data,
    }))
    .unwrap()
}

pub fn finalization_event(section: &str, method: &str, data: Value) -> ChainEvent {
    serde_json::from_value(json!({
        "phase": "finalization",
        "section": section,
        "method": method,
        "data": data,
    }))
    .unwrap()
}

pub fn success_event(idx: u32) -> ChainEvent {
    applied_event(idx, "system", "ExtrinsicSuccess", json!([]))
}

/// The timestamp.set inherent every block carries.
pub fn timestamp_set(now: i64) -> Value {
    json!({
        "call": {
            "section": "timestamp",
            "method": "set",
            "args": {"now": now.to_string()},
        },
    })
}

pub fn signed_block(height: Height, hash: &str, extrinsics: Vec<Value>) -> SignedBlock {
    serde_json::from_value(json!({
        "header": {
            "height": height,
            "hash": hash,
            "parentHash": random_hash(),
            "stateRoot": random_hash(),
            "extrinsicsRoot": random_hash(),
        },
        "extrinsics": extrinsics,
    }))
    .unwrap()
}

pub fn extended_header(author: &str) -> ExtendedHeader {
    serde_json::from_value(json!({
        "author": author,
        "digest": {"logs": []},
    }))
    .unwrap()
}
