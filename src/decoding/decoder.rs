use std::collections::HashMap;

use itertools::Itertools;

use super::calls::Call;
use super::calls::Wrapper;
use crate::constants::sections;
use crate::core::node::models::ChainEvent;
use crate::core::node::models::Phase;
use crate::core::node::models::RawExtrinsic;
use crate::core::types::AccountId;
use crate::core::types::Balance;
use crate::core::types::BlockRecord;
use crate::core::types::ChainFamily;
use crate::core::types::EventRecord;
use crate::core::types::ExtrinsicRecord;
use crate::core::types::Height;
use crate::core::ChainClient;
use crate::core::NodeError;
use crate::utils::json_i64;

/// Fully decoded block, ready for persisting.
#[derive(Debug)]
pub struct BlockData {
    pub block: BlockRecord,
    pub events: Vec<EventRecord>,
    pub extrinsics: Vec<ExtrinsicRecord>,
}

/// Turns one chain block into normalized records.
pub struct BlockDecoder<'a> {
    node: &'a dyn ChainClient,
    family: ChainFamily,
}

impl<'a> BlockDecoder<'a> {
    pub fn new(node: &'a dyn ChainClient, family: ChainFamily) -> Self {
        Self { node, family }
    }

    pub async fn decode(&self, height: Height, hash: &str) -> Result<BlockData, NodeError> {
        tracing::debug!("decoding block {height}");
        let (block, header, events, spec_version) = tokio::try_join!(
            self.node.block(hash),
            self.node.extended_header(hash),
            self.node.events(hash),
            self.node.runtime_version(hash),
        )?;
        let timestamp = self.timestamp(&block.extrinsics, hash).await?;
        let (era, round) = self.staking_context(hash).await?;

        let event_records: Vec<EventRecord> = events
            .iter()
            .enumerate()
            .map(|(idx, ev)| EventRecord {
                height,
                idx: idx as i32,
                section: ev.section.clone(),
                method: ev.method.clone(),
                data: ev.data.clone(),
                raw: ev.raw.clone(),
            })
            .collect();

        // Event keys per application index, computed once and shared by
        // every record a top-level extrinsic expands into.
        let ref_events: HashMap<u32, Vec<String>> = events
            .iter()
            .zip(&event_records)
            .filter_map(|(ev, record)| match ev.phase {
                Phase::ApplyExtrinsic(n) => Some((n, record.id())),
                _ => None,
            })
            .into_group_map();

        let mut extrinsics = Vec::new();
        for (idx, ext) in block.extrinsics.iter().enumerate() {
            let success = extrinsic_success(&events, idx as u32);
            let refs = ref_events.get(&(idx as u32)).cloned().unwrap_or_default();
            extrinsics.extend(flatten_extrinsic(height, idx, ext, success, refs));
        }

        Ok(BlockData {
            block: BlockRecord {
                height,
                hash: hash.to_owned(),
                parent_hash: block.header.parent_hash,
                state_root: block.header.state_root,
                extrinsics_root: block.header.extrinsics_root,
                digest: header.digest,
                author: header.author,
                timestamp,
                spec_version,
                era,
                round,
            },
            events: event_records,
            extrinsics,
        })
    }

    /// Block timestamp from the `timestamp.set` inherent, falling back
    /// to a state query for blocks without one.
    async fn timestamp(
        &self,
        extrinsics: &[RawExtrinsic],
        hash: &str,
    ) -> Result<i64, NodeError> {
        let from_inherent = extrinsics
            .iter()
            .filter_map(|ext| Call::decode(&ext.call).ok())
            .find(|call| call.section == sections::TIMESTAMP && call.method == "set")
            .and_then(|call| call.arg("now").and_then(json_i64));
        if let Some(ts) = from_inherent {
            return Ok(ts);
        }
        let value = self.node.state(hash, sections::TIMESTAMP, "now", &[]).await?;
        Ok(json_i64(&value).unwrap_or_else(|| {
            tracing::warn!("block {hash} has no timestamp");
            0
        }))
    }

    async fn staking_context(
        &self,
        hash: &str,
    ) -> Result<(Option<i64>, Option<i64>), NodeError> {
        match self.family {
            ChainFamily::Relay => {
                let value = self
                    .node
                    .state(hash, sections::STAKING, "activeEra", &[])
                    .await?;
                Ok((value.get("index").and_then(json_i64), None))
            }
            ChainFamily::Parachain => {
                let value = self
                    .node
                    .state(hash, sections::PARACHAIN_STAKING, "round", &[])
                    .await?;
                Ok((None, value.get("current").and_then(json_i64)))
            }
        }
    }
}

/// Success of the extrinsic applied at `idx`, from the system-level
/// markers in the block's events.
fn extrinsic_success(events: &[ChainEvent], idx: u32) -> bool {
    for ev in events {
        if ev.phase != Phase::ApplyExtrinsic(idx) || ev.section != sections::SYSTEM {
            continue;
        }
        match ev.method.as_str() {
            "ExtrinsicSuccess" => return true,
            "ExtrinsicFailed" => return false,
            _ => {}
        }
    }
    // No marker: inherent applied without system events.
    true
}

struct ExtrinsicContext {
    height: Height,
    signer: Option<AccountId>,
    success: bool,
    nonce: Option<i64>,
    tip: Option<Balance>,
    ref_events: Vec<String>,
}

/// Expands one submitted extrinsic into records: the call itself plus,
/// for recognized composite wrappers, every unwrapped inner call at
/// every depth. Hierarchical paths are parent path + local index.
pub fn flatten_extrinsic(
    height: Height,
    top_idx: usize,
    ext: &RawExtrinsic,
    success: bool,
    ref_events: Vec<String>,
) -> Vec<ExtrinsicRecord> {
    let ctx = ExtrinsicContext {
        height,
        signer: ext.signature.as_ref().map(|s| s.signer.clone()),
        success,
        nonce: ext.nonce.as_ref().and_then(|n| n.parse().ok()),
        tip: ext.tip.as_ref().and_then(|t| t.parse().ok()),
        ref_events,
    };
    let mut records = Vec::new();
    let path = top_idx.to_string();
    match Call::decode(&ext.call) {
        Ok(call) => walk(&ctx, &call, path, &mut records),
        Err(e) => {
            tracing::warn!("undecodable extrinsic {height}:{top_idx}: {e}");
            records.push(record(&ctx, path, "unknown", "unknown", ext.call.clone()));
        }
    }
    records
}

fn walk(ctx: &ExtrinsicContext, call: &Call, path: String, records: &mut Vec<ExtrinsicRecord>) {
    records.push(record(
        ctx,
        path.clone(),
        &call.section,
        &call.method,
        call.to_value(),
    ));
    let Some(wrapper) = Wrapper::detect(call) else {
        return;
    };
    for (idx, inner) in wrapper.inner_values(call).into_iter().enumerate() {
        let inner_path = format!("{path}-{idx}");
        match Call::decode(inner) {
            Ok(inner_call) => walk(ctx, &inner_call, inner_path, records),
            // Contained: recursion stops here, the wrapper record stands.
            Err(e) => tracing::debug!("undecodable inner call at {inner_path}: {e}"),
        }
    }
}

fn record(
    ctx: &ExtrinsicContext,
    path: String,
    section: &str,
    method: &str,
    call: serde_json::Value,
) -> ExtrinsicRecord {
    ExtrinsicRecord {
        height: ctx.height,
        path,
        section: section.to_owned(),
        method: method.to_owned(),
        signer: ctx.signer.clone(),
        success: ctx.success,
        nonce: ctx.nonce,
        tip: ctx.tip,
        ref_events: ctx.ref_events.clone(),
        call,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn signed(call: serde_json::Value) -> RawExtrinsic {
        serde_json::from_value(json!({
            "signature": {"signer": "alice"},
            "nonce": "4",
            "tip": "250",
            "call": call,
        }))
        .unwrap()
    }

    #[test]
    fn plain_extrinsic_yields_one_record() {
        let ext = signed(json!({
            "section": "balances", "method": "transfer",
            "args": {"dest": "bob", "value": "10"},
        }));
        let records = flatten_extrinsic(100, 2, &ext, true, vec!["100-0".into()]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "2");
        assert_eq!(records[0].section, "balances");
        assert_eq!(records[0].signer, Some("alice".into()));
        assert_eq!(records[0].nonce, Some(4));
        assert_eq!(records[0].tip, Some(250));
    }

    #[test]
    fn three_nested_wrappers_yield_four_records() {
        let transfer = json!({
            "section": "balances", "method": "transfer",
            "args": {"dest": "bob", "value": "10"},
        });
        let proxy = json!({
            "section": "proxy", "method": "proxy",
            "args": {"real": "charlie", "call": transfer},
        });
        let multisig = json!({
            "section": "multisig", "method": "asMulti",
            "args": {"threshold": 2, "call": proxy},
        });
        let batch = json!({
            "section": "utility", "method": "batch",
            "args": {"calls": [multisig]},
        });
        let refs = vec!["100-1".to_string(), "100-2".to_string()];
        let records = flatten_extrinsic(100, 0, &signed(batch), true, refs.clone());

        assert_eq!(records.len(), 4);
        let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["0", "0-0", "0-0-0", "0-0-0-0"]);
        assert_eq!(records[3].section, "balances");
        for r in &records {
            assert_eq!(r.ref_events, refs);
        }
    }

    #[test]
    fn malformed_inner_call_stops_recursion_locally() {
        let batch = json!({
            "section": "utility", "method": "batch",
            "args": {"calls": [
                "0xdeadbeef",
                {"section": "balances", "method": "transfer", "args": {}},
            ]},
        });
        let records = flatten_extrinsic(100, 1, &signed(batch), false, vec![]);
        // Wrapper plus the one decodable inner call.
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, "1");
        assert_eq!(records[1].path, "1-1");
        assert!(!records[1].success);
    }

    #[test]
    fn success_scan_matches_apply_index() {
        let events: Vec<ChainEvent> = serde_json::from_value(json!([
            {"phase": {"applyExtrinsic": 0}, "section": "system",
             "method": "ExtrinsicSuccess", "data": []},
            {"phase": {"applyExtrinsic": 1}, "section": "system",
             "method": "ExtrinsicFailed", "data": []},
            {"phase": "finalization", "section": "system",
             "method": "ExtrinsicFailed", "data": []},
        ]))
        .unwrap();
        assert!(extrinsic_success(&events, 0));
        assert!(!extrinsic_success(&events, 1));
        assert!(extrinsic_success(&events, 2));
    }
}
