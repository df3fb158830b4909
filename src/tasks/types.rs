use postgres_from_row::FromRow;
use postgres_types::FromSql;
use postgres_types::ToSql;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::types::Height;
use crate::utils::json_i64;

/// Ingestion stages a task row can belong to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, ToSql, FromSql, Serialize, Deserialize,
)]
#[postgres(name = "task_kind")]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[postgres(name = "block")]
    Block,
    #[postgres(name = "era")]
    Era,
    #[postgres(name = "round")]
    Round,
    #[postgres(name = "block_balance")]
    BlockBalance,
    #[postgres(name = "block_metadata")]
    BlockMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToSql, FromSql)]
#[postgres(name = "task_status")]
pub enum TaskStatus {
    #[postgres(name = "not_processed")]
    NotProcessed,
    #[postgres(name = "processed")]
    Processed,
}

/// A persisted task row.
///
/// Several rows may exist for one (kind, entity id) over time; only the
/// row with the highest `row_id` is authoritative. Rows are never
/// deleted - they double as an audit/idempotency log.
#[derive(Debug, Clone, FromRow)]
pub struct ProcessingTask {
    /// Insertion-order cursor and row-lock target.
    pub row_id: i64,
    pub kind: TaskKind,
    /// Scoped per kind: block height, era id or round id.
    pub entity_id: i64,
    pub status: TaskStatus,
    /// Minted at creation; queue messages carrying another token for
    /// this (kind, entity id) are stale.
    pub dedup_token: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub start_time: OffsetDateTime,
    pub finish_time: Option<OffsetDateTime>,
}

/// A task awaiting persistence. The dedup token is minted on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub kind: TaskKind,
    pub entity_id: i64,
    pub payload: serde_json::Value,
}

impl NewTask {
    pub fn block(height: Height) -> Self {
        Self {
            kind: TaskKind::Block,
            entity_id: height,
            payload: serde_json::json!({}),
        }
    }

    pub fn era(era: i64, payout_block: Height) -> Self {
        Self {
            kind: TaskKind::Era,
            entity_id: era,
            payload: payload::payout(payout_block),
        }
    }

    pub fn round(round: i64, payout_block: Height) -> Self {
        Self {
            kind: TaskKind::Round,
            entity_id: round,
            payload: payload::payout(payout_block),
        }
    }

    pub fn block_balance(height: Height) -> Self {
        Self {
            kind: TaskKind::BlockBalance,
            entity_id: height,
            payload: serde_json::json!({}),
        }
    }

    pub fn block_metadata(height: Height) -> Self {
        Self {
            kind: TaskKind::BlockMetadata,
            entity_id: height,
            payload: serde_json::json!({}),
        }
    }
}

/// The wire form of a task, published once per created row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub kind: TaskKind,
    pub entity_id: i64,
    pub dedup_token: String,
    pub payload: serde_json::Value,
}

/// Kind-specific payload accessors.
pub mod payload {
    use super::*;

    pub fn payout(payout_block: Height) -> serde_json::Value {
        serde_json::json!({ "payout_block": payout_block })
    }

    pub fn payout_block(payload: &serde_json::Value) -> Option<Height> {
        payload.get("payout_block").and_then(json_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn payout_payload_round_trips() {
        let task = NewTask::era(7, 1000);
        assert_eq!(task.entity_id, 7);
        assert_eq!(payload::payout_block(&task.payload), Some(1000));
    }

    #[test]
    fn message_serializes_kind_as_snake_case() {
        let msg = TaskMessage {
            kind: TaskKind::BlockBalance,
            entity_id: 5,
            dedup_token: "t".into(),
            payload: serde_json::json!({}),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "block_balance");
    }
}
