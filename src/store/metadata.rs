use tokio_postgres::Transaction;

use crate::core::types::Height;
use crate::core::types::SpecVersion;

/// Chain-level context of one block, captured by dedicated state
/// queries. Feeds the runtime-version audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub height: Height,
    pub spec_version: SpecVersion,
    pub metadata: serde_json::Value,
}

pub async fn upsert(
    pgtx: &Transaction<'_>,
    record: &MetadataRecord,
) -> Result<(), tokio_postgres::Error> {
    let sql = "
        insert into subwatch.block_metadata (height, spec_version, metadata)
        values ($1, $2, $3)
        on conflict (height) do update
        set spec_version = excluded.spec_version
            , metadata = excluded.metadata;";
    pgtx.execute(sql, &[&record.height, &record.spec_version, &record.metadata])
        .await?;
    Ok(())
}
