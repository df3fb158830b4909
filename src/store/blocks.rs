use tokio_postgres::Transaction;

use crate::core::types::BlockRecord;
use crate::core::types::Height;

pub async fn insert(
    pgtx: &Transaction<'_>,
    block: &BlockRecord,
) -> Result<(), tokio_postgres::Error> {
    let sql = "
        insert into subwatch.blocks (
            height, hash, parent_hash, state_root, extrinsics_root,
            digest, author, timestamp, spec_version, era, round
        )
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11);";
    pgtx.execute(
        sql,
        &[
            &block.height,
            &block.hash,
            &block.parent_hash,
            &block.state_root,
            &block.extrinsics_root,
            &block.digest,
            &block.author,
            &block.timestamp,
            &block.spec_version,
            &block.era,
            &block.round,
        ],
    )
    .await?;
    Ok(())
}

/// Clear a height prior to rewriting it (forced reprocessing).
pub async fn delete_at(
    pgtx: &Transaction<'_>,
    height: Height,
) -> Result<(), tokio_postgres::Error> {
    pgtx.execute("delete from subwatch.blocks where height = $1;", &[&height])
        .await?;
    Ok(())
}
