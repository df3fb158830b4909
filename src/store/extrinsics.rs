use tokio_postgres::Transaction;

use crate::core::types::balance_to_decimal;
use crate::core::types::ExtrinsicRecord;
use crate::core::types::Height;

pub async fn insert_many(
    pgtx: &Transaction<'_>,
    extrinsics: &[ExtrinsicRecord],
) -> Result<(), tokio_postgres::Error> {
    let stmt = pgtx
        .prepare(
            "insert into subwatch.extrinsics (
                height, path, section, method, signer, success,
                nonce, tip, ref_events, call
            )
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10);",
        )
        .await?;
    for ext in extrinsics {
        let tip = ext.tip.map(balance_to_decimal);
        pgtx.execute(
            &stmt,
            &[
                &ext.height,
                &ext.path,
                &ext.section,
                &ext.method,
                &ext.signer,
                &ext.success,
                &ext.nonce,
                &tip,
                &ext.ref_events,
                &ext.call,
            ],
        )
        .await?;
    }
    Ok(())
}

pub async fn delete_at(
    pgtx: &Transaction<'_>,
    height: Height,
) -> Result<(), tokio_postgres::Error> {
    pgtx.execute(
        "delete from subwatch.extrinsics where height = $1;",
        &[&height],
    )
    .await?;
    Ok(())
}
