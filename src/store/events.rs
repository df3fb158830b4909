use tokio_postgres::Transaction;

use crate::core::types::EventRecord;
use crate::core::types::Height;

pub async fn insert_many(
    pgtx: &Transaction<'_>,
    events: &[EventRecord],
) -> Result<(), tokio_postgres::Error> {
    let stmt = pgtx
        .prepare(
            "insert into subwatch.events (height, idx, section, method, data, raw)
            values ($1, $2, $3, $4, $5, $6);",
        )
        .await?;
    for event in events {
        pgtx.execute(
            &stmt,
            &[
                &event.height,
                &event.idx,
                &event.section,
                &event.method,
                &event.data,
                &event.raw,
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
    pgtx.execute("delete from subwatch.events where height = $1;", &[&height])
        .await?;
    Ok(())
}
