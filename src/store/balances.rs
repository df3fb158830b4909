use tokio_postgres::Transaction;

use crate::core::types::balance_to_decimal;
use crate::core::types::AccountId;
use crate::core::types::Balance;
use crate::core::types::Height;

/// Account balance as of one block, for accounts touched by balance
/// events in it.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceRecord {
    pub height: Height,
    pub account: AccountId,
    pub free: Balance,
    pub reserved: Balance,
    pub nonce: i64,
}

pub async fn insert_many(
    pgtx: &Transaction<'_>,
    records: &[BalanceRecord],
) -> Result<(), tokio_postgres::Error> {
    let stmt = pgtx
        .prepare(
            "insert into subwatch.balances (height, account, free, reserved, nonce)
            values ($1, $2, $3, $4, $5);",
        )
        .await?;
    for record in records {
        pgtx.execute(
            &stmt,
            &[
                &record.height,
                &record.account,
                &balance_to_decimal(record.free),
                &balance_to_decimal(record.reserved),
                &record.nonce,
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
        "delete from subwatch.balances where height = $1;",
        &[&height],
    )
    .await?;
    Ok(())
}
