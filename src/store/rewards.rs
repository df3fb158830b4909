//! Reward rows, written once per era/round inside the handler's
//! transaction. A forced reprocessing clears the entity first.

use tokio_postgres::Transaction;

use crate::core::types::balance_to_decimal;
use crate::rewards::EraPayout;
use crate::rewards::RoundPayout;

pub async fn persist_era(
    pgtx: &Transaction<'_>,
    payout: &EraPayout,
) -> Result<(), tokio_postgres::Error> {
    delete_era(pgtx, payout.era).await?;

    let sql = "
        insert into subwatch.eras (
            era, payout_block, payout_time, total_points, total_stake, total_reward
        )
        values ($1, $2, $3, $4, $5, $6);";
    pgtx.execute(
        sql,
        &[
            &payout.era,
            &payout.payout_block,
            &payout.payout_time,
            &payout.total_points,
            &balance_to_decimal(payout.total_stake),
            &balance_to_decimal(payout.total_reward),
        ],
    )
    .await?;

    let validator_stmt = pgtx
        .prepare(
            "insert into subwatch.validator_rewards (
                era, account, points, commission, own_stake, total_stake, reward
            )
            values ($1, $2, $3, $4, $5, $6, $7);",
        )
        .await?;
    let nominator_stmt = pgtx
        .prepare(
            "insert into subwatch.nominator_rewards (era, validator, account, stake, reward)
            values ($1, $2, $3, $4, $5);",
        )
        .await?;
    for validator in &payout.validators {
        pgtx.execute(
            &validator_stmt,
            &[
                &payout.era,
                &validator.account,
                &validator.points,
                &(validator.commission.parts() as i64),
                &balance_to_decimal(validator.own_stake),
                &balance_to_decimal(validator.total_stake),
                &balance_to_decimal(validator.reward),
            ],
        )
        .await?;
        for nominator in &validator.nominators {
            pgtx.execute(
                &nominator_stmt,
                &[
                    &payout.era,
                    &validator.account,
                    &nominator.account,
                    &balance_to_decimal(nominator.stake),
                    &balance_to_decimal(nominator.reward),
                ],
            )
            .await?;
        }
    }
    Ok(())
}

pub async fn persist_round(
    pgtx: &Transaction<'_>,
    payout: &RoundPayout,
) -> Result<(), tokio_postgres::Error> {
    delete_round(pgtx, payout.round).await?;

    let sql = "
        insert into subwatch.rounds (
            round, payout_block, payout_time, start_block, snapshot_block,
            total_points, total_stake, total_reward
        )
        values ($1, $2, $3, $4, $5, $6, $7, $8);";
    pgtx.execute(
        sql,
        &[
            &payout.round,
            &payout.payout_block,
            &payout.payout_time,
            &payout.start_block,
            &payout.snapshot_block,
            &payout.total_points,
            &balance_to_decimal(payout.total_stake),
            &balance_to_decimal(payout.total_reward),
        ],
    )
    .await?;

    let collator_stmt = pgtx
        .prepare(
            "insert into subwatch.collator_rewards (
                round, account, points, self_bond, total_stake, reward
            )
            values ($1, $2, $3, $4, $5, $6);",
        )
        .await?;
    let delegator_stmt = pgtx
        .prepare(
            "insert into subwatch.delegator_rewards (
                round, collator, account, amount, total_bond, reward
            )
            values ($1, $2, $3, $4, $5, $6);",
        )
        .await?;
    for collator in &payout.collators {
        pgtx.execute(
            &collator_stmt,
            &[
                &payout.round,
                &collator.account,
                &collator.points,
                &balance_to_decimal(collator.self_bond),
                &balance_to_decimal(collator.total_stake),
                &balance_to_decimal(collator.reward),
            ],
        )
        .await?;
        for delegator in &collator.delegators {
            pgtx.execute(
                &delegator_stmt,
                &[
                    &payout.round,
                    &collator.account,
                    &delegator.account,
                    &balance_to_decimal(delegator.amount),
                    &balance_to_decimal(delegator.total_bond),
                    &balance_to_decimal(delegator.reward),
                ],
            )
            .await?;
        }
    }
    Ok(())
}

async fn delete_era(pgtx: &Transaction<'_>, era: i64) -> Result<(), tokio_postgres::Error> {
    pgtx.execute("delete from subwatch.nominator_rewards where era = $1;", &[&era])
        .await?;
    pgtx.execute("delete from subwatch.validator_rewards where era = $1;", &[&era])
        .await?;
    pgtx.execute("delete from subwatch.eras where era = $1;", &[&era])
        .await?;
    Ok(())
}

async fn delete_round(pgtx: &Transaction<'_>, round: i64) -> Result<(), tokio_postgres::Error> {
    pgtx.execute("delete from subwatch.delegator_rewards where round = $1;", &[&round])
        .await?;
    pgtx.execute("delete from subwatch.collator_rewards where round = $1;", &[&round])
        .await?;
    pgtx.execute("delete from subwatch.rounds where round = $1;", &[&round])
        .await?;
    Ok(())
}
