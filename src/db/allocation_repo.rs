use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use sqlx::PgPool;

use crate::models::{AllocationRow, WalletMetric};

/// Mirror the current allocation winners into copy_allocations: upsert an
/// ACTIVE row per winner, close active rows whose wallet dropped out. The
/// table is observability only; the ranking is recomputed every cycle.
pub async fn sync_distribution(
    pool: &PgPool,
    max_wallets: i32,
    winners: &[WalletMetric],
) -> anyhow::Result<()> {
    if max_wallets <= 0 || winners.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    let mut kept: Vec<String> = Vec::with_capacity(winners.len());

    for metric in winners {
        if metric.capital_share <= 0.0 {
            continue;
        }
        let pct = Decimal::from_f64(metric.capital_share).unwrap_or(Decimal::ZERO);

        sqlx::query(
            r#"
            INSERT INTO copy_allocations (max_wallets, wallet_id, allocation_pct, score, status, ends_at)
            VALUES ($1, $2, $3, $4, 'ACTIVE', NULL)
            ON CONFLICT (max_wallets, wallet_id) DO UPDATE
                SET allocation_pct = EXCLUDED.allocation_pct,
                    score = EXCLUDED.score,
                    status = 'ACTIVE',
                    ends_at = NULL,
                    updated_at = NOW()
            "#,
        )
        .bind(max_wallets)
        .bind(&metric.wallet_id)
        .bind(pct)
        .bind(metric.decision_score)
        .execute(&mut *tx)
        .await?;

        kept.push(metric.wallet_id.clone());
    }

    sqlx::query(
        r#"
        UPDATE copy_allocations
        SET status = 'CLOSED',
            ends_at = NOW(),
            updated_at = NOW()
        WHERE max_wallets = $1
          AND ends_at IS NULL
          AND wallet_id <> ALL($2)
        "#,
    )
    .bind(max_wallets)
    .bind(&kept)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn get_active_distribution(
    pool: &PgPool,
    max_wallets: i32,
) -> anyhow::Result<Vec<AllocationRow>> {
    let rows = sqlx::query_as::<_, AllocationRow>(
        r#"
        SELECT * FROM copy_allocations
        WHERE max_wallets = $1 AND ends_at IS NULL
        ORDER BY allocation_pct DESC
        "#,
    )
    .bind(max_wallets)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
