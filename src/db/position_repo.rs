use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::CopyPosition;

pub struct NewCopyPosition<'a> {
    pub origin_id: &'a str,
    pub user_id: Uuid,
    pub wallet_id: &'a str,
    pub order_id: &'a str,
    pub symbol: &'a str,
    pub direction: &'a str,
    pub leverage: Decimal,
    pub notional: Decimal,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

/// Persist a freshly opened copy position. The unique (origin_id, user_id)
/// constraint rejects a second row for the same pair.
pub async fn insert(pool: &PgPool, new: NewCopyPosition<'_>) -> anyhow::Result<CopyPosition> {
    let position = sqlx::query_as::<_, CopyPosition>(
        r#"
        INSERT INTO copy_positions (
            origin_id, user_id, wallet_id, order_id, symbol, direction,
            leverage, notional, quantity, entry_price, opened_at, is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, TRUE)
        RETURNING *
        "#,
    )
    .bind(new.origin_id)
    .bind(new.user_id)
    .bind(new.wallet_id)
    .bind(new.order_id)
    .bind(new.symbol)
    .bind(new.direction)
    .bind(new.leverage)
    .bind(new.notional)
    .bind(new.quantity)
    .bind(new.entry_price)
    .bind(new.opened_at)
    .fetch_one(pool)
    .await?;

    Ok(position)
}

pub async fn find_active(
    pool: &PgPool,
    origin_id: &str,
    user_id: Uuid,
) -> anyhow::Result<Option<CopyPosition>> {
    let position = sqlx::query_as::<_, CopyPosition>(
        r#"
        SELECT * FROM copy_positions
        WHERE origin_id = $1 AND user_id = $2 AND is_active
        LIMIT 1
        "#,
    )
    .bind(origin_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(position)
}

pub async fn exists(pool: &PgPool, origin_id: &str, user_id: Uuid) -> anyhow::Result<bool> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM copy_positions WHERE origin_id = $1 AND user_id = $2)",
    )
    .bind(origin_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Flip a position closed, recording exchange-reported close price and time.
pub async fn mark_closed(
    pool: &PgPool,
    id: Uuid,
    close_price: Decimal,
    closed_at: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE copy_positions
        SET close_price = $2,
            closed_at = $3,
            is_active = FALSE,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(close_price)
    .bind(closed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Margin currently committed by active copy positions for (user, wallet):
/// Σ(notional / leverage) × (1 + safety buffer). Cross-replica source of
/// truth for budget admission; always read under the distributed lock.
pub async fn sum_buffered_margin_active(
    pool: &PgPool,
    user_id: Uuid,
    wallet_id: &str,
    safety_buffer: Decimal,
) -> anyhow::Result<Decimal> {
    let row: (Option<Decimal>,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM((notional / NULLIF(leverage, 0)) * (1 + $3)), 0)
        FROM copy_positions
        WHERE user_id = $1
          AND wallet_id = $2
          AND is_active
        "#,
    )
    .bind(user_id)
    .bind(wallet_id)
    .bind(safety_buffer)
    .fetch_one(pool)
    .await?;

    Ok(row.0.unwrap_or(Decimal::ZERO))
}

/// All currently active copy positions, newest first.
pub async fn get_active(pool: &PgPool) -> anyhow::Result<Vec<CopyPosition>> {
    let positions = sqlx::query_as::<_, CopyPosition>(
        "SELECT * FROM copy_positions WHERE is_active ORDER BY opened_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(positions)
}
