mod common;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use copyengine::db::position_repo::{self, NewCopyPosition};
use copyengine::execution::ledger::{MarginLedger, MarginLedgerConfig};

async fn seed_position(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    wallet_id: &str,
    notional: i64,
    leverage: i64,
) -> copyengine::models::CopyPosition {
    position_repo::insert(
        pool,
        NewCopyPosition {
            origin_id: &Uuid::new_v4().to_string(),
            user_id,
            wallet_id,
            order_id: "1001",
            symbol: "BTCUSDT",
            direction: "LONG",
            leverage: Decimal::from(leverage),
            notional: Decimal::from(notional),
            quantity: Decimal::new(28, 3),
            entry_price: Decimal::from(50_000),
            opened_at: Utc::now(),
        },
    )
    .await
    .expect("position insert should succeed")
}

#[tokio::test]
async fn test_used_margin_counts_active_positions_only() {
    let _guard = common::lock().await;
    let pool = common::setup_test_db().await;
    let follower = common::seed_follower(&pool, "alice", 2_000, 5, 3).await;

    seed_position(&pool, follower.id, "wallet-1", 1_000, 5).await;
    let closed = seed_position(&pool, follower.id, "wallet-1", 2_000, 5).await;
    position_repo::mark_closed(&pool, closed.id, Decimal::from(51_000), Utc::now())
        .await
        .expect("close should succeed");
    // Same user, different wallet: not part of this wallet's budget.
    seed_position(&pool, follower.id, "wallet-2", 5_000, 5).await;

    let buffer = Decimal::new(5, 2);
    let used = position_repo::sum_buffered_margin_active(&pool, follower.id, "wallet-1", buffer)
        .await
        .expect("sum should succeed");

    // (1000 / 5) * 1.05
    assert_eq!(used, Decimal::from(210));
}

#[tokio::test]
async fn test_admission_reflects_persisted_positions() {
    let _guard = common::lock().await;
    let pool = common::setup_test_db().await;
    let follower = common::seed_follower(&pool, "bob", 2_000, 5, 3).await;

    let ledger = MarginLedger::new(pool.clone(), MarginLedgerConfig::default());
    let budget = Decimal::from(600);

    // Empty wallet: plenty of room. Reserve 30, hard cap 660.
    assert!(ledger
        .admit(follower.id, "wallet-1", Decimal::from(300), budget)
        .await
        .expect("admit should succeed"));

    // Commit 1500 notional at 5x: used margin becomes 315.
    seed_position(&pool, follower.id, "wallet-1", 1_500, 5).await;

    // 315 + 300 + 30 <= 660 still holds.
    assert!(ledger
        .admit(follower.id, "wallet-1", Decimal::from(300), budget)
        .await
        .expect("admit should succeed"));

    // 315 + 320 + 30 = 665 > 660: refused.
    assert!(!ledger
        .admit(follower.id, "wallet-1", Decimal::from(320), budget)
        .await
        .expect("admit should succeed"));
}
