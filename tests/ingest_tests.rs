mod common;

use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use copyengine::db::follower_repo::FollowerCache;
use copyengine::ingest::{self, DedupCache};
use copyengine::models::{LeaderOperation, PositionEvent, PositionEventKind, PositionSide};

fn leader_event(kind: PositionEventKind, id: Uuid) -> PositionEvent {
    PositionEvent {
        kind,
        operation: LeaderOperation {
            id,
            account_id: "wallet-1".into(),
            symbol: "BTCUSDT".into(),
            side: PositionSide::Long,
            size: Decimal::from(500),
            entry_price: Decimal::from(50_000),
            close_price: None,
            created_at: Utc::now(),
            closed_at: None,
            active: true,
        },
    }
}

#[tokio::test]
async fn test_event_fans_out_to_active_followers_once() {
    let _guard = common::lock().await;
    let pool = common::setup_test_db().await;
    common::seed_follower(&pool, "alice", 2_000, 5, 3).await;
    common::seed_follower(&pool, "bob", 5_000, 3, 5).await;
    let inactive = common::seed_follower(&pool, "mallory", 1_000, 2, 3).await;
    sqlx::query("UPDATE followers SET is_active = FALSE WHERE id = $1")
        .bind(inactive.id)
        .execute(&pool)
        .await
        .expect("deactivate should succeed");

    let followers = FollowerCache::new(pool.clone(), Duration::from_secs(0));
    let event = leader_event(PositionEventKind::Opened, Uuid::new_v4());

    let dedup = DedupCache::default();
    let enqueued = ingest::ingest(&pool, &followers, &dedup, &event)
        .await
        .expect("ingest should succeed");
    assert_eq!(enqueued, 2);

    // Burst re-delivery stops at the in-process cache.
    let enqueued = ingest::ingest(&pool, &followers, &dedup, &event)
        .await
        .expect("ingest should succeed");
    assert_eq!(enqueued, 0);

    // Re-delivery after a cache restart stops at the unique constraint.
    let fresh_dedup = DedupCache::default();
    let enqueued = ingest::ingest(&pool, &followers, &fresh_dedup, &event)
        .await
        .expect("ingest should succeed");
    assert_eq!(enqueued, 0);
}

#[tokio::test]
async fn test_failed_fan_out_is_not_suppressed_on_redelivery() {
    let _guard = common::lock().await;
    let pool = common::setup_test_db().await;
    common::seed_follower(&pool, "alice", 2_000, 5, 3).await;

    let followers = FollowerCache::new(pool.clone(), Duration::from_secs(0));
    let dedup = DedupCache::default();
    let event = leader_event(PositionEventKind::Opened, Uuid::new_v4());

    // First delivery hits a database that is down; no job lands.
    let broken_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy("postgres://nobody@127.0.0.1:1/nowhere")
        .expect("lazy pool should build");
    let result = ingest::ingest(&broken_pool, &followers, &dedup, &event).await;
    assert!(result.is_err());

    // At-least-once transport redelivers; the cache must not have recorded
    // the failed attempt, so the jobs are enqueued this time.
    let enqueued = ingest::ingest(&pool, &followers, &dedup, &event)
        .await
        .expect("redelivered ingest should succeed");
    assert_eq!(enqueued, 1);
}

#[tokio::test]
async fn test_open_and_close_are_distinct_jobs() {
    let _guard = common::lock().await;
    let pool = common::setup_test_db().await;
    common::seed_follower(&pool, "alice", 2_000, 5, 3).await;

    let followers = FollowerCache::new(pool.clone(), Duration::from_secs(0));
    let dedup = DedupCache::default();
    let origin = Uuid::new_v4();

    let opened = ingest::ingest(
        &pool,
        &followers,
        &dedup,
        &leader_event(PositionEventKind::Opened, origin),
    )
    .await
    .expect("ingest should succeed");
    let closed = ingest::ingest(
        &pool,
        &followers,
        &dedup,
        &leader_event(PositionEventKind::Closed, origin),
    )
    .await
    .expect("ingest should succeed");

    assert_eq!(opened, 1);
    assert_eq!(closed, 1);

    let actions: Vec<(String,)> = sqlx::query_as(
        "SELECT action FROM copy_execution_jobs WHERE origin_id = $1 ORDER BY action",
    )
    .bind(origin.to_string())
    .fetch_all(&pool)
    .await
    .expect("query should succeed");
    assert_eq!(actions, vec![("CLOSE".to_string(),), ("OPEN".to_string(),)]);
}

#[tokio::test]
async fn test_blank_symbol_is_rejected() {
    let _guard = common::lock().await;
    let pool = common::setup_test_db().await;
    common::seed_follower(&pool, "alice", 2_000, 5, 3).await;

    let followers = FollowerCache::new(pool.clone(), Duration::from_secs(0));
    let dedup = DedupCache::default();
    let mut event = leader_event(PositionEventKind::Opened, Uuid::new_v4());
    event.operation.symbol = "   ".into();

    let result = ingest::ingest(&pool, &followers, &dedup, &event).await;
    assert!(result.is_err());
}
