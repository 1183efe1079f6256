mod common;

use std::collections::HashSet;

use chrono::{Duration, Utc};
use uuid::Uuid;

use copyengine::db::job_repo;
use copyengine::models::{ErrorCategory, JobAction};

#[tokio::test]
async fn test_duplicate_enqueue_inserts_once() {
    let _guard = common::lock().await;
    let pool = common::setup_test_db().await;
    let follower = common::seed_follower(&pool, "alice", 2_000, 5, 3).await;
    let origin = Uuid::new_v4().to_string();

    let first = job_repo::insert_ignore(&pool, &origin, follower.id, JobAction::Open, "{}")
        .await
        .expect("insert should succeed");
    let second = job_repo::insert_ignore(&pool, &origin, follower.id, JobAction::Open, "{}")
        .await
        .expect("insert should succeed");

    assert_eq!(first, 1);
    assert_eq!(second, 0);

    // A CLOSE for the same origin and user is a distinct unit of work.
    let close = job_repo::insert_ignore(&pool, &origin, follower.id, JobAction::Close, "{}")
        .await
        .expect("insert should succeed");
    assert_eq!(close, 1);
}

#[tokio::test]
async fn test_concurrent_claimers_never_share_a_job() {
    let _guard = common::lock().await;
    let pool = common::setup_test_db().await;
    let follower = common::seed_follower(&pool, "bob", 2_000, 5, 3).await;

    for _ in 0..10 {
        let origin = Uuid::new_v4().to_string();
        job_repo::insert_ignore(&pool, &origin, follower.id, JobAction::Open, "{}")
            .await
            .expect("insert should succeed");
    }

    let (a, b) = tokio::join!(
        job_repo::claim_batch(&pool, "worker-a", 6),
        job_repo::claim_batch(&pool, "worker-b", 6),
    );
    let a = a.expect("claim should succeed");
    let b = b.expect("claim should succeed");

    let ids_a: HashSet<Uuid> = a.iter().map(|j| j.id).collect();
    let ids_b: HashSet<Uuid> = b.iter().map(|j| j.id).collect();
    assert!(ids_a.is_disjoint(&ids_b), "a job was claimed twice");
    assert_eq!(ids_a.len() + ids_b.len(), 10);

    for job in a.iter().chain(b.iter()) {
        assert_eq!(job.status, "PROCESSING");
        assert!(job.locked_at.is_some());
        assert!(job.locked_by.is_some());
    }
}

#[tokio::test]
async fn test_requeue_stale_recovers_abandoned_jobs() {
    let _guard = common::lock().await;
    let pool = common::setup_test_db().await;
    let follower = common::seed_follower(&pool, "carol", 2_000, 5, 3).await;
    let origin = Uuid::new_v4().to_string();

    job_repo::insert_ignore(&pool, &origin, follower.id, JobAction::Open, "{}")
        .await
        .expect("insert should succeed");
    let claimed = job_repo::claim_batch(&pool, "worker-crashed", 10)
        .await
        .expect("claim should succeed");
    assert_eq!(claimed.len(), 1);

    // A fresh lock is not stale.
    let requeued = job_repo::requeue_stale(&pool, 600).await.expect("sweep should succeed");
    assert_eq!(requeued, 0);

    // Backdate the lock past the TTL, as if the holder died.
    sqlx::query("UPDATE copy_execution_jobs SET locked_at = NOW() - INTERVAL '20 minutes' WHERE id = $1")
        .bind(claimed[0].id)
        .execute(&pool)
        .await
        .expect("backdate should succeed");

    let requeued = job_repo::requeue_stale(&pool, 600).await.expect("sweep should succeed");
    assert_eq!(requeued, 1);

    let reclaimed = job_repo::claim_batch(&pool, "worker-alive", 10)
        .await
        .expect("claim should succeed");
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, claimed[0].id);
    assert_eq!(reclaimed[0].locked_by.as_deref(), Some("worker-alive"));
}

#[tokio::test]
async fn test_rescheduled_job_waits_for_next_run() {
    let _guard = common::lock().await;
    let pool = common::setup_test_db().await;
    let follower = common::seed_follower(&pool, "dave", 2_000, 5, 3).await;
    let origin = Uuid::new_v4().to_string();

    job_repo::insert_ignore(&pool, &origin, follower.id, JobAction::Open, "{}")
        .await
        .expect("insert should succeed");
    let claimed = job_repo::claim_batch(&pool, "worker-a", 10)
        .await
        .expect("claim should succeed");
    let job = &claimed[0];

    job_repo::reschedule(
        &pool,
        job,
        1,
        Utc::now() + Duration::minutes(2),
        ErrorCategory::Transient,
        "exchange 503",
    )
    .await
    .expect("reschedule should succeed");

    // Not due yet, so nothing to claim.
    let reclaimed = job_repo::claim_batch(&pool, "worker-a", 10)
        .await
        .expect("claim should succeed");
    assert!(reclaimed.is_empty());

    let (status, attempt, category): (String, i32, String) = sqlx::query_as(
        "SELECT status, attempt, last_error_category FROM copy_execution_jobs WHERE id = $1",
    )
    .bind(job.id)
    .fetch_one(&pool)
    .await
    .expect("row should exist");
    assert_eq!(status, "PENDING");
    assert_eq!(attempt, 1);
    assert_eq!(category, "TRANSIENT");
}

#[tokio::test]
async fn test_terminal_jobs_are_never_reclaimed() {
    let _guard = common::lock().await;
    let pool = common::setup_test_db().await;
    let follower = common::seed_follower(&pool, "erin", 2_000, 5, 3).await;

    let done_origin = Uuid::new_v4().to_string();
    let dead_origin = Uuid::new_v4().to_string();
    job_repo::insert_ignore(&pool, &done_origin, follower.id, JobAction::Open, "{}")
        .await
        .expect("insert should succeed");
    job_repo::insert_ignore(&pool, &dead_origin, follower.id, JobAction::Open, "{}")
        .await
        .expect("insert should succeed");

    let claimed = job_repo::claim_batch(&pool, "worker-a", 10)
        .await
        .expect("claim should succeed");
    assert_eq!(claimed.len(), 2);

    for job in &claimed {
        if job.origin_id == done_origin {
            job_repo::mark_done(&pool, job).await.expect("done should succeed");
        } else {
            job_repo::mark_dead(&pool, job, 10, ErrorCategory::Unknown, "gave up")
                .await
                .expect("dead should succeed");
        }
    }

    let reclaimed = job_repo::claim_batch(&pool, "worker-b", 10)
        .await
        .expect("claim should succeed");
    assert!(reclaimed.is_empty());

    let counts = job_repo::count_by_status(&pool).await.expect("counts should succeed");
    let get = |status: &str| {
        counts
            .iter()
            .find(|(s, _)| s == status)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };
    assert_eq!(get("DONE"), 1);
    assert_eq!(get("DEAD"), 1);
}
