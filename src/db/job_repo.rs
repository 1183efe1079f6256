use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CopyJob, ErrorCategory, JobAction, JobStatus};

/// Idempotent enqueue: the unique (origin_id, user_id, action) constraint
/// makes re-delivered events a no-op. Returns 1 if a row was inserted.
pub async fn insert_ignore(
    pool: &PgPool,
    origin_id: &str,
    user_id: Uuid,
    action: JobAction,
    payload: &str,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO copy_execution_jobs (origin_id, user_id, action, status, payload)
        VALUES ($1, $2, $3, 'PENDING', $4)
        ON CONFLICT (origin_id, user_id, action) DO NOTHING
        "#,
    )
    .bind(origin_id)
    .bind(user_id)
    .bind(action.to_string())
    .bind(payload)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Atomically claim up to `limit` due PENDING jobs for this worker.
///
/// The inner SELECT uses FOR UPDATE SKIP LOCKED so concurrent replicas never
/// claim the same row; the single-statement CTE keeps select-and-flip atomic
/// without a read-then-write window.
pub async fn claim_batch(
    pool: &PgPool,
    worker_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<CopyJob>> {
    if limit <= 0 {
        return Ok(Vec::new());
    }

    let jobs = sqlx::query_as::<_, CopyJob>(
        r#"
        WITH claimable AS (
            SELECT id
            FROM copy_execution_jobs
            WHERE status = 'PENDING'
              AND next_run_at <= NOW()
            ORDER BY next_run_at ASC, id ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        UPDATE copy_execution_jobs j
        SET status = 'PROCESSING',
            locked_at = NOW(),
            locked_by = $1,
            updated_at = NOW()
        FROM claimable
        WHERE j.id = claimable.id
        RETURNING j.*
        "#,
    )
    .bind(worker_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(jobs)
}

/// Terminal or rescheduling transition out of PROCESSING. Clears the lock
/// columns in the same statement.
pub async fn finish(
    pool: &PgPool,
    id: Uuid,
    status: JobStatus,
    attempt: i32,
    next_run_at: DateTime<Utc>,
    category: ErrorCategory,
    message: Option<&str>,
) -> anyhow::Result<()> {
    let error_at: Option<DateTime<Utc>> = match category {
        ErrorCategory::None => None,
        _ => Some(Utc::now()),
    };

    sqlx::query(
        r#"
        UPDATE copy_execution_jobs
        SET status = $2,
            attempt = $3,
            next_run_at = $4,
            locked_at = NULL,
            locked_by = NULL,
            last_error_category = $5,
            last_error_message = $6,
            last_error_at = $7,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status.to_string())
    .bind(attempt)
    .bind(next_run_at)
    .bind(category.to_string())
    .bind(message)
    .bind(error_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn mark_done(pool: &PgPool, job: &CopyJob) -> anyhow::Result<()> {
    finish(
        pool,
        job.id,
        JobStatus::Done,
        job.attempt,
        Utc::now(),
        ErrorCategory::None,
        None,
    )
    .await
}

pub async fn mark_dead(
    pool: &PgPool,
    job: &CopyJob,
    attempt: i32,
    category: ErrorCategory,
    message: &str,
) -> anyhow::Result<()> {
    finish(
        pool,
        job.id,
        JobStatus::Dead,
        attempt,
        Utc::now(),
        category,
        Some(message),
    )
    .await
}

pub async fn reschedule(
    pool: &PgPool,
    job: &CopyJob,
    attempt: i32,
    next_run_at: DateTime<Utc>,
    category: ErrorCategory,
    message: &str,
) -> anyhow::Result<()> {
    finish(
        pool,
        job.id,
        JobStatus::Pending,
        attempt,
        next_run_at,
        category,
        Some(message),
    )
    .await
}

/// Recover jobs abandoned by crashed workers: PROCESSING rows whose lock age
/// exceeds the TTL go back to PENDING. No heartbeats needed.
pub async fn requeue_stale(pool: &PgPool, ttl_secs: i64) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE copy_execution_jobs
        SET status = 'PENDING',
            locked_at = NULL,
            locked_by = NULL,
            updated_at = NOW()
        WHERE status = 'PROCESSING'
          AND locked_at IS NOT NULL
          AND locked_at < NOW() - make_interval(secs => $1)
        "#,
    )
    .bind(ttl_secs as f64)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Job counts per status, for the stats endpoint and the pending gauge.
pub async fn count_by_status(pool: &PgPool) -> anyhow::Result<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM copy_execution_jobs GROUP BY status",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
