use std::future::Future;
use std::time::{Duration, Instant};

use sqlx::PgPool;

use crate::errors::EngineError;

const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Run `action` under a cross-replica Postgres advisory lock on `key`.
///
/// The lock is session-bound: it lives on one pooled connection held for the
/// duration of the call, so a crashed process releases it automatically when
/// the session dies. Acquisition polls `pg_try_advisory_lock` until it
/// succeeds or `max_wait` elapses; timing out is a skip, not a failure —
/// the job will be dead-lettered and the contending holder finishes its
/// admission check undisturbed.
pub async fn with_lock<T, F, Fut>(
    pool: &PgPool,
    key: &str,
    max_wait: Duration,
    action: F,
) -> Result<T, EngineError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    if key.trim().is_empty() {
        return Err(EngineError::skip("lock_key_blank"));
    }

    let mut conn = pool.acquire().await?;
    let deadline = Instant::now() + max_wait;

    loop {
        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;

        if acquired {
            break;
        }
        if Instant::now() >= deadline {
            return Err(EngineError::skip(format!("lock_timeout key={key}")));
        }
        tokio::time::sleep(RETRY_DELAY).await;
    }

    let result = action().await;

    // Best-effort unlock; if it fails the session is returned to the pool
    // and Postgres frees the lock when the connection closes.
    let unlocked = sqlx::query("SELECT pg_advisory_unlock(hashtext($1))")
        .bind(key)
        .execute(&mut *conn)
        .await;

    if let Err(e) = unlocked {
        tracing::warn!(key = %key, error = %e, "Advisory unlock failed; closing session");
        let _ = sqlx::Connection::close(conn.detach()).await;
    }

    result
}
