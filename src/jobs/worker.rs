use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use sqlx::PgPool;
use tokio::sync::Semaphore;

use crate::db::follower_repo::FollowerCache;
use crate::db::job_repo;
use crate::errors::{self, EngineError};
use crate::execution::CopyExecutor;
use crate::models::{CopyJob, ErrorCategory, JobAction, LeaderOperation};

const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 120_000;
const RATE_LIMIT_BASE_MS: u64 = 5_000;
const RATE_LIMIT_CAP_MS: u64 = 300_000;
const MAX_BACKOFF_SHIFT: u32 = 20;

/// The pending gauge is a trend signal; sampling it with a full GROUP BY on
/// every poll would dwarf the claim itself.
const GAUGE_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub max_batch: i64,
    pub max_attempts: i32,
    pub concurrency: usize,
    pub stale_lock_ttl_secs: i64,
}

/// Poll loop claiming due jobs and dispatching them onto a bounded pool.
/// Safe to run on every replica; FOR UPDATE SKIP LOCKED in the claim keeps
/// replicas from stepping on each other.
pub async fn run_worker(
    pool: PgPool,
    followers: Arc<FollowerCache>,
    executor: CopyExecutor,
    cfg: WorkerConfig,
) {
    let worker_id = worker_id();
    let semaphore = Arc::new(Semaphore::new(cfg.concurrency));
    let mut gauge = GaugeSampler::new(GAUGE_SAMPLE_INTERVAL);
    tracing::info!(worker_id = %worker_id, concurrency = cfg.concurrency, "Job worker started");

    loop {
        if gauge.due() {
            refresh_pending_gauge(&pool).await;
        }
        tick(&pool, &followers, &executor, &cfg, &worker_id, &semaphore).await;
        tokio::time::sleep(cfg.poll_interval).await;
    }
}

/// Rate limiter for the periodic gauge refresh.
struct GaugeSampler {
    every: Duration,
    next_at: std::time::Instant,
}

impl GaugeSampler {
    fn new(every: Duration) -> Self {
        Self {
            every,
            next_at: std::time::Instant::now(),
        }
    }

    fn due(&mut self) -> bool {
        let now = std::time::Instant::now();
        if now >= self.next_at {
            self.next_at = now + self.every;
            true
        } else {
            false
        }
    }
}

async fn refresh_pending_gauge(pool: &PgPool) {
    if let Ok(counts) = job_repo::count_by_status(pool).await {
        let pending = counts
            .iter()
            .find(|(status, _)| status == "PENDING")
            .map(|(_, n)| *n)
            .unwrap_or(0);
        metrics::gauge!("copy_jobs_pending").set(pending as f64);
    }
}

async fn tick(
    pool: &PgPool,
    followers: &Arc<FollowerCache>,
    executor: &CopyExecutor,
    cfg: &WorkerConfig,
    worker_id: &str,
    semaphore: &Arc<Semaphore>,
) {
    match job_repo::requeue_stale(pool, cfg.stale_lock_ttl_secs).await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(count = n, "Requeued jobs abandoned by dead workers"),
        Err(e) => tracing::warn!(error = %e, "Stale-job sweep failed"),
    }

    let jobs = match job_repo::claim_batch(pool, worker_id, cfg.max_batch).await {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!(error = %e, "Claiming jobs failed");
            return;
        }
    };

    for job in jobs {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                // Pool saturated and the job never ran; hand it straight
                // back with a short randomized delay.
                let delay = Duration::from_millis(rand::thread_rng().gen_range(250..=1_000));
                let result = job_repo::reschedule(
                    pool,
                    &job,
                    job.attempt,
                    Utc::now() + delay,
                    ErrorCategory::Rejected,
                    "worker saturated",
                )
                .await;
                if let Err(e) = result {
                    tracing::error!(job_id = %job.id, error = %e, "Saturation reschedule failed");
                }
                continue;
            }
        };

        let pool = pool.clone();
        let followers = Arc::clone(followers);
        let executor = executor.clone();
        let max_attempts = cfg.max_attempts;
        tokio::spawn(async move {
            process_job(&pool, &followers, &executor, job, max_attempts).await;
            drop(permit);
        });
    }
}

async fn process_job(
    pool: &PgPool,
    followers: &FollowerCache,
    executor: &CopyExecutor,
    job: CopyJob,
    max_attempts: i32,
) {
    let attempt = job.attempt + 1;

    match run_job(followers, executor, &job).await {
        Ok(()) => {
            if let Err(e) = job_repo::mark_done(pool, &job).await {
                tracing::error!(job_id = %job.id, error = %e, "Marking job done failed");
                return;
            }
            metrics::counter!("copy_jobs_completed_total").increment(1);
        }
        Err(e) => {
            let category = errors::classify(&e);
            let message = errors::safe_message(&e);
            settle_failure(pool, &job, attempt, max_attempts, category, &message).await;
        }
    }
}

/// Decide the failed job's next state from its error category and attempt
/// count. Skips and validation failures are final on the first attempt;
/// everything else retries on the category's backoff schedule until the
/// attempt budget runs out.
async fn settle_failure(
    pool: &PgPool,
    job: &CopyJob,
    attempt: i32,
    max_attempts: i32,
    category: ErrorCategory,
    message: &str,
) {
    let retryable = !matches!(category, ErrorCategory::Skip | ErrorCategory::Validation);

    if retryable && attempt < max_attempts {
        let delay = compute_backoff(category, attempt);
        tracing::warn!(
            job_id = %job.id,
            origin_id = %job.origin_id,
            attempt,
            category = %category,
            delay_ms = delay.as_millis() as u64,
            error = message,
            "Job failed; retrying"
        );
        let result =
            job_repo::reschedule(pool, job, attempt, Utc::now() + delay, category, message).await;
        if let Err(e) = result {
            tracing::error!(job_id = %job.id, error = %e, "Reschedule failed");
            return;
        }
        metrics::counter!("copy_jobs_retried_total").increment(1);
        return;
    }

    if category == ErrorCategory::Skip {
        tracing::info!(
            job_id = %job.id,
            origin_id = %job.origin_id,
            reason = message,
            "Job skipped"
        );
        metrics::counter!("copy_jobs_skipped_total").increment(1);
    } else {
        tracing::error!(
            job_id = %job.id,
            origin_id = %job.origin_id,
            attempt,
            category = %category,
            error = message,
            "Job dead-lettered"
        );
        metrics::counter!("copy_jobs_dead_total").increment(1);
    }

    if let Err(e) = job_repo::mark_dead(pool, job, attempt, category, message).await {
        tracing::error!(job_id = %job.id, error = %e, "Dead-letter transition failed");
    }
}

async fn run_job(
    followers: &FollowerCache,
    executor: &CopyExecutor,
    job: &CopyJob,
) -> Result<(), EngineError> {
    let action = job
        .action_kind()
        .ok_or_else(|| EngineError::skip(format!("unknown_action action={}", job.action)))?;

    let operation: LeaderOperation = serde_json::from_str(&job.payload)
        .map_err(|e| EngineError::skip(format!("bad_payload: {e}")))?;

    let follower = followers
        .find(job.user_id)
        .await?
        .ok_or_else(|| EngineError::skip(format!("follower_missing_or_inactive id={}", job.user_id)))?;

    match action {
        JobAction::Open => executor.execute_open(&follower, &operation).await,
        JobAction::Close => executor.execute_close(&follower, &operation).await,
    }
}

/// Exponential backoff with a 0-15% jitter. Rate limits get a slower, longer
/// schedule than ordinary transient failures.
pub fn compute_backoff(category: ErrorCategory, attempt: i32) -> Duration {
    let (base_ms, cap_ms) = if category.is_rate_limit() {
        (RATE_LIMIT_BASE_MS, RATE_LIMIT_CAP_MS)
    } else {
        (BACKOFF_BASE_MS, BACKOFF_CAP_MS)
    };

    let shift = (attempt.max(1) as u32 - 1).min(MAX_BACKOFF_SHIFT);
    let delay_ms = base_ms.saturating_mul(1u64 << shift).min(cap_ms);
    let jitter_ms = (delay_ms as f64 * rand::thread_rng().gen_range(0.0..0.15)) as u64;

    Duration::from_millis(delay_ms + jitter_ms)
}

fn worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".into());
    format!("{host}-{}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(category: ErrorCategory, attempt: i32) -> (u64, u64) {
        let d = compute_backoff(category, attempt).as_millis() as u64;
        (d, d)
    }

    #[test]
    fn test_backoff_grows_then_caps() {
        let mut previous_floor = 0;
        for attempt in 1..=8 {
            let (d, _) = bounds(ErrorCategory::Transient, attempt);
            let floor = (BACKOFF_BASE_MS << (attempt as u32 - 1)).min(BACKOFF_CAP_MS);
            assert!(d >= floor, "attempt {attempt}: {d} < {floor}");
            assert!(d <= floor + floor * 15 / 100 + 1);
            assert!(floor >= previous_floor);
            previous_floor = floor;
        }

        // Deep attempts stay pinned at the cap (plus jitter).
        let (d, _) = bounds(ErrorCategory::Transient, 50);
        assert!(d >= BACKOFF_CAP_MS);
        assert!(d <= BACKOFF_CAP_MS + BACKOFF_CAP_MS * 15 / 100 + 1);
    }

    #[test]
    fn test_rate_limit_schedule_is_slower() {
        let (transient, _) = bounds(ErrorCategory::Transient, 1);
        let (rate_limited, _) = bounds(ErrorCategory::RateLimit, 1);
        assert!(rate_limited >= RATE_LIMIT_BASE_MS);
        assert!(rate_limited > transient);

        let (deep, _) = bounds(ErrorCategory::RateLimit, 50);
        assert!(deep >= RATE_LIMIT_CAP_MS);
        assert!(deep <= RATE_LIMIT_CAP_MS + RATE_LIMIT_CAP_MS * 15 / 100 + 1);
    }

    #[test]
    fn test_gauge_sampler_throttles_between_intervals() {
        let mut sampler = GaugeSampler::new(Duration::from_secs(3_600));
        assert!(sampler.due());
        assert!(!sampler.due());
        assert!(!sampler.due());

        let mut eager = GaugeSampler::new(Duration::ZERO);
        assert!(eager.due());
        assert!(eager.due());
    }

    #[test]
    fn test_attempt_below_one_treated_as_first() {
        let (d, _) = bounds(ErrorCategory::Transient, 0);
        assert!(d >= BACKOFF_BASE_MS);
        assert!(d <= BACKOFF_BASE_MS + BACKOFF_BASE_MS * 15 / 100 + 1);
    }
}
