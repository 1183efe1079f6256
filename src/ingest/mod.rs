use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sqlx::PgPool;

use crate::db::follower_repo::FollowerCache;
use crate::db::job_repo;
use crate::models::{JobAction, PositionEvent, PositionEventKind};

const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(60);

/// In-process suppression of burst re-deliveries. Purely an optimization:
/// the job table's unique constraint is the real idempotency barrier, this
/// just spares it the obvious repeats.
pub struct DedupCache {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL)
    }
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `key` was recorded within the TTL.
    pub fn seen(&self, key: &str) -> bool {
        let seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        matches!(seen.get(key), Some(at) if at.elapsed() < self.ttl)
    }

    /// Record `key`. Expired entries are pruned lazily once the map grows.
    pub fn record(&self, key: &str) {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();

        if seen.len() > 1_024 {
            let ttl = self.ttl;
            seen.retain(|_, at| now.duration_since(*at) < ttl);
        }

        seen.insert(key.to_string(), now);
    }
}

/// Fan a leader position event out to one durable job per active follower.
/// Returns the number of jobs actually inserted; re-delivered events insert
/// nothing and return 0.
pub async fn ingest(
    pool: &PgPool,
    followers: &FollowerCache,
    dedup: &DedupCache,
    event: &PositionEvent,
) -> anyhow::Result<i64> {
    let operation = &event.operation;
    if operation.symbol.trim().is_empty() {
        anyhow::bail!("event has a blank symbol");
    }

    let action = match event.kind {
        PositionEventKind::Opened => JobAction::Open,
        PositionEventKind::Closed => JobAction::Close,
    };
    let origin_id = event.origin_id();

    let dedup_key = format!("{origin_id}:{action}");
    if dedup.seen(&dedup_key) {
        tracing::debug!(origin_id = %origin_id, action = %action, "Duplicate event suppressed");
        return Ok(0);
    }

    let payload = serde_json::to_string(operation)?;
    let mut inserted: i64 = 0;
    for follower in followers.get_all().await? {
        inserted +=
            job_repo::insert_ignore(pool, &origin_id, follower.id, action, &payload).await? as i64;
    }

    // Record only after every job landed. A partial fan-out must stay
    // retryable; the unique constraint absorbs the rows already written.
    dedup.record(&dedup_key);

    if inserted > 0 {
        metrics::counter!("copy_jobs_enqueued_total").increment(inserted as u64);
    }
    tracing::info!(
        origin_id = %origin_id,
        action = %action,
        symbol = %operation.symbol,
        enqueued = inserted,
        "Leader event ingested"
    );

    Ok(inserted)
}
