use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Follower;

pub async fn get_active_followers(pool: &PgPool) -> anyhow::Result<Vec<Follower>> {
    let followers = sqlx::query_as::<_, Follower>(
        "SELECT * FROM followers WHERE is_active ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(followers)
}

/// TTL cache over the active follower set, shared by ingestion (fan-out) and
/// the worker (per-job resolution). A follower deactivated mid-flight is
/// still caught at execution time and skipped.
pub struct FollowerCache {
    pool: PgPool,
    ttl: Duration,
    inner: RwLock<Option<(Instant, Vec<Follower>)>>,
}

impl FollowerCache {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self {
            pool,
            ttl,
            inner: RwLock::new(None),
        }
    }

    pub async fn get_all(&self) -> anyhow::Result<Vec<Follower>> {
        {
            let guard = self.inner.read().await;
            if let Some((loaded_at, followers)) = guard.as_ref() {
                if loaded_at.elapsed() < self.ttl {
                    return Ok(followers.clone());
                }
            }
        }

        // Double-checked: another task may have refreshed while we waited.
        let mut guard = self.inner.write().await;
        if let Some((loaded_at, followers)) = guard.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                return Ok(followers.clone());
            }
        }

        let followers = get_active_followers(&self.pool).await?;
        *guard = Some((Instant::now(), followers.clone()));
        Ok(followers)
    }

    pub async fn find(&self, user_id: Uuid) -> anyhow::Result<Option<Follower>> {
        let followers = self.get_all().await?;
        Ok(followers.into_iter().find(|f| f.id == user_id))
    }
}
