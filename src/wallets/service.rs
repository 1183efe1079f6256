use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::db::allocation_repo;
use crate::models::WalletMetric;

use super::allocator;
use super::client::MetricsClient;

/// TTL-cached view over the scoring service, producing per-cycle capital
/// allocations. Load failures degrade to the stale list (or empty) with a
/// warning — a ranking hiccup must not fail in-flight jobs.
pub struct WalletMetricsService {
    client: MetricsClient,
    pool: PgPool,
    ttl: Duration,
    total_capital_cap: f64,
    per_wallet_cap: f64,
    cache: RwLock<Option<(Instant, Vec<WalletMetric>)>>,
}

impl WalletMetricsService {
    pub fn new(
        client: MetricsClient,
        pool: PgPool,
        ttl: Duration,
        total_capital_cap: f64,
        per_wallet_cap: f64,
    ) -> Self {
        Self {
            client,
            pool,
            ttl,
            total_capital_cap,
            per_wallet_cap,
            cache: RwLock::new(None),
        }
    }

    /// Top `max_wallets` passing wallets with capital shares assigned.
    /// The winners are mirrored into copy_allocations for observability.
    pub async fn ranked(&self, max_wallets: i32) -> anyhow::Result<Vec<WalletMetric>> {
        if max_wallets <= 0 {
            return Ok(Vec::new());
        }

        let base = self.history_cached().await;
        if base.is_empty() {
            tracing::warn!(max_wallets, "Wallet ranking requested but metric history is empty");
            return Ok(Vec::new());
        }

        let mut candidates: Vec<WalletMetric> = base
            .into_iter()
            .filter(|m| m.passes_filter)
            .collect();
        candidates.sort_by(|a, b| {
            b.decision_score
                .partial_cmp(&a.decision_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(max_wallets as usize);

        allocator::allocate(&mut candidates, self.total_capital_cap, self.per_wallet_cap);

        if let Err(e) =
            allocation_repo::sync_distribution(&self.pool, max_wallets, &candidates).await
        {
            tracing::warn!(error = %e, max_wallets, "Failed to mirror active distribution");
        }

        Ok(candidates)
    }

    /// The ranked metric for one wallet, if it is among the current winners.
    pub async fn metric_for(
        &self,
        max_wallets: i32,
        wallet_id: &str,
    ) -> anyhow::Result<Option<WalletMetric>> {
        let ranked = self.ranked(max_wallets).await?;
        Ok(ranked.into_iter().find(|m| m.wallet_id == wallet_id))
    }

    async fn history_cached(&self) -> Vec<WalletMetric> {
        {
            let guard = self.cache.read().await;
            if let Some((loaded_at, metrics)) = guard.as_ref() {
                if loaded_at.elapsed() < self.ttl {
                    return metrics.clone();
                }
            }
        }

        let mut guard = self.cache.write().await;
        if let Some((loaded_at, metrics)) = guard.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                return metrics.clone();
            }
        }

        match self.client.default_history().await {
            Ok(metrics) => {
                *guard = Some((Instant::now(), metrics.clone()));
                metrics
            }
            Err(e) => {
                tracing::warn!(error = %e, "Metric history load failed; serving stale data");
                guard
                    .as_ref()
                    .map(|(_, metrics)| metrics.clone())
                    .unwrap_or_default()
            }
        }
    }
}
