use reqwest::Client;

use crate::models::WalletMetric;

const DEFAULT_HISTORY_LIMIT: u32 = 60;
const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Read-only client for the wallet-quality scoring service. Scores are
/// consumed as input; this engine never computes them.
#[derive(Debug, Clone)]
pub struct MetricsClient {
    http: Client,
    base_url: String,
}

impl MetricsClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Ranked wallet metrics over the scoring window.
    pub async fn history(&self, limit: u32, window_days: u32) -> anyhow::Result<Vec<WalletMetric>> {
        let url = format!("{}/wallets/metrics", self.base_url);
        let metrics: Vec<WalletMetric> = self
            .http
            .get(&url)
            .query(&[("limit", limit), ("window", window_days)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(metrics)
    }

    pub async fn default_history(&self) -> anyhow::Result<Vec<WalletMetric>> {
        self.history(DEFAULT_HISTORY_LIMIT, DEFAULT_WINDOW_DAYS).await
    }
}
