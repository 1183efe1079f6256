use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One leader wallet's quality metrics from the scoring service, plus the
/// capital share assigned by the allocator. The score itself is consumed as
/// input; this service never computes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletMetric {
    pub wallet_id: String,
    /// Ranked decision score; higher is better.
    pub decision_score: f64,
    /// Capital the leader wallet trades against, used as the sizing baseline.
    #[serde(default)]
    pub capital_required: Option<f64>,
    /// Quality gate computed upstream.
    #[serde(default)]
    pub passes_filter: bool,
    /// Filled by the allocator; in [0, 1].
    #[serde(default)]
    pub capital_share: f64,
}

/// Database row for copy_allocations — the mirrored "active distribution"
/// of current winners, kept for observability. The ranking itself is
/// recomputed per cycle and never read back from this table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AllocationRow {
    pub id: Uuid,
    pub max_wallets: i32,
    pub wallet_id: String,
    pub allocation_pct: Decimal,
    pub score: Option<f64>,
    pub status: String,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
