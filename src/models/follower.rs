use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An account copying the leader's trades.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Follower {
    pub id: Uuid,
    pub name: String,
    /// Total copy capital in USDT; wallet budgets are slices of this.
    pub capital: Decimal,
    pub leverage: i32,
    /// How many leader wallets this follower spreads capital across.
    pub max_wallets: i32,
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
