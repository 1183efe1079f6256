use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::PositionSide;

/// Database row for copy_positions: one mirrored position per
/// (origin operation, follower). At most one active row per pair,
/// enforced by the unique constraint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CopyPosition {
    pub id: Uuid,
    pub origin_id: String,
    pub user_id: Uuid,
    pub wallet_id: String,
    /// Exchange order id returned at open.
    pub order_id: String,
    pub symbol: String,
    pub direction: String,
    pub leverage: Decimal,
    /// quantity × entry price, in USDT.
    pub notional: Decimal,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub close_price: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CopyPosition {
    pub fn direction_kind(&self) -> Option<PositionSide> {
        PositionSide::from_api_str(&self.direction)
    }
}
