use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PositionSide;

/// Inbound leader-position event. Delivered at-least-once; duplicates and
/// reordering are handled downstream by the job table's unique constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionEvent {
    #[serde(rename = "type")]
    pub kind: PositionEventKind,
    /// Newer producers publish the payload under "position".
    #[serde(alias = "position")]
    pub operation: LeaderOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionEventKind {
    Opened,
    Closed,
}

/// The leader account's position being mirrored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderOperation {
    pub id: Uuid,
    /// Leader wallet the position belongs to.
    pub account_id: String,
    pub symbol: String,
    pub side: PositionSide,
    /// Leader trade size in quote units (USDT).
    pub size: Decimal,
    pub entry_price: Decimal,
    #[serde(default)]
    pub close_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl PositionEvent {
    pub fn origin_id(&self) -> String {
        self.operation.id.to_string()
    }
}
