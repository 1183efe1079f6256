use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{PositionSide, Side};

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: String,
    pub position_side: PositionSide,
    pub quantity: String,
    pub leverage: i32,
    pub reduce_only: bool,
    /// Deterministic idempotency key; exchange-side retries never
    /// double-execute.
    pub client_order_id: String,
}

impl OrderRequest {
    pub fn market(
        symbol: impl Into<String>,
        side: Side,
        position_side: PositionSide,
        quantity: Decimal,
        leverage: i32,
        reduce_only: bool,
        client_order_id: String,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: "MARKET".into(),
            position_side,
            quantity: quantity.normalize().to_string(),
            leverage,
            reduce_only,
            client_order_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub avg_price: Option<Decimal>,
    #[serde(default)]
    pub orig_qty: Option<Decimal>,
    #[serde(default)]
    pub executed_qty: Option<Decimal>,
    #[serde(default)]
    pub position_side: Option<String>,
    #[serde(default)]
    pub update_time: Option<i64>,
}

/// A fully validated order fill: every field the bookkeeping needs, present
/// and positive. Built from `OrderResponse` by the client.
#[derive(Debug, Clone)]
pub struct ValidatedOrder {
    pub order_id: i64,
    pub symbol: String,
    pub avg_price: Decimal,
    pub quantity: Decimal,
    pub executed_qty: Decimal,
    pub position_side: Option<String>,
    pub update_time_ms: Option<i64>,
}

// ---------------------------------------------------------------------------
// Symbol metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub quantity_precision: Option<u32>,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolFilter {
    pub filter_type: String,
    #[serde(default)]
    pub step_size: Option<Decimal>,
    #[serde(default)]
    pub min_qty: Option<Decimal>,
    #[serde(default)]
    pub notional: Option<Decimal>,
}

impl SymbolInfo {
    fn filter(&self, kind: &str) -> Option<&SymbolFilter> {
        self.filters.iter().find(|f| f.filter_type == kind)
    }

    pub fn lot_size(&self) -> Option<&SymbolFilter> {
        self.filter("LOT_SIZE").or_else(|| self.filter("MARKET_LOT_SIZE"))
    }

    pub fn min_notional(&self) -> Option<Decimal> {
        self.filter("MIN_NOTIONAL")
            .or_else(|| self.filter("NOTIONAL"))
            .and_then(|f| f.notional)
    }
}
