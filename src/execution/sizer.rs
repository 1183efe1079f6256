use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::exchange::rules::{self, SymbolRules};
use crate::exchange::types::OrderRequest;
use crate::models::{CopyPosition, Follower, LeaderOperation, Side, WalletMetric};

use super::idempotency;

/// Baseline leader capital assumed when the scoring service reports none.
fn default_base_capital() -> Decimal {
    Decimal::from(1_000)
}

#[derive(Debug, Clone)]
pub struct SizerConfig {
    /// Haircut applied to the notional ceiling and added to margin cost.
    pub safety_buffer: Decimal,
    /// Upper bound on the leader trade fraction (≤ 1).
    pub fraction_cap: Decimal,
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            safety_buffer: Decimal::new(5, 2),
            fraction_cap: Decimal::ONE,
        }
    }
}

/// Sizing rejections are decided synchronously and logged, never retried:
/// re-running the same inputs cannot produce a different answer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SizingReject {
    #[error("invalid capital share for wallet {0}")]
    InvalidCapitalShare(String),

    #[error("wallet budget is not positive")]
    EmptyBudget,

    #[error("leader trade size is not positive")]
    InvalidLeaderSize,

    #[error("trade fraction is not positive")]
    ZeroTradeFraction,

    #[error("entry price is not positive")]
    InvalidEntryPrice,

    #[error("blank symbol")]
    BlankSymbol,

    #[error("final notional below exchange minimum within the wallet budget")]
    BelowMinNotional,
}

/// An exchange-ready open order plus the margin bookkeeping that justifies it.
#[derive(Debug, Clone)]
pub struct PreparedOrder {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub leverage: i32,
    pub notional: Decimal,
    /// Margin this order commits, safety buffer included.
    pub margin_required: Decimal,
    /// The follower's budget for this wallet this cycle.
    pub wallet_budget: Decimal,
    pub request: OrderRequest,
}

/// Size a follower's mirrored open.
///
/// wallet budget = follower capital × wallet capital share;
/// trade fraction = clamp(leader size / baseline capital, 0, fraction cap);
/// margin for this trade = fraction × budget;
/// notional ceiling = margin × leverage × (1 − safety buffer);
/// the rule engine then fits a compliant quantity under that ceiling.
pub fn prepare_open(
    operation: &LeaderOperation,
    follower: &Follower,
    metric: &WalletMetric,
    rules: &SymbolRules,
    cfg: &SizerConfig,
) -> Result<PreparedOrder, SizingReject> {
    if operation.symbol.trim().is_empty() {
        return Err(SizingReject::BlankSymbol);
    }
    if operation.entry_price <= Decimal::ZERO {
        return Err(SizingReject::InvalidEntryPrice);
    }
    if operation.size <= Decimal::ZERO {
        return Err(SizingReject::InvalidLeaderSize);
    }

    let share = metric.capital_share;
    if !share.is_finite() || share <= 0.0 || share > 1.0 {
        return Err(SizingReject::InvalidCapitalShare(metric.wallet_id.clone()));
    }
    let share =
        Decimal::from_f64(share).ok_or_else(|| SizingReject::InvalidCapitalShare(metric.wallet_id.clone()))?;

    let wallet_budget = follower.capital * share;
    if wallet_budget <= Decimal::ZERO {
        return Err(SizingReject::EmptyBudget);
    }

    let base_capital = metric
        .capital_required
        .filter(|c| *c > 0.0)
        .and_then(Decimal::from_f64)
        .unwrap_or_else(default_base_capital);

    let fraction_cap = cfg.fraction_cap.min(Decimal::ONE);
    let trade_fraction = (operation.size / base_capital)
        .max(Decimal::ZERO)
        .min(fraction_cap);
    if trade_fraction <= Decimal::ZERO {
        return Err(SizingReject::ZeroTradeFraction);
    }

    let margin_this_trade = trade_fraction * wallet_budget;
    let leverage = follower.leverage.max(1);
    let notional_ceiling =
        margin_this_trade * Decimal::from(leverage) * (Decimal::ONE - cfg.safety_buffer);

    let raw_quantity = (notional_ceiling / operation.entry_price).trunc_with_scale(6);
    let quantity = rules::adjust_quantity(rules, raw_quantity, operation.entry_price, notional_ceiling);
    if quantity <= Decimal::ZERO {
        return Err(SizingReject::BelowMinNotional);
    }

    let notional = quantity * operation.entry_price;
    let margin_required =
        notional / Decimal::from(leverage) * (Decimal::ONE + cfg.safety_buffer);

    let client_order_id = idempotency::open_client_order_id(
        &operation.id.to_string(),
        &follower.id.to_string(),
        &metric.wallet_id,
    );

    let request = OrderRequest::market(
        operation.symbol.clone(),
        operation.side.entry_side(),
        operation.side,
        quantity,
        leverage,
        false,
        client_order_id,
    );

    Ok(PreparedOrder {
        symbol: operation.symbol.clone(),
        side: operation.side.entry_side(),
        quantity,
        entry_price: operation.entry_price,
        leverage,
        notional,
        margin_required,
        wallet_budget,
        request,
    })
}

/// Build the reduce-only close mirroring a stored position: inverted side,
/// the exact stored quantity, deterministic close idempotency key.
pub fn build_close_request(
    position: &CopyPosition,
    follower: &Follower,
) -> Result<OrderRequest, SizingReject> {
    let direction = position
        .direction_kind()
        .ok_or(SizingReject::BlankSymbol)?;

    let client_order_id = idempotency::close_client_order_id(
        &position.origin_id,
        &position.user_id.to_string(),
        &position.wallet_id,
    );

    Ok(OrderRequest::market(
        position.symbol.clone(),
        direction.exit_side(),
        direction,
        position.quantity,
        follower.leverage.max(1),
        true,
        client_order_id,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionSide;
    use chrono::Utc;
    use uuid::Uuid;

    fn follower(capital: i64, leverage: i32) -> Follower {
        Follower {
            id: Uuid::new_v4(),
            name: "test".into(),
            capital: Decimal::from(capital),
            leverage,
            max_wallets: 3,
            api_key: "key".into(),
            api_secret: "secret".into(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn metric(share: f64) -> WalletMetric {
        WalletMetric {
            wallet_id: "wallet-1".into(),
            decision_score: 80.0,
            capital_required: Some(1_000.0),
            passes_filter: true,
            capital_share: share,
        }
    }

    fn operation(size: i64, entry_price: i64, side: PositionSide) -> LeaderOperation {
        LeaderOperation {
            id: Uuid::new_v4(),
            account_id: "wallet-1".into(),
            symbol: "BTCUSDT".into(),
            side,
            size: Decimal::from(size),
            entry_price: Decimal::from(entry_price),
            close_price: None,
            created_at: Utc::now(),
            closed_at: None,
            active: true,
        }
    }

    fn btc_rules() -> SymbolRules {
        SymbolRules {
            step_size: Some(Decimal::new(1, 3)),
            min_qty: Decimal::new(1, 3),
            min_notional: Decimal::from(7),
            quantity_precision: Some(3),
        }
    }

    #[test]
    fn test_worked_open_example() {
        // Leader opens LONG BTCUSDT size=500 at 50000 against baseline 1000
        // (fraction 0.5); follower capital 2000, wallet share 0.3 → budget
        // 600, margin 300, leverage 5 → ceiling 1500 × 0.95 = 1425.
        let prepared = prepare_open(
            &operation(500, 50_000, PositionSide::Long),
            &follower(2_000, 5),
            &metric(0.3),
            &btc_rules(),
            &SizerConfig::default(),
        )
        .expect("should size");

        assert_eq!(prepared.wallet_budget, Decimal::from(600));
        // 1425 / 50000 = 0.0285, floored to the 0.001 step.
        assert_eq!(prepared.quantity, Decimal::new(28, 3));
        assert_eq!(prepared.side, Side::Buy);
        assert_eq!(prepared.leverage, 5);
        assert!(!prepared.request.reduce_only);
        assert_eq!(prepared.request.position_side, PositionSide::Long);
        assert!(prepared.request.client_order_id.starts_with("cpO_"));
        assert!(prepared.notional <= Decimal::from(1_425));
    }

    #[test]
    fn test_short_opens_with_sell() {
        let prepared = prepare_open(
            &operation(500, 50_000, PositionSide::Short),
            &follower(2_000, 5),
            &metric(0.3),
            &btc_rules(),
            &SizerConfig::default(),
        )
        .expect("should size");

        assert_eq!(prepared.side, Side::Sell);
        assert_eq!(prepared.request.position_side, PositionSide::Short);
    }

    #[test]
    fn test_fraction_clamped_to_cap() {
        // Leader size 5000 against baseline 1000 would be fraction 5;
        // clamped to 1, so margin equals the whole wallet budget.
        let prepared = prepare_open(
            &operation(5_000, 50_000, PositionSide::Long),
            &follower(2_000, 5),
            &metric(0.3),
            &btc_rules(),
            &SizerConfig::default(),
        )
        .expect("should size");

        let ceiling = Decimal::from(600 * 5) * Decimal::new(95, 2);
        assert!(prepared.notional <= ceiling);
    }

    #[test]
    fn test_rejects() {
        let cfg = SizerConfig::default();
        let rules = btc_rules();

        let mut op = operation(500, 50_000, PositionSide::Long);
        op.symbol = "  ".into();
        assert_eq!(
            prepare_open(&op, &follower(2_000, 5), &metric(0.3), &rules, &cfg).unwrap_err(),
            SizingReject::BlankSymbol
        );

        let mut op = operation(500, 50_000, PositionSide::Long);
        op.entry_price = Decimal::ZERO;
        assert_eq!(
            prepare_open(&op, &follower(2_000, 5), &metric(0.3), &rules, &cfg).unwrap_err(),
            SizingReject::InvalidEntryPrice
        );

        let mut op = operation(500, 50_000, PositionSide::Long);
        op.size = Decimal::ZERO;
        assert_eq!(
            prepare_open(&op, &follower(2_000, 5), &metric(0.3), &rules, &cfg).unwrap_err(),
            SizingReject::InvalidLeaderSize
        );

        assert_eq!(
            prepare_open(
                &operation(500, 50_000, PositionSide::Long),
                &follower(2_000, 5),
                &metric(0.0),
                &rules,
                &cfg
            )
            .unwrap_err(),
            SizingReject::InvalidCapitalShare("wallet-1".into())
        );
    }

    #[test]
    fn test_tiny_budget_rejected_below_min_notional() {
        // Budget so small the minimum notional cannot be met within it.
        let result = prepare_open(
            &operation(10, 50_000, PositionSide::Long),
            &follower(100, 1),
            &metric(0.01),
            &btc_rules(),
            &SizerConfig::default(),
        );
        assert_eq!(result.unwrap_err(), SizingReject::BelowMinNotional);
    }

    #[test]
    fn test_close_request_inverts_stored_direction() {
        let position = CopyPosition {
            id: Uuid::new_v4(),
            origin_id: "origin-1".into(),
            user_id: Uuid::new_v4(),
            wallet_id: "wallet-1".into(),
            order_id: "42".into(),
            symbol: "BTCUSDT".into(),
            direction: "LONG".into(),
            leverage: Decimal::from(5),
            notional: Decimal::from(1_400),
            quantity: Decimal::new(28, 3),
            entry_price: Decimal::from(50_000),
            close_price: None,
            opened_at: Utc::now(),
            closed_at: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let request = build_close_request(&position, &follower(2_000, 5)).expect("should build");
        assert!(request.reduce_only);
        assert_eq!(request.side, Side::Sell);
        assert_eq!(request.position_side, PositionSide::Long);
        assert_eq!(request.quantity, "0.028");
        assert!(request.client_order_id.starts_with("cpC_"));
    }
}
