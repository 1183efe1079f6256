use rust_decimal::{Decimal, RoundingStrategy};

use super::types::SymbolInfo;

/// Quantity rules distilled from a symbol's exchange filters.
#[derive(Debug, Clone, Default)]
pub struct SymbolRules {
    pub step_size: Option<Decimal>,
    pub min_qty: Decimal,
    pub min_notional: Decimal,
    pub quantity_precision: Option<u32>,
}

/// Exchange minimums below this floor are not trusted; the floor also guards
/// symbols that publish no notional filter at all.
pub fn min_notional_floor() -> Decimal {
    Decimal::from(7)
}

impl SymbolRules {
    pub fn from_symbol(info: &SymbolInfo) -> Self {
        let (step_size, min_qty) = match info.lot_size() {
            Some(f) => (f.step_size, f.min_qty.unwrap_or(Decimal::ZERO)),
            None => (None, Decimal::ZERO),
        };

        let min_notional = info
            .min_notional()
            .unwrap_or_else(min_notional_floor)
            .max(min_notional_floor());

        Self {
            step_size,
            min_qty,
            min_notional,
            quantity_precision: info.quantity_precision,
        }
    }
}

/// Turn a desired quantity into an exchange-compliant one, or zero when no
/// compliant quantity fits the caller's notional ceiling.
///
/// Floor to the step multiple, raise to the minimum quantity, truncate to
/// the quantity precision. If the resulting notional sits below the minimum,
/// recompute the smallest step-aligned quantity clearing it — but only when
/// that stays within `notional_ceiling`. Sizing never exceeds the wallet's
/// budget to satisfy an exchange minimum.
pub fn adjust_quantity(
    rules: &SymbolRules,
    raw_quantity: Decimal,
    entry_price: Decimal,
    notional_ceiling: Decimal,
) -> Decimal {
    if raw_quantity <= Decimal::ZERO || entry_price <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let mut quantity = raw_quantity;

    if let Some(step) = rules.step_size.filter(|s| *s > Decimal::ZERO) {
        quantity = (quantity / step).floor() * step;
    }

    if quantity < rules.min_qty {
        quantity = rules.min_qty;
    }

    if let Some(precision) = rules.quantity_precision {
        quantity = quantity.trunc_with_scale(precision);
    }

    if quantity <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    if quantity * entry_price < rules.min_notional {
        quantity = match minimal_compliant_quantity(rules, entry_price) {
            Some(q) if q * entry_price <= notional_ceiling => q,
            _ => return Decimal::ZERO,
        };
    }

    // A min-quantity raise can overshoot the ceiling on its own.
    if quantity * entry_price > notional_ceiling {
        return Decimal::ZERO;
    }

    quantity.normalize()
}

/// Smallest step- and precision-aligned quantity whose notional clears the
/// effective minimum.
fn minimal_compliant_quantity(rules: &SymbolRules, entry_price: Decimal) -> Option<Decimal> {
    let mut needed = rules.min_notional / entry_price;

    if let Some(step) = rules.step_size.filter(|s| *s > Decimal::ZERO) {
        needed = (needed / step).ceil() * step;
    }

    if let Some(precision) = rules.quantity_precision {
        needed = needed.round_dp_with_strategy(precision, RoundingStrategy::AwayFromZero);
    }

    if needed < rules.min_qty {
        needed = rules.min_qty;
    }

    if needed * entry_price < rules.min_notional {
        // Precision coarser than the step can make the minimum unreachable.
        return None;
    }

    Some(needed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
