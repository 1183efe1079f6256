use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::position_repo;

#[derive(Debug, Clone)]
pub struct MarginLedgerConfig {
    pub safety_buffer: Decimal,
    /// Share of the budget always kept free for fees and slippage.
    pub reserve_pct: Decimal,
    /// Tolerated overshoot above the nominal budget.
    pub hardcap_over_pct: Decimal,
}

impl Default for MarginLedgerConfig {
    fn default() -> Self {
        Self {
            safety_buffer: Decimal::new(5, 2),
            reserve_pct: Decimal::new(5, 2),
            hardcap_over_pct: Decimal::new(10, 2),
        }
    }
}

/// Admit a new trade iff the committed margin plus this trade plus the
/// standing reserve stays within the budget and its tolerated overshoot.
pub fn check_admission(
    used_margin: Decimal,
    margin_required: Decimal,
    wallet_budget: Decimal,
    cfg: &MarginLedgerConfig,
) -> bool {
    if wallet_budget <= Decimal::ZERO || margin_required <= Decimal::ZERO {
        return false;
    }
    used_margin + margin_required + cfg.reserve_pct * wallet_budget
        <= wallet_budget * (Decimal::ONE + cfg.hardcap_over_pct)
}

/// Budget gatekeeper for (user, wallet) margin. The used side is read from
/// copy_positions, so the ledger is consistent across replicas as long as
/// callers hold the per-pair distributed lock from admission through
/// persisting the position row.
#[derive(Clone)]
pub struct MarginLedger {
    pool: PgPool,
    cfg: MarginLedgerConfig,
}

impl MarginLedger {
    pub fn new(pool: PgPool, cfg: MarginLedgerConfig) -> Self {
        Self { pool, cfg }
    }

    pub fn config(&self) -> &MarginLedgerConfig {
        &self.cfg
    }

    pub async fn used_margin(&self, user_id: Uuid, wallet_id: &str) -> anyhow::Result<Decimal> {
        position_repo::sum_buffered_margin_active(
            &self.pool,
            user_id,
            wallet_id,
            self.cfg.safety_buffer,
        )
        .await
    }

    /// Whether `margin_required` fits the wallet budget right now, counting
    /// the persisted active positions.
    pub async fn admit(
        &self,
        user_id: Uuid,
        wallet_id: &str,
        margin_required: Decimal,
        wallet_budget: Decimal,
    ) -> anyhow::Result<bool> {
        let used = self.used_margin(user_id, wallet_id).await?;
        let admitted = check_admission(used, margin_required, wallet_budget, &self.cfg);

        if !admitted {
            tracing::info!(
                user_id = %user_id,
                wallet_id,
                used = %used,
                required = %margin_required,
                budget = %wallet_budget,
                "Margin budget exhausted for wallet"
            );
        }

        Ok(admitted)
    }
}
