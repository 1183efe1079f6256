use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::db::{advisory_lock, position_repo};
use crate::db::position_repo::NewCopyPosition;
use crate::errors::EngineError;
use crate::exchange::client::ExchangeClient;
use crate::exchange::rules::SymbolRules;
use crate::exchange::symbol_cache::SymbolRulesCache;
use crate::exchange::types::{OrderRequest, ValidatedOrder};
use crate::models::{Follower, LeaderOperation};
use crate::wallets::WalletMetricsService;

use super::idempotency;
use super::ledger::MarginLedger;
use super::sizer::{self, PreparedOrder, SizerConfig};

/// Mirrors one leader operation onto one follower account. All mutating
/// steps for a (user, wallet) pair run under the pair's advisory lock so
/// that admission checks and position writes serialize across replicas.
#[derive(Clone)]
pub struct CopyExecutor {
    pool: PgPool,
    exchange: ExchangeClient,
    symbols: Arc<SymbolRulesCache>,
    wallets: Arc<WalletMetricsService>,
    ledger: MarginLedger,
    sizer: SizerConfig,
    lock_max_wait: Duration,
}

impl CopyExecutor {
    pub fn new(
        pool: PgPool,
        exchange: ExchangeClient,
        symbols: Arc<SymbolRulesCache>,
        wallets: Arc<WalletMetricsService>,
        ledger: MarginLedger,
        sizer: SizerConfig,
        lock_max_wait: Duration,
    ) -> Self {
        Self {
            pool,
            exchange,
            symbols,
            wallets,
            ledger,
            sizer,
            lock_max_wait,
        }
    }

    /// Open the follower's mirrored position for a leader open.
    pub async fn execute_open(
        &self,
        follower: &Follower,
        operation: &LeaderOperation,
    ) -> Result<(), EngineError> {
        let origin_id = operation.id.to_string();

        // Replays of an already-mirrored open are a no-op, not an error.
        if position_repo::exists(&self.pool, &origin_id, follower.id).await? {
            tracing::info!(
                origin_id = %origin_id,
                user_id = %follower.id,
                "Position already mirrored; nothing to do"
            );
            return Ok(());
        }

        let metric = self
            .wallets
            .metric_for(follower.max_wallets, &operation.account_id)
            .await?
            .ok_or_else(|| {
                EngineError::skip(format!(
                    "wallet_not_allocated wallet={}",
                    operation.account_id
                ))
            })?;

        let info = self
            .symbols
            .get(&self.exchange, &follower.api_key, &operation.symbol)
            .await?
            .ok_or_else(|| {
                EngineError::skip(format!("unknown_symbol symbol={}", operation.symbol))
            })?;
        let rules = SymbolRules::from_symbol(&info);

        let prepared = match sizer::prepare_open(operation, follower, &metric, &rules, &self.sizer)
        {
            Ok(prepared) => prepared,
            Err(reject) => {
                tracing::info!(
                    origin_id = %origin_id,
                    user_id = %follower.id,
                    wallet_id = %metric.wallet_id,
                    reason = %reject,
                    "Open rejected by sizing"
                );
                return Err(EngineError::skip(format!("sizing_reject: {reject}")));
            }
        };

        let lock_key = format!("{}:{}", follower.id, metric.wallet_id);
        advisory_lock::with_lock(&self.pool, &lock_key, self.lock_max_wait, || async {
            let admitted = self
                .ledger
                .admit(
                    follower.id,
                    &metric.wallet_id,
                    prepared.margin_required,
                    prepared.wallet_budget,
                )
                .await?;
            if !admitted {
                return Err(EngineError::skip(format!(
                    "margin_budget_exhausted wallet={}",
                    metric.wallet_id
                )));
            }

            self.place_and_persist(&origin_id, follower, operation, &metric.wallet_id, &prepared)
                .await
        })
        .await
    }

    async fn place_and_persist(
        &self,
        origin_id: &str,
        follower: &Follower,
        operation: &LeaderOperation,
        wallet_id: &str,
        prepared: &PreparedOrder,
    ) -> Result<(), EngineError> {
        let fill = self
            .exchange
            .open_order(&follower.api_key, &follower.api_secret, &prepared.request)
            .await?;

        tracing::info!(
            origin_id = %origin_id,
            user_id = %follower.id,
            wallet_id,
            order_id = fill.order_id,
            quantity = %fill.executed_qty,
            avg_price = %fill.avg_price,
            "Opened mirrored position"
        );
        metrics::counter!("copy_orders_opened_total").increment(1);

        let persisted = position_repo::insert(
            &self.pool,
            NewCopyPosition {
                origin_id,
                user_id: follower.id,
                wallet_id,
                order_id: &fill.order_id.to_string(),
                symbol: &fill.symbol,
                direction: &operation.side.to_string(),
                leverage: Decimal::from(prepared.leverage),
                notional: fill.avg_price * fill.executed_qty,
                quantity: fill.executed_qty,
                entry_price: fill.avg_price,
                opened_at: fill_time(&fill),
            },
        )
        .await;

        if let Err(persist_err) = persisted {
            self.compensate(origin_id, follower, operation, wallet_id, &fill)
                .await;
            return Err(EngineError::Other(
                persist_err.context("persisting mirrored position after fill"),
            ));
        }

        Ok(())
    }

    /// A fill exists on the exchange but the position row could not be
    /// written, so no later close job will ever reference it. Undo the fill
    /// with a reduce-only close for the executed quantity.
    async fn compensate(
        &self,
        origin_id: &str,
        follower: &Follower,
        operation: &LeaderOperation,
        wallet_id: &str,
        fill: &ValidatedOrder,
    ) {
        metrics::counter!("copy_compensations_total").increment(1);

        let request = OrderRequest::market(
            fill.symbol.clone(),
            operation.side.exit_side(),
            operation.side,
            fill.executed_qty,
            follower.leverage.max(1),
            true,
            idempotency::close_client_order_id(origin_id, &follower.id.to_string(), wallet_id),
        );

        match self
            .exchange
            .close_order(&follower.api_key, &follower.api_secret, &request)
            .await
        {
            Ok(undo) => {
                tracing::warn!(
                    origin_id = %origin_id,
                    user_id = %follower.id,
                    wallet_id,
                    order_id = undo.order_id,
                    quantity = %fill.executed_qty,
                    "Persistence failed after fill; position closed back out"
                );
            }
            Err(e) => {
                // Orphaned exchange position with no row to track it.
                // Requires operator reconciliation against the exchange.
                metrics::counter!("copy_compensation_failures_total").increment(1);
                tracing::error!(
                    origin_id = %origin_id,
                    user_id = %follower.id,
                    wallet_id,
                    symbol = %fill.symbol,
                    quantity = %fill.executed_qty,
                    error = %e,
                    "COMPENSATION FAILED: untracked position left on exchange"
                );
            }
        }
    }

    /// Close the follower's mirrored position for a leader close.
    pub async fn execute_close(
        &self,
        follower: &Follower,
        operation: &LeaderOperation,
    ) -> Result<(), EngineError> {
        let origin_id = operation.id.to_string();

        let position = position_repo::find_active(&self.pool, &origin_id, follower.id)
            .await?
            .ok_or_else(|| {
                // The open may have been skipped (budget, sizing) or already
                // closed by a replayed job.
                EngineError::skip(format!("no_active_position origin={origin_id}"))
            })?;

        let request = sizer::build_close_request(&position, follower)
            .map_err(|reject| EngineError::skip(format!("close_reject: {reject}")))?;

        let lock_key = format!("{}:{}", follower.id, position.wallet_id);
        advisory_lock::with_lock(&self.pool, &lock_key, self.lock_max_wait, || async {
            let fill = self
                .exchange
                .close_order(&follower.api_key, &follower.api_secret, &request)
                .await?;

            position_repo::mark_closed(&self.pool, position.id, fill.avg_price, fill_time(&fill))
                .await?;

            tracing::info!(
                origin_id = %origin_id,
                user_id = %follower.id,
                wallet_id = %position.wallet_id,
                order_id = fill.order_id,
                close_price = %fill.avg_price,
                "Closed mirrored position"
            );
            metrics::counter!("copy_orders_closed_total").increment(1);

            Ok(())
        })
        .await
    }
}

fn fill_time(fill: &ValidatedOrder) -> DateTime<Utc> {
    fill.update_time_ms
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}
