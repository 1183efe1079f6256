use std::sync::Arc;
use std::time::Duration;

use copyengine::api::create_router;
use copyengine::config::AppConfig;
use copyengine::db::follower_repo::FollowerCache;
use copyengine::db::init_pool;
use copyengine::exchange::{ExchangeClient, SymbolRulesCache};
use copyengine::execution::ledger::MarginLedgerConfig;
use copyengine::execution::sizer::SizerConfig;
use copyengine::execution::{CopyExecutor, MarginLedger};
use copyengine::ingest::DedupCache;
use copyengine::jobs::{run_worker, WorkerConfig};
use copyengine::metrics::init_metrics;
use copyengine::wallets::{MetricsClient, WalletMetricsService};
use copyengine::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Connecting to database...");
    let db = init_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database connected, migrations applied");

    let metrics_handle = init_metrics();

    let http = reqwest::Client::new();
    let exchange = ExchangeClient::new(http.clone(), config.exchange_base_url.clone());
    let symbols = Arc::new(SymbolRulesCache::new(Duration::from_secs(
        config.symbol_cache_ttl_secs,
    )));
    let wallets = Arc::new(WalletMetricsService::new(
        MetricsClient::new(http, config.metrics_base_url.clone()),
        db.clone(),
        Duration::from_secs(config.metric_cache_ttl_secs),
        config.total_capital_cap,
        config.per_wallet_cap,
    ));
    let followers = Arc::new(FollowerCache::new(
        db.clone(),
        Duration::from_secs(config.follower_cache_ttl_secs),
    ));
    let dedup = Arc::new(DedupCache::default());

    let ledger = MarginLedger::new(
        db.clone(),
        MarginLedgerConfig {
            safety_buffer: config.safety_buffer,
            reserve_pct: config.reserve_pct,
            hardcap_over_pct: config.hardcap_over_pct,
        },
    );
    let executor = CopyExecutor::new(
        db.clone(),
        exchange,
        symbols,
        wallets,
        ledger,
        SizerConfig {
            safety_buffer: config.safety_buffer,
            fraction_cap: config.fraction_cap,
        },
        Duration::from_millis(config.lock_max_wait_ms),
    );

    if config.worker_enabled {
        let worker_cfg = WorkerConfig {
            poll_interval: Duration::from_millis(config.worker_poll_ms),
            max_batch: config.worker_max_batch,
            max_attempts: config.worker_max_attempts,
            concurrency: config.worker_concurrency,
            stale_lock_ttl_secs: config.stale_lock_ttl_secs,
        };
        let worker_db = db.clone();
        let worker_followers = Arc::clone(&followers);
        let worker_executor = executor.clone();
        tokio::spawn(async move {
            run_worker(worker_db, worker_followers, worker_executor, worker_cfg).await;
        });
    } else {
        tracing::info!("Job worker disabled (WORKER_ENABLED=false)");
    }

    let state = AppState {
        db,
        config,
        followers,
        dedup,
        metrics_handle,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
