use rust_decimal::Decimal;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // External collaborators
    pub exchange_base_url: String,
    pub metrics_base_url: String,

    // Job worker
    pub worker_enabled: bool,
    pub worker_poll_ms: u64,
    pub worker_max_batch: i64,
    pub worker_max_attempts: i32,
    pub worker_concurrency: usize,
    pub stale_lock_ttl_secs: i64,
    pub lock_max_wait_ms: u64,

    // Sizing & margin budget
    pub safety_buffer: Decimal,
    pub reserve_pct: Decimal,
    pub hardcap_over_pct: Decimal,
    pub fraction_cap: Decimal,

    // Capital allocation
    pub total_capital_cap: f64,
    pub per_wallet_cap: f64,

    // Caches
    pub symbol_cache_ttl_secs: u64,
    pub metric_cache_ttl_secs: u64,
    pub follower_cache_ttl_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT").unwrap_or_else(|_| "8080".into()).parse()?,

            exchange_base_url: env::var("EXCHANGE_BASE_URL")
                .map_err(|_| anyhow::anyhow!("EXCHANGE_BASE_URL must be set"))?,
            metrics_base_url: env::var("METRICS_BASE_URL")
                .map_err(|_| anyhow::anyhow!("METRICS_BASE_URL must be set"))?,

            worker_enabled: parse_or("WORKER_ENABLED", true),
            worker_poll_ms: parse_or("WORKER_POLL_MS", 250),
            worker_max_batch: parse_or("WORKER_MAX_BATCH", 50),
            worker_max_attempts: parse_or("WORKER_MAX_ATTEMPTS", 10),
            worker_concurrency: parse_or("WORKER_CONCURRENCY", 8),
            stale_lock_ttl_secs: parse_or("STALE_LOCK_TTL_SECS", 600),
            lock_max_wait_ms: parse_or("LOCK_MAX_WAIT_MS", 3000),

            safety_buffer: parse_decimal_or("SAFETY_BUFFER", Decimal::new(5, 2)),
            reserve_pct: parse_decimal_or("RESERVE_PCT", Decimal::new(5, 2)),
            hardcap_over_pct: parse_decimal_or("HARDCAP_OVER_PCT", Decimal::new(10, 2)),
            fraction_cap: parse_decimal_or("FRACTION_CAP", Decimal::ONE),

            total_capital_cap: parse_or("TOTAL_CAPITAL_CAP", 0.90),
            per_wallet_cap: parse_or("PER_WALLET_CAP", 0.50),

            symbol_cache_ttl_secs: parse_or("SYMBOL_CACHE_TTL_SECS", 30),
            metric_cache_ttl_secs: parse_or("METRIC_CACHE_TTL_SECS", 30),
            follower_cache_ttl_secs: parse_or("FOLLOWER_CACHE_TTL_SECS", 30),
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_decimal_or(key: &str, default: Decimal) -> Decimal {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
