pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod exchange;
pub mod execution;
pub mod ingest;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod wallets;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::follower_repo::FollowerCache;
use crate::ingest::DedupCache;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: AppConfig,
    pub followers: Arc<FollowerCache>,
    pub dedup: Arc<DedupCache>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}
