use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::require_auth;
use super::handlers;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Public routes — no authentication required
    let public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::render));

    // Protected API routes — require Bearer token when API_TOKEN is set
    let protected = Router::new()
        .route("/api/events", post(handlers::events::ingest_event))
        .route("/api/jobs/stats", get(handlers::jobs::stats))
        .route("/api/positions", get(handlers::positions::list_active))
        .route("/api/allocations", get(handlers::allocations::active))
        .route("/api/followers", get(handlers::followers::list))
        .layer(middleware::from_fn(require_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
