use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::ApiResponse;
use crate::db::allocation_repo;
use crate::models::AllocationRow;
use crate::AppState;

#[derive(Deserialize)]
pub struct AllocationQuery {
    pub max_wallets: i32,
}

/// The active distribution mirrored for a follower tier.
pub async fn active(
    State(state): State<AppState>,
    Query(query): Query<AllocationQuery>,
) -> Json<ApiResponse<Vec<AllocationRow>>> {
    match allocation_repo::get_active_distribution(&state.db, query.max_wallets).await {
        Ok(rows) => Json(ApiResponse::ok(rows)),
        Err(e) => Json(ApiResponse::err(e)),
    }
}
