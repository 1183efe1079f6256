use std::collections::HashMap;

use axum::extract::State;
use axum::Json;

use super::ApiResponse;
use crate::db::job_repo;
use crate::AppState;

pub async fn stats(State(state): State<AppState>) -> Json<ApiResponse<HashMap<String, i64>>> {
    match job_repo::count_by_status(&state.db).await {
        Ok(counts) => Json(ApiResponse::ok(counts.into_iter().collect())),
        Err(e) => Json(ApiResponse::err(e)),
    }
}
