use axum::extract::State;
use axum::Json;

use super::ApiResponse;
use crate::db::position_repo;
use crate::models::CopyPosition;
use crate::AppState;

pub async fn list_active(State(state): State<AppState>) -> Json<ApiResponse<Vec<CopyPosition>>> {
    match position_repo::get_active(&state.db).await {
        Ok(positions) => Json(ApiResponse::ok(positions)),
        Err(e) => Json(ApiResponse::err(e)),
    }
}
