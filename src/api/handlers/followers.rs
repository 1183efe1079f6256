use axum::extract::State;
use axum::Json;

use super::ApiResponse;
use crate::models::Follower;
use crate::AppState;

/// Active followers; API credentials never serialize.
pub async fn list(State(state): State<AppState>) -> Json<ApiResponse<Vec<Follower>>> {
    match state.followers.get_all().await {
        Ok(followers) => Json(ApiResponse::ok(followers)),
        Err(e) => Json(ApiResponse::err(e)),
    }
}
