use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::errors::AppError;
use crate::ingest;
use crate::models::PositionEvent;
use crate::AppState;

#[derive(Serialize)]
pub struct IngestResponse {
    pub enqueued: i64,
}

/// Accept one leader position event and fan it out to follower jobs.
/// Re-delivered events are accepted and enqueue nothing.
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<PositionEvent>,
) -> Result<Json<IngestResponse>, AppError> {
    if event.operation.symbol.trim().is_empty() {
        return Err(AppError::BadRequest("symbol must not be blank".into()));
    }

    let enqueued = ingest::ingest(&state.db, &state.followers, &state.dedup, &event).await?;
    Ok(Json(IngestResponse { enqueued }))
}
