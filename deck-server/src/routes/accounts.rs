use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/accounts/{id}/youtube/stats", get(youtube_stats))
}

/// Cached channel statistics for a connected YouTube account
async fn youtube_stats(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(account_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let stats = state
        .service
        .youtube_stats()
        .channel_stats(&user_id, &account_id)
        .await?;

    Ok(Json(json!({ "success": true, "data": stats })))
}
