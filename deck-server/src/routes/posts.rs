//! Publishing endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/posts/{id}/publish", post(publish_post))
}

/// Publish a stored post to its selected accounts
///
/// 200 when at least one account received the post, 400 with the same data
/// when none did.
async fn publish_post(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(post_id): Path<String>,
) -> Result<Response, ApiError> {
    let outcome = state.service.publishing().publish(&user_id, &post_id).await?;

    info!(
        "Publish request for post {} by {}: {}",
        post_id, user_id, outcome.summary.message
    );

    let status = if outcome.summary.any_succeeded() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    Ok((status, Json(outcome.envelope())).into_response())
}
