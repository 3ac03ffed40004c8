pub mod accounts;
pub mod health;
pub mod posts;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(posts::routes())
        .merge(accounts::routes())
}
