//! deck-server - HTTP surface for Postdeck
//!
//! The router is built here so tests can drive it in-process; `main.rs` only
//! loads configuration, binds and serves.

pub mod auth;
pub mod error;
pub mod routes;

use axum::Router;
use libpostdeck::PostdeckService;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub service: PostdeckService,
}

impl AppState {
    pub fn new(service: PostdeckService) -> Arc<Self> {
        Arc::new(Self { service })
    }
}

/// Full application router with request tracing
pub fn build_app(state: Arc<AppState>) -> Router {
    routes::build_routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
