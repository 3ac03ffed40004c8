//! Error responses for route handlers

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use libpostdeck::PostdeckError;
use serde_json::json;
use tracing::{error, warn};

#[derive(Debug)]
pub enum ApiError {
    /// No user identity on the request
    Unauthorized,
    Service(PostdeckError),
}

impl From<PostdeckError> for ApiError {
    fn from(err: PostdeckError) -> Self {
        ApiError::Service(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Service(err) => StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Unauthorized => "Authentication required".to_string(),
            // Internal details stay in the log
            ApiError::Service(err) if status.is_server_error() => {
                error!("Request failed: {}", err);
                match err {
                    PostdeckError::Platform(platform_err) => platform_err.to_string(),
                    _ => "Internal server error".to_string(),
                }
            }
            ApiError::Service(err) => {
                warn!("Request rejected ({}): {}", status.as_u16(), err);
                err.to_string()
            }
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
