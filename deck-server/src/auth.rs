//! Request identity
//!
//! Sessions are handled by the fronting gateway, which forwards the
//! authenticated user in the `x-user-id` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppState;

pub const USER_HEADER: &str = "x-user-id";

/// Authenticated user id taken from [`USER_HEADER`]
pub struct AuthUser(pub String);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        Ok(AuthUser(user_id.to_string()))
    }
}
