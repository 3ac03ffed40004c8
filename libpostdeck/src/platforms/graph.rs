//! Helpers shared by the Facebook and Instagram Graph API clients

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::parse_json;
use crate::error::{classify_http_status, PlatformError};
use crate::types::SocialPlatform;

pub(crate) const GRAPH_BASE: &str = "https://graph.facebook.com";

/// Instagram error subcode for media outside the supported aspect ratios
const ASPECT_RATIO_SUBCODE: i64 = 2207009;

pub(crate) const ASPECT_RATIO_GUIDANCE: &str = "Instagram accepts images between 4:5 (portrait) \
     and 1.91:1 (landscape); crop the image and try again";

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
    error_subcode: Option<i64>,
    error_user_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdResponse {
    pub id: String,
}

/// Map a failed Graph API response to a [`PlatformError`]
pub(crate) fn graph_error(platform: SocialPlatform, status: u16, body: &str) -> PlatformError {
    let error = match serde_json::from_str::<GraphErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => return classify_http_status(platform.display_name(), status, body),
    };

    let detail = error.error_user_msg.as_deref().unwrap_or(&error.message);
    let message = format!("{} error {}: {}", platform, error.code, detail);

    if error.error_subcode == Some(ASPECT_RATIO_SUBCODE)
        || error.message.to_lowercase().contains("aspect ratio")
    {
        return PlatformError::ContentRejected(format!("{}. {}", message, ASPECT_RATIO_GUIDANCE));
    }

    match error.code {
        // Expired or revoked token, or missing permission
        190 | 102 | 10 | 200 => PlatformError::Authentication(message),
        4 | 17 | 32 | 613 => PlatformError::RateLimit(message),
        100 => PlatformError::ContentRejected(message),
        _ => classify_http_status(platform.display_name(), status, &message),
    }
}

pub(crate) async fn read_graph_json<T: DeserializeOwned>(
    platform: SocialPlatform,
    resp: reqwest::Response,
) -> Result<T, PlatformError> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(graph_error(platform, status.as_u16(), &text));
    }
    parse_json(platform, &text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_rejection_gets_guidance() {
        let body = r#"{"error":{"message":"The aspect ratio is not supported.","code":36003,"error_subcode":2207009}}"#;

        let err = graph_error(SocialPlatform::Instagram, 400, body);

        assert!(matches!(err, PlatformError::ContentRejected(_)));
        assert!(err.to_string().contains("4:5"));
    }

    #[test]
    fn test_expired_token_is_authentication() {
        let body = r#"{"error":{"message":"Error validating access token","code":190}}"#;

        let err = graph_error(SocialPlatform::Facebook, 400, body);

        assert!(err.needs_reconnection());
    }

    #[test]
    fn test_rate_limit_code() {
        let body = r#"{"error":{"message":"Application request limit reached","code":4}}"#;
        assert!(matches!(
            graph_error(SocialPlatform::Facebook, 400, body),
            PlatformError::RateLimit(_)
        ));
    }

    #[test]
    fn test_unparseable_body_falls_back_to_status() {
        let err = graph_error(SocialPlatform::Instagram, 503, "upstream down");
        assert!(matches!(err, PlatformError::Network(_)));
    }
}
