//! Access-token validation and refresh
//!
//! [`TokenManager`] guarantees a usable access token for an account before
//! any platform call. Expired tokens are refreshed through a
//! [`TokenRefresher`]; when that is impossible the account is deactivated and
//! the caller is told the user has to reconnect.

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::{classify_http_status, PlatformError, Result};
use crate::types::{SocialAccount, SocialPlatform};

/// Outcome of validating an account's token
#[derive(Debug)]
pub struct TokenValidation {
    pub is_valid: bool,
    pub access_token: Option<SecretString>,
    pub needs_reconnection: bool,
    pub error: Option<String>,
}

impl TokenValidation {
    fn valid(access_token: String) -> Self {
        Self {
            is_valid: true,
            access_token: Some(SecretString::from(access_token)),
            needs_reconnection: false,
            error: None,
        }
    }

    fn reconnect(error: String) -> Self {
        Self {
            is_valid: false,
            access_token: None,
            needs_reconnection: true,
            error: Some(error),
        }
    }
}

/// A freshly issued access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Present when the provider rotated the refresh token
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// Exchanges a refresh token for a new access token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        platform: SocialPlatform,
        refresh_token: &str,
    ) -> std::result::Result<RefreshedToken, PlatformError>;
}

pub struct TokenManager {
    db: Arc<Database>,
    refresher: Arc<dyn TokenRefresher>,
    refresh_window_secs: i64,
}

impl TokenManager {
    pub fn new(db: Arc<Database>, refresher: Arc<dyn TokenRefresher>, refresh_window_secs: i64) -> Self {
        Self {
            db,
            refresher,
            refresh_window_secs,
        }
    }

    /// Return a usable token for the account, refreshing it when expired
    ///
    /// Only persistence failures are returned as `Err`; every token problem is
    /// reported through [`TokenValidation`].
    pub async fn validate_and_refresh(
        &self,
        user_id: &str,
        platform: SocialPlatform,
        account_id: &str,
    ) -> Result<TokenValidation> {
        let account = match self.db.find_account(user_id, platform, account_id).await? {
            Some(account) => account,
            None => {
                return Ok(TokenValidation::reconnect(format!(
                    "{} account {} is not connected",
                    platform, account_id
                )))
            }
        };

        self.validate_account(&account, platform).await
    }

    /// Same as [`validate_and_refresh`](Self::validate_and_refresh) for an
    /// account row the caller already holds
    pub async fn validate_account(
        &self,
        account: &SocialAccount,
        platform: SocialPlatform,
    ) -> Result<TokenValidation> {
        let access_token = match account.access_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => {
                return Ok(TokenValidation::reconnect(format!(
                    "{} account {} has no access token and needs reconnection",
                    platform, account.account_name
                )))
            }
        };

        let now = Utc::now().timestamp();
        if !self.is_expired(account.expires_at, now) {
            return Ok(TokenValidation::valid(access_token.to_string()));
        }

        debug!(
            "Access token for {} account {} expired, refreshing",
            platform, account.account_name
        );

        let refresh_token = match account.refresh_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => {
                warn!(
                    "No refresh token for expired {} account {}, deactivating",
                    platform, account.account_name
                );
                self.db.deactivate_account(&account.id).await?;
                return Ok(TokenValidation::reconnect(format!(
                    "{} token expired and needs reconnection",
                    platform
                )));
            }
        };

        match self.refresher.refresh(platform, refresh_token).await {
            Ok(refreshed) => {
                let expires_at = refreshed.expires_in.map(|secs| now + secs);
                self.db
                    .update_account_tokens(
                        &account.id,
                        &refreshed.access_token,
                        refreshed.refresh_token.as_deref(),
                        expires_at,
                    )
                    .await?;
                info!(
                    "Refreshed {} token for account {}",
                    platform, account.account_name
                );
                Ok(TokenValidation::valid(refreshed.access_token))
            }
            Err(e) => {
                warn!(
                    "Token refresh failed for {} account {}: {}",
                    platform, account.account_name, e
                );
                self.db.deactivate_account(&account.id).await?;
                Ok(TokenValidation::reconnect(format!(
                    "{} token refresh failed and needs reconnection: {}",
                    platform, e
                )))
            }
        }
    }

    fn is_expired(&self, expires_at: Option<i64>, now: i64) -> bool {
        match expires_at {
            Some(expires_at) => expires_at <= now + self.refresh_window_secs,
            None => false,
        }
    }
}

// ============================================================================
// OAuth refresh over HTTP
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct TokenEndpoints {
    twitter: String,
    linkedin: String,
    google: String,
    facebook_graph: String,
}

impl Default for TokenEndpoints {
    fn default() -> Self {
        Self {
            twitter: "https://api.x.com/2/oauth2/token".to_string(),
            linkedin: "https://www.linkedin.com/oauth/v2/accessToken".to_string(),
            google: "https://oauth2.googleapis.com/token".to_string(),
            facebook_graph: "https://graph.facebook.com".to_string(),
        }
    }
}

/// [`TokenRefresher`] talking to each platform's OAuth token endpoint
pub struct OAuthRefresher {
    http: reqwest::Client,
    config: Arc<Config>,
    endpoints: TokenEndpoints,
}

impl OAuthRefresher {
    pub fn new(config: Arc<Config>) -> std::result::Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config,
            endpoints: TokenEndpoints::default(),
        })
    }

    async fn post_form(
        &self,
        platform: SocialPlatform,
        url: &str,
        basic_auth: Option<String>,
        params: &[(&str, &str)],
    ) -> std::result::Result<RefreshedToken, PlatformError> {
        let mut request = self.http.post(url).form(params);
        if let Some(header) = basic_auth {
            request = request.header("Authorization", header);
        }

        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            // Token endpoints answer 400 for revoked or invalid grants
            return Err(match status.as_u16() {
                400 | 401 | 403 => PlatformError::Authentication(format!(
                    "{} token refresh rejected ({}): {}",
                    platform, status, text
                )),
                code => classify_http_status(platform.display_name(), code, &text),
            });
        }

        let token: TokenResponse = serde_json::from_str(&text).map_err(|e| {
            PlatformError::Posting(format!(
                "Failed to parse {} token response: {} - body: {}",
                platform, e, text
            ))
        })?;

        Ok(RefreshedToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
        })
    }
}

fn missing_client(section: &str) -> PlatformError {
    PlatformError::Configuration(format!(
        "No [{}] OAuth client configured for token refresh",
        section
    ))
}

/// Build Basic auth header for OAuth token requests
fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let credentials = format!("{}:{}", client_id, client_secret);
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(credentials)
    )
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(
        &self,
        platform: SocialPlatform,
        refresh_token: &str,
    ) -> std::result::Result<RefreshedToken, PlatformError> {
        match platform {
            SocialPlatform::Twitter => {
                let client = self.config.twitter.as_ref().ok_or_else(|| missing_client("twitter"))?;
                let params = [
                    ("refresh_token", refresh_token),
                    ("grant_type", "refresh_token"),
                    ("client_id", client.client_id.as_str()),
                ];
                self.post_form(
                    platform,
                    &self.endpoints.twitter,
                    Some(basic_auth_header(&client.client_id, &client.client_secret)),
                    &params,
                )
                .await
            }
            SocialPlatform::LinkedIn => {
                let client = self.config.linkedin.as_ref().ok_or_else(|| missing_client("linkedin"))?;
                let params = [
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", client.client_id.as_str()),
                    ("client_secret", client.client_secret.as_str()),
                ];
                self.post_form(platform, &self.endpoints.linkedin, None, &params)
                    .await
            }
            SocialPlatform::YouTube => {
                let client = self.config.google.as_ref().ok_or_else(|| missing_client("google"))?;
                let params = [
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", client.client_id.as_str()),
                    ("client_secret", client.client_secret.as_str()),
                ];
                self.post_form(platform, &self.endpoints.google, None, &params)
                    .await
            }
            SocialPlatform::Facebook | SocialPlatform::Instagram => {
                // Graph tokens are long-lived; the stored refresh token is the
                // long-lived user token that gets exchanged for a fresh one.
                let app = self.config.facebook.as_ref().ok_or_else(|| missing_client("facebook"))?;
                let url = format!(
                    "{}/{}/oauth/access_token",
                    self.endpoints.facebook_graph, app.graph_version
                );
                let params = [
                    ("grant_type", "fb_exchange_token"),
                    ("client_id", app.app_id.as_str()),
                    ("client_secret", app.app_secret.as_str()),
                    ("fb_exchange_token", refresh_token),
                ];
                self.post_form(platform, &url, None, &params).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountType;
    use crate::platforms::mock::MockRefresher;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    async fn setup(
        outcome: std::result::Result<RefreshedToken, PlatformError>,
    ) -> (Arc<Database>, MockRefresher, TokenManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("tokens.db");
        let db = Arc::new(Database::new(db_path.to_str().unwrap()).await.unwrap());
        let refresher = MockRefresher::with_outcome(outcome);
        let manager = TokenManager::new(Arc::clone(&db), Arc::new(refresher.clone()), 300);
        (db, refresher, manager, temp_dir)
    }

    fn youtube_account(expires_at: Option<i64>, refresh_token: Option<&str>) -> SocialAccount {
        let mut account = SocialAccount::new(
            "user-1".to_string(),
            SocialPlatform::YouTube,
            "yt-1".to_string(),
            "My Channel".to_string(),
        );
        account.account_type = AccountType::Creator;
        account.access_token = Some("old-access".to_string());
        account.refresh_token = refresh_token.map(str::to_string);
        account.expires_at = expires_at;
        account
    }

    fn fresh_token() -> RefreshedToken {
        RefreshedToken {
            access_token: "new-access".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
        }
    }

    #[tokio::test]
    async fn test_unexpired_token_returned_without_refresh() {
        let (db, refresher, manager, _temp_dir) = setup(Ok(fresh_token())).await;
        let expires = Utc::now().timestamp() + 7200;
        db.create_account(&youtube_account(Some(expires), Some("r")))
            .await
            .unwrap();

        let validation = manager
            .validate_and_refresh("user-1", SocialPlatform::YouTube, "yt-1")
            .await
            .unwrap();

        assert!(validation.is_valid);
        assert_eq!(validation.access_token.unwrap().expose_secret(), "old-access");
        assert!(refresher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_token_without_expiry_never_refreshed() {
        let (db, refresher, manager, _temp_dir) = setup(Ok(fresh_token())).await;
        db.create_account(&youtube_account(None, None)).await.unwrap();

        let validation = manager
            .validate_and_refresh("user-1", SocialPlatform::YouTube, "yt-1")
            .await
            .unwrap();

        assert!(validation.is_valid);
        assert!(refresher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_token_inside_refresh_window_is_refreshed_and_persisted() {
        let (db, refresher, manager, _temp_dir) = setup(Ok(fresh_token())).await;
        let account = youtube_account(Some(Utc::now().timestamp() + 60), Some("refresh-1"));
        db.create_account(&account).await.unwrap();

        let validation = manager
            .validate_and_refresh("user-1", SocialPlatform::YouTube, "yt-1")
            .await
            .unwrap();

        assert!(validation.is_valid);
        assert_eq!(validation.access_token.unwrap().expose_secret(), "new-access");
        assert_eq!(
            refresher.calls(),
            vec![(SocialPlatform::YouTube, "refresh-1".to_string())]
        );

        let stored = db.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("new-access"));
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
        assert!(stored.expires_at.unwrap() > Utc::now().timestamp() + 3000);
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn test_failed_refresh_deactivates_account() {
        let (db, _refresher, manager, _temp_dir) = setup(Err(PlatformError::Authentication(
            "invalid_grant".to_string(),
        )))
        .await;
        let account = youtube_account(Some(Utc::now().timestamp() - 10), Some("refresh-1"));
        db.create_account(&account).await.unwrap();

        let validation = manager
            .validate_and_refresh("user-1", SocialPlatform::YouTube, "yt-1")
            .await
            .unwrap();

        assert!(!validation.is_valid);
        assert!(validation.needs_reconnection);
        assert!(validation.access_token.is_none());
        assert!(validation.error.unwrap().contains("invalid_grant"));

        let stored = db.get_account(&account.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_needs_reconnection() {
        let (db, refresher, manager, _temp_dir) = setup(Ok(fresh_token())).await;
        let account = youtube_account(Some(Utc::now().timestamp() - 10), None);
        db.create_account(&account).await.unwrap();

        let validation = manager
            .validate_and_refresh("user-1", SocialPlatform::YouTube, "yt-1")
            .await
            .unwrap();

        assert!(!validation.is_valid);
        assert!(validation.needs_reconnection);
        assert!(refresher.calls().is_empty());
        assert!(!db.get_account(&account.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_missing_access_token_needs_reconnection() {
        let (db, _refresher, manager, _temp_dir) = setup(Ok(fresh_token())).await;
        let mut account = youtube_account(None, None);
        account.access_token = None;
        db.create_account(&account).await.unwrap();

        let validation = manager
            .validate_and_refresh("user-1", SocialPlatform::YouTube, "yt-1")
            .await
            .unwrap();

        assert!(!validation.is_valid);
        assert!(validation.needs_reconnection);
    }

    #[tokio::test]
    async fn test_unknown_account_needs_reconnection() {
        let (_db, _refresher, manager, _temp_dir) = setup(Ok(fresh_token())).await;

        let validation = manager
            .validate_and_refresh("user-1", SocialPlatform::Twitter, "nobody")
            .await
            .unwrap();

        assert!(!validation.is_valid);
        assert!(validation.needs_reconnection);
        assert!(validation.error.unwrap().contains("not connected"));
    }

    #[test]
    fn test_basic_auth_header() {
        assert_eq!(basic_auth_header("id", "secret"), "Basic aWQ6c2VjcmV0");
    }

    #[tokio::test]
    async fn test_oauth_refresher_requires_client_config() {
        let refresher = OAuthRefresher::new(Arc::new(Config::default_config())).unwrap();

        let err = refresher
            .refresh(SocialPlatform::LinkedIn, "refresh")
            .await
            .unwrap_err();

        assert!(matches!(err, PlatformError::Configuration(_)));
        assert!(err.to_string().contains("[linkedin]"));
    }
}
