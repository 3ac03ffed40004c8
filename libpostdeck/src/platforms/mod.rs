//! Platform publishers
//!
//! Every supported network has a [`PlatformPublisher`] that turns a
//! [`ComposedContent`] into one platform call. Publishers only choose *what*
//! to send (which media, which Page, which author); the actual HTTP traffic is
//! behind a per-platform API trait (`TwitterApi`, `LinkedInApi`, ...) so the
//! selection rules can be exercised against [`mock::MockApi`].
//!
//! ```no_run
//! use libpostdeck::config::Config;
//! use libpostdeck::platforms::PublisherRegistry;
//! use libpostdeck::types::SocialPlatform;
//!
//! # fn example() -> Result<(), libpostdeck::error::PlatformError> {
//! let registry = PublisherRegistry::from_config(&Config::default_config())?;
//! assert!(registry.get(SocialPlatform::YouTube).is_some());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::compose::ComposedContent;
use crate::config::Config;
use crate::error::{classify_http_status, PlatformError};
use crate::types::{Post, SocialAccount, SocialPlatform};

pub mod facebook;
mod graph;
pub mod instagram;
pub mod linkedin;
pub mod twitter;
pub mod youtube;

// Available outside tests so integration suites and the binaries' tests can
// drive the publish flow without network access
pub mod mock;

pub use facebook::{FacebookApi, FacebookPublisher};
pub use instagram::{InstagramApi, InstagramPublisher};
pub use linkedin::{LinkedInApi, LinkedInPublisher};
pub use twitter::{TwitterApi, TwitterPublisher};
pub use youtube::{YouTubeApi, YouTubePublisher};

/// Everything a publisher needs for one account
pub struct PublishContext<'a> {
    pub post: &'a Post,
    pub account: &'a SocialAccount,
    pub composed: &'a ComposedContent,
    pub access_token: &'a SecretString,
}

#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    fn platform(&self) -> SocialPlatform;

    /// Publish and return the platform's id for the new post
    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<String, PlatformError>;
}

/// One publisher per [`SocialPlatform`]
#[derive(Default)]
pub struct PublisherRegistry {
    publishers: HashMap<SocialPlatform, Box<dyn PlatformPublisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry backed by the real HTTP clients
    pub fn from_config(config: &Config) -> Result<Self, PlatformError> {
        let http = http_client(config)?;
        let graph_version = config.graph_version();

        let mut registry = Self::new();
        registry.register(TwitterPublisher::new(Arc::new(
            twitter::HttpTwitterApi::new(http.clone()),
        )));
        registry.register(LinkedInPublisher::new(Arc::new(
            linkedin::HttpLinkedInApi::new(http.clone()),
        )));
        registry.register(InstagramPublisher::new(Arc::new(
            instagram::HttpInstagramApi::new(http.clone(), &graph_version),
        )));
        registry.register(YouTubePublisher::new(Arc::new(
            youtube::HttpYouTubeApi::new(http.clone()),
        )));
        registry.register(FacebookPublisher::new(Arc::new(
            facebook::HttpFacebookApi::new(http, &graph_version),
        )));
        Ok(registry)
    }

    /// Registry whose five publishers all talk to one API implementation
    pub fn with_api<A>(api: Arc<A>) -> Self
    where
        A: TwitterApi + LinkedInApi + InstagramApi + YouTubeApi + FacebookApi + 'static,
    {
        let mut registry = Self::new();
        registry.register(TwitterPublisher::new(api.clone()));
        registry.register(LinkedInPublisher::new(api.clone()));
        registry.register(InstagramPublisher::new(api.clone()));
        registry.register(YouTubePublisher::new(api.clone()));
        registry.register(FacebookPublisher::new(api));
        registry
    }

    /// Add or replace the publisher for its platform
    pub fn register<P: PlatformPublisher + 'static>(&mut self, publisher: P) {
        self.publishers.insert(publisher.platform(), Box::new(publisher));
    }

    pub fn get(&self, platform: SocialPlatform) -> Option<&dyn PlatformPublisher> {
        self.publishers.get(&platform).map(|p| p.as_ref())
    }

    /// Resolve the publisher for a stored platform value
    pub fn resolve(&self, platform_name: &str) -> Result<&dyn PlatformPublisher, PlatformError> {
        let platform: SocialPlatform = platform_name.parse()?;
        self.get(platform).ok_or_else(|| {
            PlatformError::Unsupported(format!("no publisher registered for {}", platform))
        })
    }
}

/// Kind of media being handed to an API client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

// ============================================================================
// Shared HTTP plumbing for the API clients
// ============================================================================

pub(crate) fn http_client(config: &Config) -> Result<reqwest::Client, PlatformError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .user_agent(concat!("postdeck/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

pub(crate) fn bearer(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}

/// Download a media file referenced by URL
///
/// Returns the bytes and the content type reported by the host, falling back
/// to a guess from the file extension.
pub(crate) async fn fetch_media(
    http: &reqwest::Client,
    url: &str,
    kind: MediaKind,
) -> Result<(Vec<u8>, String), PlatformError> {
    let resp = http.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(PlatformError::Validation(format!(
            "Could not download {} {} ({})",
            kind.as_str(),
            url,
            status
        )));
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|ct| !ct.starts_with("application/octet-stream"))
        .unwrap_or_else(|| guess_mime_type(url, kind).to_string());

    let bytes = resp.bytes().await?;
    Ok((bytes.to_vec(), content_type))
}

pub(crate) fn guess_mime_type(url: &str, kind: MediaKind) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => match kind {
            MediaKind::Image => "image/jpeg",
            MediaKind::Video => "video/mp4",
        },
    }
}

/// Read a response body, mapping non-success statuses to [`PlatformError`]
pub(crate) async fn read_body(
    platform: SocialPlatform,
    resp: reqwest::Response,
) -> Result<String, PlatformError> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(classify_http_status(
            platform.display_name(),
            status.as_u16(),
            &text,
        ));
    }
    Ok(text)
}

pub(crate) fn parse_json<T: DeserializeOwned>(
    platform: SocialPlatform,
    text: &str,
) -> Result<T, PlatformError> {
    serde_json::from_str(text).map_err(|e| {
        PlatformError::Posting(format!(
            "Failed to parse {} response: {} - body: {}",
            platform, e, text
        ))
    })
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    platform: SocialPlatform,
    resp: reqwest::Response,
) -> Result<T, PlatformError> {
    let text = read_body(platform, resp).await?;
    parse_json(platform, &text)
}

/// Cut `text` to at most `max` characters on a char boundary
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockApi;

    #[test]
    fn test_with_api_registers_every_platform() {
        let registry = PublisherRegistry::with_api(Arc::new(MockApi::new()));

        for platform in SocialPlatform::ALL {
            let publisher = registry.get(platform).unwrap();
            assert_eq!(publisher.platform(), platform);
        }
    }

    #[test]
    fn test_from_config_registers_every_platform() {
        let registry = PublisherRegistry::from_config(&Config::default_config()).unwrap();
        assert!(SocialPlatform::ALL
            .iter()
            .all(|platform| registry.get(*platform).is_some()));
    }

    #[test]
    fn test_resolve_unknown_platform_names_it() {
        let registry = PublisherRegistry::with_api(Arc::new(MockApi::new()));

        let err = registry.resolve("TIKTOK").err().unwrap();
        assert!(matches!(err, PlatformError::Unsupported(_)));
        assert!(err.to_string().contains("TIKTOK"));
    }

    #[test]
    fn test_resolve_unregistered_platform() {
        let registry = PublisherRegistry::new();

        let err = registry.resolve("linkedin").err().unwrap();
        assert!(err.to_string().contains("LinkedIn"));
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type("https://cdn/x/photo.PNG?v=2", MediaKind::Image), "image/png");
        assert_eq!(guess_mime_type("https://cdn/clip.mov", MediaKind::Video), "video/quicktime");
        assert_eq!(guess_mime_type("https://cdn/blob", MediaKind::Video), "video/mp4");
        assert_eq!(guess_mime_type("https://cdn/blob", MediaKind::Image), "image/jpeg");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
