//! Mock platform API for testing
//!
//! [`MockApi`] implements every per-platform API trait, records each call in
//! order and can be configured to fail per platform. [`MockRefresher`] does the
//! same for OAuth token refresh. Both are available outside `cfg(test)` so
//! integration suites and the binaries' tests can run the full publish flow
//! without network access.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::facebook::{FacebookApi, FacebookPage, FacebookPostRequest};
use super::instagram::InstagramApi;
use super::linkedin::{LinkedInApi, LinkedInPostRequest};
use super::twitter::TwitterApi;
use super::youtube::{ChannelStats, VideoMetadata, YouTubeApi};
use super::MediaKind;
use crate::error::PlatformError;
use crate::token::{RefreshedToken, TokenRefresher};
use crate::types::SocialPlatform;

/// One recorded API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    TwitterUpload { url: String, kind: MediaKind },
    TwitterTweet { text: String, media_ids: Vec<String> },
    LinkedInPost(LinkedInPostRequest),
    InstagramImage { ig_user_id: String, url: String, caption: String },
    InstagramVideo { ig_user_id: String, url: String, caption: String },
    InstagramCarousel { ig_user_id: String, urls: Vec<String>, caption: String },
    YouTubeUpload { video_url: String, title: String, description: String },
    YouTubeThumbnail { video_id: String, image_url: String },
    YouTubeStats,
    FacebookPages,
    FacebookPost { page_token: String, request: FacebookPostRequest },
}

impl MockCall {
    pub fn platform(&self) -> SocialPlatform {
        match self {
            MockCall::TwitterUpload { .. } | MockCall::TwitterTweet { .. } => SocialPlatform::Twitter,
            MockCall::LinkedInPost(_) => SocialPlatform::LinkedIn,
            MockCall::InstagramImage { .. }
            | MockCall::InstagramVideo { .. }
            | MockCall::InstagramCarousel { .. } => SocialPlatform::Instagram,
            MockCall::YouTubeUpload { .. }
            | MockCall::YouTubeThumbnail { .. }
            | MockCall::YouTubeStats => SocialPlatform::YouTube,
            MockCall::FacebookPages | MockCall::FacebookPost { .. } => SocialPlatform::Facebook,
        }
    }
}

/// Recording stand-in for all platform APIs
///
/// Cloning shares the call log, so a test can keep a handle while the
/// registry owns another.
#[derive(Clone, Default)]
pub struct MockApi {
    calls: Arc<Mutex<Vec<MockCall>>>,
    failures: Arc<Mutex<HashMap<SocialPlatform, PlatformError>>>,
    thumbnail_failure: Option<PlatformError>,
    pages: Vec<FacebookPage>,
    channel_stats: ChannelStats,
    /// Tokens seen per call, in call order
    tokens: Arc<Mutex<Vec<String>>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            channel_stats: ChannelStats {
                channel_id: "UC-mock".to_string(),
                title: "Mock Channel".to_string(),
                subscriber_count: 1200,
                view_count: 34000,
                video_count: 56,
            },
            ..Default::default()
        }
    }

    /// Every call for `platform` fails with `error`
    pub fn fail(self, platform: SocialPlatform, error: PlatformError) -> Self {
        self.failures.lock().unwrap().insert(platform, error);
        self
    }

    pub fn fail_twitter(self, error: PlatformError) -> Self {
        self.fail(SocialPlatform::Twitter, error)
    }

    pub fn fail_thumbnail(mut self, error: PlatformError) -> Self {
        self.thumbnail_failure = Some(error);
        self
    }

    /// Pages returned by `get_user_pages`
    pub fn with_pages(mut self, pages: Vec<FacebookPage>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_channel_stats(mut self, stats: ChannelStats) -> Self {
        self.channel_stats = stats;
        self
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    /// Calls that reached `platform`
    pub fn calls_for(&self, platform: SocialPlatform) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.platform() == platform)
            .collect()
    }

    /// Access tokens presented, in call order
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    /// Record the call, then return the configured failure if any
    fn record(&self, token: &SecretString, call: MockCall) -> Result<usize, PlatformError> {
        let platform = call.platform();
        let ordinal = {
            let mut calls = self.calls.lock().unwrap();
            let discriminant = std::mem::discriminant(&call);
            calls.push(call);
            calls
                .iter()
                .filter(|c| std::mem::discriminant(*c) == discriminant)
                .count()
        };
        self.tokens
            .lock()
            .unwrap()
            .push(token.expose_secret().to_string());

        match self.failures.lock().unwrap().get(&platform) {
            Some(error) => Err(error.clone()),
            None => Ok(ordinal),
        }
    }
}

#[async_trait]
impl TwitterApi for MockApi {
    async fn upload_media(
        &self,
        token: &SecretString,
        url: &str,
        kind: MediaKind,
    ) -> Result<String, PlatformError> {
        let n = self.record(
            token,
            MockCall::TwitterUpload {
                url: url.to_string(),
                kind,
            },
        )?;
        Ok(format!("media-{}", n))
    }

    async fn create_tweet(
        &self,
        token: &SecretString,
        text: &str,
        media_ids: &[String],
    ) -> Result<String, PlatformError> {
        let n = self.record(
            token,
            MockCall::TwitterTweet {
                text: text.to_string(),
                media_ids: media_ids.to_vec(),
            },
        )?;
        Ok(format!("tweet-{}", n))
    }
}

#[async_trait]
impl LinkedInApi for MockApi {
    async fn create_post(
        &self,
        token: &SecretString,
        request: &LinkedInPostRequest,
    ) -> Result<String, PlatformError> {
        let n = self.record(token, MockCall::LinkedInPost(request.clone()))?;
        Ok(format!("urn:li:share:{}", n))
    }
}

#[async_trait]
impl InstagramApi for MockApi {
    async fn publish_image(
        &self,
        token: &SecretString,
        ig_user_id: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<String, PlatformError> {
        let n = self.record(
            token,
            MockCall::InstagramImage {
                ig_user_id: ig_user_id.to_string(),
                url: image_url.to_string(),
                caption: caption.to_string(),
            },
        )?;
        Ok(format!("ig-media-{}", n))
    }

    async fn publish_video(
        &self,
        token: &SecretString,
        ig_user_id: &str,
        video_url: &str,
        caption: &str,
    ) -> Result<String, PlatformError> {
        let n = self.record(
            token,
            MockCall::InstagramVideo {
                ig_user_id: ig_user_id.to_string(),
                url: video_url.to_string(),
                caption: caption.to_string(),
            },
        )?;
        Ok(format!("ig-reel-{}", n))
    }

    async fn publish_carousel(
        &self,
        token: &SecretString,
        ig_user_id: &str,
        image_urls: &[String],
        caption: &str,
    ) -> Result<String, PlatformError> {
        let n = self.record(
            token,
            MockCall::InstagramCarousel {
                ig_user_id: ig_user_id.to_string(),
                urls: image_urls.to_vec(),
                caption: caption.to_string(),
            },
        )?;
        Ok(format!("ig-carousel-{}", n))
    }
}

#[async_trait]
impl YouTubeApi for MockApi {
    async fn upload_video(
        &self,
        token: &SecretString,
        video_url: &str,
        metadata: &VideoMetadata,
    ) -> Result<String, PlatformError> {
        let n = self.record(
            token,
            MockCall::YouTubeUpload {
                video_url: video_url.to_string(),
                title: metadata.title.clone(),
                description: metadata.description.clone(),
            },
        )?;
        Ok(format!("video-{}", n))
    }

    async fn set_thumbnail(
        &self,
        token: &SecretString,
        video_id: &str,
        image_url: &str,
    ) -> Result<(), PlatformError> {
        self.record(
            token,
            MockCall::YouTubeThumbnail {
                video_id: video_id.to_string(),
                image_url: image_url.to_string(),
            },
        )?;
        match &self.thumbnail_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn channel_statistics(&self, token: &SecretString) -> Result<ChannelStats, PlatformError> {
        self.record(token, MockCall::YouTubeStats)?;
        Ok(self.channel_stats.clone())
    }
}

#[async_trait]
impl FacebookApi for MockApi {
    async fn get_user_pages(&self, token: &SecretString) -> Result<Vec<FacebookPage>, PlatformError> {
        self.record(token, MockCall::FacebookPages)?;
        Ok(self.pages.clone())
    }

    async fn publish_to_page(
        &self,
        page_token: &SecretString,
        request: &FacebookPostRequest,
    ) -> Result<String, PlatformError> {
        let n = self.record(
            page_token,
            MockCall::FacebookPost {
                page_token: page_token.expose_secret().to_string(),
                request: request.clone(),
            },
        )?;
        Ok(format!("{}_{}", request.page_id, n))
    }
}

/// Token refresher returning a fixed outcome
#[derive(Clone)]
pub struct MockRefresher {
    outcome: Result<RefreshedToken, PlatformError>,
    calls: Arc<Mutex<Vec<(SocialPlatform, String)>>>,
}

impl MockRefresher {
    /// Every refresh yields `access_token`, valid for an hour
    pub fn succeeding(access_token: &str) -> Self {
        Self::with_outcome(Ok(RefreshedToken {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_in: Some(3600),
        }))
    }

    pub fn failing(error: PlatformError) -> Self {
        Self::with_outcome(Err(error))
    }

    pub fn with_outcome(outcome: Result<RefreshedToken, PlatformError>) -> Self {
        Self {
            outcome,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// (platform, refresh token) pairs seen so far
    pub fn calls(&self) -> Vec<(SocialPlatform, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenRefresher for MockRefresher {
    async fn refresh(
        &self,
        platform: SocialPlatform,
        refresh_token: &str,
    ) -> Result<RefreshedToken, PlatformError> {
        self.calls
            .lock()
            .unwrap()
            .push((platform, refresh_token.to_string()));
        self.outcome.clone()
    }
}
