//! Twitter/X publishing
//!
//! A tweet carries at most one media item here: the first video when the
//! post has one, otherwise the first image.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{
    bearer, fetch_media, parse_json, read_body, MediaKind, PlatformPublisher, PublishContext,
};
use crate::compose::ComposedContent;
use crate::error::PlatformError;
use crate::types::SocialPlatform;

const API_BASE: &str = "https://api.x.com/2";
const CHUNK_SIZE: usize = 1024 * 1024;
const MAX_STATUS_POLLS: usize = 60;

#[async_trait]
pub trait TwitterApi: Send + Sync {
    /// Upload the media at `url` and return its media id
    async fn upload_media(
        &self,
        token: &SecretString,
        url: &str,
        kind: MediaKind,
    ) -> Result<String, PlatformError>;

    /// Create a tweet and return its id
    async fn create_tweet(
        &self,
        token: &SecretString,
        text: &str,
        media_ids: &[String],
    ) -> Result<String, PlatformError>;
}

pub struct TwitterPublisher {
    api: Arc<dyn TwitterApi>,
}

impl TwitterPublisher {
    pub fn new(api: Arc<dyn TwitterApi>) -> Self {
        Self { api }
    }
}

/// Pick the single media item a tweet carries
pub fn select_media(composed: &ComposedContent) -> Option<(&str, MediaKind)> {
    if let Some(video) = composed.videos.first() {
        return Some((video, MediaKind::Video));
    }
    composed.images.first().map(|image| (image, MediaKind::Image))
}

#[async_trait]
impl PlatformPublisher for TwitterPublisher {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::Twitter
    }

    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<String, PlatformError> {
        let composed = ctx.composed;
        let dropped = composed.images.len() + composed.videos.len();

        let mut media_ids = Vec::new();
        if let Some((url, kind)) = select_media(composed) {
            if dropped > 1 {
                debug!(
                    "Twitter accepts one media item here; forwarding {} and dropping {} more",
                    url,
                    dropped - 1
                );
            }
            media_ids.push(self.api.upload_media(ctx.access_token, url, kind).await?);
        }

        self.api
            .create_tweet(ctx.access_token, &composed.text, &media_ids)
            .await
    }
}

// ============================================================================
// HTTP client
// ============================================================================

#[derive(Debug, Deserialize)]
struct TweetResponseWrapper {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    data: MediaUploadData,
}

#[derive(Debug, Deserialize)]
struct MediaUploadData {
    id: String,
    processing_info: Option<MediaProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct MediaProcessingInfo {
    state: String,
    check_after_secs: Option<u64>,
}

pub struct HttpTwitterApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTwitterApi {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: API_BASE.to_string(),
        }
    }

    async fn upload_simple(
        &self,
        token: &SecretString,
        data: Vec<u8>,
        media_type: &str,
    ) -> Result<String, PlatformError> {
        let media_category = if media_type == "image/gif" {
            "tweet_gif"
        } else {
            "tweet_image"
        };

        let part = reqwest::multipart::Part::bytes(data)
            .mime_str(media_type)
            .map_err(|e| PlatformError::Validation(format!("Invalid mime type: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .text("media_category", media_category.to_string())
            .text("media_type", media_type.to_string())
            .part("media", part);

        let resp = self
            .http
            .post(format!("{}/media/upload", self.base_url))
            .header("Authorization", bearer(token))
            .multipart(form)
            .send()
            .await?;

        let text = read_body(SocialPlatform::Twitter, resp).await?;
        let wrapper: MediaUploadResponse = parse_json(SocialPlatform::Twitter, &text)?;
        Ok(wrapper.data.id)
    }

    /// INIT, APPEND in 1 MiB segments, FINALIZE, then wait for processing
    async fn upload_chunked(
        &self,
        token: &SecretString,
        data: Vec<u8>,
        media_type: &str,
    ) -> Result<String, PlatformError> {
        // The v2 endpoint rejects video/quicktime
        let media_type = if media_type == "video/quicktime" {
            "video/mp4"
        } else {
            media_type
        };

        let init_body = serde_json::json!({
            "media_type": media_type,
            "total_bytes": data.len(),
            "media_category": "tweet_video"
        });

        let resp = self
            .http
            .post(format!("{}/media/upload/initialize", self.base_url))
            .header("Authorization", bearer(token))
            .json(&init_body)
            .send()
            .await?;
        let text = read_body(SocialPlatform::Twitter, resp).await?;
        let init: MediaUploadResponse = parse_json(SocialPlatform::Twitter, &text)?;
        let media_id = init.data.id;

        debug!("Twitter media {} initialized, {} bytes", media_id, data.len());

        let total_segments = data.chunks(CHUNK_SIZE).len();
        for (segment_index, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
            debug!(
                "Twitter APPEND segment {}/{} ({} bytes)",
                segment_index + 1,
                total_segments,
                chunk.len()
            );

            let part = reqwest::multipart::Part::bytes(chunk.to_vec())
                .mime_str(media_type)
                .map_err(|e| PlatformError::Validation(format!("Invalid mime type: {}", e)))?;
            let form = reqwest::multipart::Form::new()
                .text("segment_index", segment_index.to_string())
                .part("media", part);

            let resp = self
                .http
                .post(format!("{}/media/upload/{}/append", self.base_url, media_id))
                .header("Authorization", bearer(token))
                .multipart(form)
                .send()
                .await?;
            read_body(SocialPlatform::Twitter, resp).await?;
        }

        let resp = self
            .http
            .post(format!("{}/media/upload/{}/finalize", self.base_url, media_id))
            .header("Authorization", bearer(token))
            .send()
            .await?;
        let text = read_body(SocialPlatform::Twitter, resp).await?;
        let finalized: MediaUploadResponse = parse_json(SocialPlatform::Twitter, &text)?;

        if let Some(info) = finalized.data.processing_info {
            if info.state != "succeeded" {
                self.wait_for_processing(token, &media_id).await?;
            }
        }

        Ok(media_id)
    }

    async fn wait_for_processing(
        &self,
        token: &SecretString,
        media_id: &str,
    ) -> Result<(), PlatformError> {
        let url = format!(
            "{}/media/upload?command=STATUS&media_id={}",
            self.base_url, media_id
        );

        for _ in 0..MAX_STATUS_POLLS {
            let resp = self
                .http
                .get(&url)
                .header("Authorization", bearer(token))
                .send()
                .await?;
            let text = read_body(SocialPlatform::Twitter, resp).await?;
            let status: MediaUploadResponse = parse_json(SocialPlatform::Twitter, &text)?;

            match status.data.processing_info {
                None => return Ok(()),
                Some(info) => match info.state.as_str() {
                    "succeeded" => return Ok(()),
                    "failed" => {
                        return Err(PlatformError::ContentRejected(format!(
                            "Twitter could not process media {}",
                            media_id
                        )))
                    }
                    _ => {
                        let wait = info.check_after_secs.unwrap_or(5);
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                    }
                },
            }
        }

        Err(PlatformError::Network(format!(
            "Twitter media {} still processing after {} checks",
            media_id, MAX_STATUS_POLLS
        )))
    }
}

#[async_trait]
impl TwitterApi for HttpTwitterApi {
    async fn upload_media(
        &self,
        token: &SecretString,
        url: &str,
        kind: MediaKind,
    ) -> Result<String, PlatformError> {
        let (data, media_type) = fetch_media(&self.http, url, kind).await?;
        match kind {
            MediaKind::Video => self.upload_chunked(token, data, &media_type).await,
            MediaKind::Image => self.upload_simple(token, data, &media_type).await,
        }
    }

    async fn create_tweet(
        &self,
        token: &SecretString,
        text: &str,
        media_ids: &[String],
    ) -> Result<String, PlatformError> {
        let body = tweet_body(text, media_ids);

        let resp = self
            .http
            .post(format!("{}/tweets", self.base_url))
            .header("Authorization", bearer(token))
            .json(&body)
            .send()
            .await?;

        let text = read_body(SocialPlatform::Twitter, resp).await?;
        let wrapper: TweetResponseWrapper = parse_json(SocialPlatform::Twitter, &text)?;
        Ok(wrapper.data.id)
    }
}

fn tweet_body(text: &str, media_ids: &[String]) -> serde_json::Value {
    let mut body = serde_json::json!({ "text": text });
    if !media_ids.is_empty() {
        body["media"] = serde_json::json!({ "media_ids": media_ids });
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::MediaList;
    use crate::platforms::mock::{MockApi, MockCall};
    use crate::types::{Post, SocialAccount};

    fn composed(images: &[&str], videos: &[&str]) -> ComposedContent {
        ComposedContent {
            text: "Hello #rust".to_string(),
            images: images.iter().copied().collect::<MediaList>(),
            videos: videos.iter().copied().collect::<MediaList>(),
        }
    }

    async fn publish(api: Arc<MockApi>, composed: &ComposedContent) -> Result<String, PlatformError> {
        let post = Post::new("user-1".to_string(), "Hello".to_string());
        let account = SocialAccount::new(
            "user-1".to_string(),
            SocialPlatform::Twitter,
            "tw-1".to_string(),
            "@me".to_string(),
        );
        let token = SecretString::from("token".to_string());
        let ctx = PublishContext {
            post: &post,
            account: &account,
            composed,
            access_token: &token,
        };
        TwitterPublisher::new(api).publish(&ctx).await
    }

    #[test]
    fn test_select_media_prefers_video() {
        let content = composed(&["a.png"], &["v.mp4", "w.mp4"]);
        assert_eq!(select_media(&content), Some(("v.mp4", MediaKind::Video)));
    }

    #[test]
    fn test_select_media_first_image() {
        let content = composed(&["a.png", "b.png"], &[]);
        assert_eq!(select_media(&content), Some(("a.png", MediaKind::Image)));
        assert_eq!(select_media(&composed(&[], &[])), None);
    }

    #[tokio::test]
    async fn test_only_first_image_forwarded() {
        let api = Arc::new(MockApi::new());

        let id = publish(api.clone(), &composed(&["a.png", "b.png"], &[]))
            .await
            .unwrap();

        assert_eq!(id, "tweet-1");
        assert_eq!(
            api.calls(),
            vec![
                MockCall::TwitterUpload {
                    url: "a.png".to_string(),
                    kind: MediaKind::Image
                },
                MockCall::TwitterTweet {
                    text: "Hello #rust".to_string(),
                    media_ids: vec!["media-1".to_string()]
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_text_only_tweet() {
        let api = Arc::new(MockApi::new());

        publish(api.clone(), &composed(&[], &[])).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![MockCall::TwitterTweet {
                text: "Hello #rust".to_string(),
                media_ids: vec![]
            }]
        );
    }

    #[tokio::test]
    async fn test_upload_failure_skips_tweet() {
        let api = Arc::new(MockApi::new().fail_twitter(PlatformError::ContentRejected(
            "bad media".to_string(),
        )));

        let err = publish(api.clone(), &composed(&["a.png"], &[])).await.unwrap_err();

        assert!(matches!(err, PlatformError::ContentRejected(_)));
        assert_eq!(api.count(|c| matches!(c, MockCall::TwitterTweet { .. })), 0);
    }

    #[test]
    fn test_tweet_body_omits_empty_media() {
        assert_eq!(tweet_body("hi", &[]), serde_json::json!({ "text": "hi" }));
        assert_eq!(
            tweet_body("hi", &["m1".to_string()]),
            serde_json::json!({ "text": "hi", "media": { "media_ids": ["m1"] } })
        );
    }
}
