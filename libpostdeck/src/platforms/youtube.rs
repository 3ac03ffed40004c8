//! YouTube video uploads and channel statistics

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    bearer, fetch_media, parse_json, read_body, read_json, truncate_chars, MediaKind,
    PlatformPublisher, PublishContext,
};
use crate::error::PlatformError;
use crate::types::SocialPlatform;

const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/youtube/v3";
const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub privacy_status: String,
}

/// Public counters of the authenticated channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub channel_id: String,
    pub title: String,
    pub subscriber_count: u64,
    pub view_count: u64,
    pub video_count: u64,
}

#[async_trait]
pub trait YouTubeApi: Send + Sync {
    /// Upload a video and return its id
    async fn upload_video(
        &self,
        token: &SecretString,
        video_url: &str,
        metadata: &VideoMetadata,
    ) -> Result<String, PlatformError>;

    async fn set_thumbnail(
        &self,
        token: &SecretString,
        video_id: &str,
        image_url: &str,
    ) -> Result<(), PlatformError>;

    async fn channel_statistics(&self, token: &SecretString) -> Result<ChannelStats, PlatformError>;
}

pub struct YouTubePublisher {
    api: Arc<dyn YouTubeApi>,
}

impl YouTubePublisher {
    pub fn new(api: Arc<dyn YouTubeApi>) -> Self {
        Self { api }
    }
}

/// Title and description for an upload
///
/// Explicit post fields win; otherwise the composed text is cut to the
/// YouTube limits.
pub fn video_metadata(title: Option<&str>, description: Option<&str>, text: &str) -> VideoMetadata {
    fn non_blank(value: Option<&str>) -> Option<&str> {
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    let mut title = match non_blank(title) {
        Some(title) => truncate_chars(title, MAX_TITLE_CHARS),
        None => truncate_chars(text.trim(), MAX_TITLE_CHARS),
    };
    if title.trim().is_empty() {
        title = "Untitled video".to_string();
    }

    let description = match non_blank(description) {
        Some(description) => truncate_chars(description, MAX_DESCRIPTION_CHARS),
        None => truncate_chars(text, MAX_DESCRIPTION_CHARS),
    };

    VideoMetadata {
        title,
        description,
        privacy_status: "public".to_string(),
    }
}

#[async_trait]
impl PlatformPublisher for YouTubePublisher {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::YouTube
    }

    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<String, PlatformError> {
        let video = ctx.composed.videos.first().ok_or_else(|| {
            PlatformError::Validation("YouTube posts require video content".to_string())
        })?;

        let metadata = video_metadata(
            ctx.post.title.as_deref(),
            ctx.post.description.as_deref(),
            &ctx.composed.text,
        );

        let video_id = self
            .api
            .upload_video(ctx.access_token, video, &metadata)
            .await?;

        if let Some(thumbnail) = ctx.composed.images.first() {
            if let Err(e) = self
                .api
                .set_thumbnail(ctx.access_token, &video_id, thumbnail)
                .await
            {
                warn!("Uploaded video {} but setting thumbnail failed: {}", video_id, e);
            }
        }

        Ok(video_id)
    }
}

// ============================================================================
// HTTP client
// ============================================================================

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelList {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    id: String,
    snippet: Option<ChannelSnippet>,
    statistics: Option<RawStatistics>,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
}

/// The Data API reports counters as decimal strings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatistics {
    subscriber_count: Option<String>,
    view_count: Option<String>,
    video_count: Option<String>,
}

fn parse_count(value: Option<&str>) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

pub struct HttpYouTubeApi {
    http: reqwest::Client,
    upload_base: String,
    api_base: String,
}

impl HttpYouTubeApi {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            upload_base: UPLOAD_BASE.to_string(),
            api_base: API_BASE.to_string(),
        }
    }
}

#[async_trait]
impl YouTubeApi for HttpYouTubeApi {
    /// Resumable upload: open a session with the metadata, then send the bytes
    async fn upload_video(
        &self,
        token: &SecretString,
        video_url: &str,
        metadata: &VideoMetadata,
    ) -> Result<String, PlatformError> {
        let (data, media_type) = fetch_media(&self.http, video_url, MediaKind::Video).await?;

        let body = serde_json::json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
            },
            "status": {
                "privacyStatus": metadata.privacy_status,
                "selfDeclaredMadeForKids": false
            }
        });

        let resp = self
            .http
            .post(format!(
                "{}/videos?uploadType=resumable&part=snippet,status",
                self.upload_base
            ))
            .header("Authorization", bearer(token))
            .header("X-Upload-Content-Type", media_type.as_str())
            .header("X-Upload-Content-Length", data.len().to_string())
            .json(&body)
            .send()
            .await?;

        let session_url = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        read_body(SocialPlatform::YouTube, resp).await?;
        let session_url = session_url.ok_or_else(|| {
            PlatformError::Posting("YouTube did not return an upload session".to_string())
        })?;

        debug!("Uploading {} bytes to YouTube session", data.len());

        let resp = self
            .http
            .put(&session_url)
            .header("Authorization", bearer(token))
            .header("Content-Type", media_type)
            .body(data)
            .send()
            .await?;
        let video: VideoResource = read_json(SocialPlatform::YouTube, resp).await?;

        Ok(video.id)
    }

    async fn set_thumbnail(
        &self,
        token: &SecretString,
        video_id: &str,
        image_url: &str,
    ) -> Result<(), PlatformError> {
        let (data, media_type) = fetch_media(&self.http, image_url, MediaKind::Image).await?;

        let resp = self
            .http
            .post(format!("{}/thumbnails/set", self.upload_base))
            .query(&[("videoId", video_id)])
            .header("Authorization", bearer(token))
            .header("Content-Type", media_type)
            .body(data)
            .send()
            .await?;
        read_body(SocialPlatform::YouTube, resp).await?;

        Ok(())
    }

    async fn channel_statistics(&self, token: &SecretString) -> Result<ChannelStats, PlatformError> {
        let resp = self
            .http
            .get(format!("{}/channels", self.api_base))
            .query(&[("part", "snippet,statistics"), ("mine", "true")])
            .header("Authorization", bearer(token))
            .send()
            .await?;
        let text = read_body(SocialPlatform::YouTube, resp).await?;
        channel_stats_from_body(&text)
    }
}

fn channel_stats_from_body(text: &str) -> Result<ChannelStats, PlatformError> {
    let list: ChannelList = parse_json(SocialPlatform::YouTube, text)?;
    let channel = list.items.into_iter().next().ok_or_else(|| {
        PlatformError::Configuration("No YouTube channel found for this account".to_string())
    })?;

    let stats = channel.statistics;
    Ok(ChannelStats {
        channel_id: channel.id,
        title: channel.snippet.map(|s| s.title).unwrap_or_default(),
        subscriber_count: parse_count(stats.as_ref().and_then(|s| s.subscriber_count.as_deref())),
        view_count: parse_count(stats.as_ref().and_then(|s| s.view_count.as_deref())),
        video_count: parse_count(stats.as_ref().and_then(|s| s.video_count.as_deref())),
    })
}
