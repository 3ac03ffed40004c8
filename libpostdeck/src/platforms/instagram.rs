//! Instagram publishing via the Graph API content publishing flow
//!
//! A post is either one video (published as a reel), one image, or a
//! carousel of images. Video and images never mix: when both are present the
//! video is used.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::graph::{read_graph_json, IdResponse, GRAPH_BASE};
use super::{PlatformPublisher, PublishContext};
use crate::error::PlatformError;
use crate::types::SocialPlatform;

const MAX_CAROUSEL_ITEMS: usize = 10;
const MAX_STATUS_POLLS: usize = 60;
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[async_trait]
pub trait InstagramApi: Send + Sync {
    async fn publish_image(
        &self,
        token: &SecretString,
        ig_user_id: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<String, PlatformError>;

    async fn publish_video(
        &self,
        token: &SecretString,
        ig_user_id: &str,
        video_url: &str,
        caption: &str,
    ) -> Result<String, PlatformError>;

    async fn publish_carousel(
        &self,
        token: &SecretString,
        ig_user_id: &str,
        image_urls: &[String],
        caption: &str,
    ) -> Result<String, PlatformError>;
}

pub struct InstagramPublisher {
    api: Arc<dyn InstagramApi>,
}

impl InstagramPublisher {
    pub fn new(api: Arc<dyn InstagramApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PlatformPublisher for InstagramPublisher {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::Instagram
    }

    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<String, PlatformError> {
        let composed = ctx.composed;
        let ig_user_id = ctx.account.account_id.as_str();
        let caption = composed.text.as_str();

        if let Some(video) = composed.videos.first() {
            if !composed.images.is_empty() {
                warn!(
                    "Instagram cannot mix video and images; publishing video {} and dropping {} image(s)",
                    video,
                    composed.images.len()
                );
            }
            return self
                .api
                .publish_video(ctx.access_token, ig_user_id, video, caption)
                .await;
        }

        match composed.images.len() {
            0 => Err(PlatformError::Validation(
                "Instagram posts require an image or video".to_string(),
            )),
            1 => {
                let image = composed.images.as_slice()[0].as_str();
                self.api
                    .publish_image(ctx.access_token, ig_user_id, image, caption)
                    .await
            }
            _ => {
                self.api
                    .publish_carousel(ctx.access_token, ig_user_id, composed.images.as_slice(), caption)
                    .await
            }
        }
    }
}

// ============================================================================
// HTTP client
// ============================================================================

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    status_code: Option<String>,
    status: Option<String>,
}

pub struct HttpInstagramApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpInstagramApi {
    pub fn new(http: reqwest::Client, graph_version: &str) -> Self {
        Self {
            http,
            base_url: format!("{}/{}", GRAPH_BASE, graph_version),
        }
    }

    async fn create_container(
        &self,
        token: &SecretString,
        ig_user_id: &str,
        params: &[(&str, &str)],
    ) -> Result<String, PlatformError> {
        let resp = self
            .http
            .post(format!("{}/{}/media", self.base_url, ig_user_id))
            .query(&[("access_token", token.expose_secret())])
            .form(params)
            .send()
            .await?;
        let created: IdResponse = read_graph_json(SocialPlatform::Instagram, resp).await?;
        Ok(created.id)
    }

    /// Poll until the container leaves IN_PROGRESS
    async fn wait_until_ready(
        &self,
        token: &SecretString,
        container_id: &str,
    ) -> Result<(), PlatformError> {
        for _ in 0..MAX_STATUS_POLLS {
            let resp = self
                .http
                .get(format!("{}/{}", self.base_url, container_id))
                .query(&[
                    ("fields", "status_code,status"),
                    ("access_token", token.expose_secret()),
                ])
                .send()
                .await?;
            let status: ContainerStatus = read_graph_json(SocialPlatform::Instagram, resp).await?;

            match status.status_code.as_deref() {
                Some("FINISHED") | Some("PUBLISHED") | None => return Ok(()),
                Some("ERROR") | Some("EXPIRED") => {
                    return Err(PlatformError::ContentRejected(format!(
                        "Instagram could not process media container {}: {}",
                        container_id,
                        status.status.unwrap_or_default()
                    )))
                }
                Some(other) => {
                    debug!("Instagram container {} is {}", container_id, other);
                    tokio::time::sleep(STATUS_POLL_INTERVAL).await;
                }
            }
        }

        Err(PlatformError::Network(format!(
            "Instagram container {} still processing after {} checks",
            container_id, MAX_STATUS_POLLS
        )))
    }

    async fn publish_container(
        &self,
        token: &SecretString,
        ig_user_id: &str,
        container_id: &str,
    ) -> Result<String, PlatformError> {
        self.wait_until_ready(token, container_id).await?;

        let resp = self
            .http
            .post(format!("{}/{}/media_publish", self.base_url, ig_user_id))
            .query(&[("access_token", token.expose_secret())])
            .form(&[("creation_id", container_id)])
            .send()
            .await?;
        let published: IdResponse = read_graph_json(SocialPlatform::Instagram, resp).await?;
        Ok(published.id)
    }
}

#[async_trait]
impl InstagramApi for HttpInstagramApi {
    async fn publish_image(
        &self,
        token: &SecretString,
        ig_user_id: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<String, PlatformError> {
        let container = self
            .create_container(token, ig_user_id, &[("image_url", image_url), ("caption", caption)])
            .await?;
        self.publish_container(token, ig_user_id, &container).await
    }

    async fn publish_video(
        &self,
        token: &SecretString,
        ig_user_id: &str,
        video_url: &str,
        caption: &str,
    ) -> Result<String, PlatformError> {
        let container = self
            .create_container(
                token,
                ig_user_id,
                &[("media_type", "REELS"), ("video_url", video_url), ("caption", caption)],
            )
            .await?;
        self.publish_container(token, ig_user_id, &container).await
    }

    async fn publish_carousel(
        &self,
        token: &SecretString,
        ig_user_id: &str,
        image_urls: &[String],
        caption: &str,
    ) -> Result<String, PlatformError> {
        if image_urls.len() > MAX_CAROUSEL_ITEMS {
            warn!(
                "Instagram carousels hold at most {} items, dropping {}",
                MAX_CAROUSEL_ITEMS,
                image_urls.len() - MAX_CAROUSEL_ITEMS
            );
        }

        let mut children = Vec::new();
        for url in image_urls.iter().take(MAX_CAROUSEL_ITEMS) {
            let child = self
                .create_container(
                    token,
                    ig_user_id,
                    &[("image_url", url.as_str()), ("is_carousel_item", "true")],
                )
                .await?;
            children.push(child);
        }

        let children = children.join(",");
        let container = self
            .create_container(
                token,
                ig_user_id,
                &[
                    ("media_type", "CAROUSEL"),
                    ("children", children.as_str()),
                    ("caption", caption),
                ],
            )
            .await?;
        self.publish_container(token, ig_user_id, &container).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{ComposedContent, MediaList};
    use crate::platforms::mock::{MockApi, MockCall};
    use crate::types::{Post, SocialAccount};

    async fn publish(
        api: Arc<MockApi>,
        images: &[&str],
        videos: &[&str],
    ) -> Result<String, PlatformError> {
        let post = Post::new("user-1".to_string(), "Hello".to_string());
        let account = SocialAccount::new(
            "user-1".to_string(),
            SocialPlatform::Instagram,
            "ig-1".to_string(),
            "brand".to_string(),
        );
        let composed = ComposedContent {
            text: "caption".to_string(),
            images: images.iter().copied().collect::<MediaList>(),
            videos: videos.iter().copied().collect::<MediaList>(),
        };
        let token = SecretString::from("token".to_string());
        let ctx = PublishContext {
            post: &post,
            account: &account,
            composed: &composed,
            access_token: &token,
        };
        InstagramPublisher::new(api).publish(&ctx).await
    }

    #[tokio::test]
    async fn test_video_wins_over_image() {
        let api = Arc::new(MockApi::new());

        publish(api.clone(), &["a.png"], &["v.mp4"]).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![MockCall::InstagramVideo {
                ig_user_id: "ig-1".to_string(),
                url: "v.mp4".to_string(),
                caption: "caption".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_single_image() {
        let api = Arc::new(MockApi::new());

        publish(api.clone(), &["a.png"], &[]).await.unwrap();

        assert!(matches!(
            api.calls().as_slice(),
            [MockCall::InstagramImage { url, .. }] if url == "a.png"
        ));
    }

    #[tokio::test]
    async fn test_multiple_images_become_carousel() {
        let api = Arc::new(MockApi::new());

        publish(api.clone(), &["a.png", "b.png"], &[]).await.unwrap();

        assert!(matches!(
            api.calls().as_slice(),
            [MockCall::InstagramCarousel { urls, .. }] if urls.len() == 2
        ));
    }

    #[tokio::test]
    async fn test_no_media_is_validation_error() {
        let api = Arc::new(MockApi::new());

        let err = publish(api.clone(), &[], &[]).await.unwrap_err();

        assert!(matches!(err, PlatformError::Validation(_)));
        assert!(api.calls().is_empty());
    }
}
