//! LinkedIn publishing through the versioned REST API
//!
//! The publisher forwards every image and video; the client decides what a
//! LinkedIn post can carry (one video, otherwise up to 20 images).

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    bearer, fetch_media, parse_json, read_body, MediaKind, PlatformPublisher, PublishContext,
};
use crate::error::PlatformError;
use crate::types::SocialPlatform;

const API_BASE: &str = "https://api.linkedin.com/rest";
const API_VERSION: &str = "202405";
const MAX_IMAGES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedInPostRequest {
    pub author_urn: String,
    pub text: String,
    pub images: Vec<String>,
    pub videos: Vec<String>,
}

#[async_trait]
pub trait LinkedInApi: Send + Sync {
    /// Create a post and return its URN
    async fn create_post(
        &self,
        token: &SecretString,
        request: &LinkedInPostRequest,
    ) -> Result<String, PlatformError>;
}

pub struct LinkedInPublisher {
    api: Arc<dyn LinkedInApi>,
}

impl LinkedInPublisher {
    pub fn new(api: Arc<dyn LinkedInApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PlatformPublisher for LinkedInPublisher {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::LinkedIn
    }

    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<String, PlatformError> {
        let author_urn = ctx
            .account
            .metadata()
            .author_urn
            .unwrap_or_else(|| format!("urn:li:person:{}", ctx.account.account_id));

        let request = LinkedInPostRequest {
            author_urn,
            text: ctx.composed.text.clone(),
            images: ctx.composed.images.as_slice().to_vec(),
            videos: ctx.composed.videos.as_slice().to_vec(),
        };

        self.api.create_post(ctx.access_token, &request).await
    }
}

/// What a single LinkedIn post ends up carrying
#[derive(Debug, PartialEq, Eq)]
enum PostMedia<'a> {
    None,
    Video(&'a str),
    Images(&'a [String]),
}

fn select_media(request: &LinkedInPostRequest) -> PostMedia<'_> {
    if let Some(video) = request.videos.first() {
        if !request.images.is_empty() || request.videos.len() > 1 {
            debug!("LinkedIn post carries one video; other media dropped");
        }
        return PostMedia::Video(video);
    }

    if request.images.is_empty() {
        return PostMedia::None;
    }

    if request.images.len() > MAX_IMAGES {
        warn!(
            "LinkedIn accepts at most {} images, dropping {}",
            MAX_IMAGES,
            request.images.len() - MAX_IMAGES
        );
    }
    let end = request.images.len().min(MAX_IMAGES);
    PostMedia::Images(&request.images[..end])
}

fn post_body(author_urn: &str, text: &str, media_urns: &[String]) -> serde_json::Value {
    let mut body = serde_json::json!({
        "author": author_urn,
        "commentary": text,
        "visibility": "PUBLIC",
        "distribution": {
            "feedDistribution": "MAIN_FEED",
            "targetEntities": [],
            "thirdPartyDistributionChannels": []
        },
        "lifecycleState": "PUBLISHED",
        "isReshareDisabledByAuthor": false
    });

    match media_urns {
        [] => {}
        [single] => {
            body["content"] = serde_json::json!({ "media": { "id": single } });
        }
        many => {
            let images: Vec<_> = many
                .iter()
                .map(|urn| serde_json::json!({ "id": urn }))
                .collect();
            body["content"] = serde_json::json!({ "multiImage": { "images": images } });
        }
    }

    body
}

// ============================================================================
// HTTP client
// ============================================================================

#[derive(Debug, Deserialize)]
struct InitializeResponse<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageUpload {
    upload_url: String,
    image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoUpload {
    video: String,
    #[serde(default)]
    upload_token: String,
    upload_instructions: Vec<UploadInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadInstruction {
    upload_url: String,
    first_byte: u64,
    last_byte: u64,
}

pub struct HttpLinkedInApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLinkedInApi {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: API_BASE.to_string(),
        }
    }

    fn rest(&self, method: reqwest::Method, path: &str, token: &SecretString) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", bearer(token))
            .header("LinkedIn-Version", API_VERSION)
            .header("X-Restli-Protocol-Version", "2.0.0")
    }

    async fn upload_image(
        &self,
        token: &SecretString,
        owner: &str,
        url: &str,
    ) -> Result<String, PlatformError> {
        let body = serde_json::json!({ "initializeUploadRequest": { "owner": owner } });
        let resp = self
            .rest(reqwest::Method::POST, "/images?action=initializeUpload", token)
            .json(&body)
            .send()
            .await?;
        let text = read_body(SocialPlatform::LinkedIn, resp).await?;
        let init: InitializeResponse<ImageUpload> = parse_json(SocialPlatform::LinkedIn, &text)?;

        let (data, media_type) = fetch_media(&self.http, url, MediaKind::Image).await?;
        let resp = self
            .http
            .put(&init.value.upload_url)
            .header("Authorization", bearer(token))
            .header("Content-Type", media_type)
            .body(data)
            .send()
            .await?;
        read_body(SocialPlatform::LinkedIn, resp).await?;

        Ok(init.value.image)
    }

    async fn upload_video(
        &self,
        token: &SecretString,
        owner: &str,
        url: &str,
    ) -> Result<String, PlatformError> {
        let (data, _) = fetch_media(&self.http, url, MediaKind::Video).await?;

        let body = serde_json::json!({
            "initializeUploadRequest": {
                "owner": owner,
                "fileSizeBytes": data.len(),
                "uploadCaptions": false,
                "uploadThumbnail": false
            }
        });
        let resp = self
            .rest(reqwest::Method::POST, "/videos?action=initializeUpload", token)
            .json(&body)
            .send()
            .await?;
        let text = read_body(SocialPlatform::LinkedIn, resp).await?;
        let init: InitializeResponse<VideoUpload> = parse_json(SocialPlatform::LinkedIn, &text)?;

        let mut part_ids = Vec::with_capacity(init.value.upload_instructions.len());
        for instruction in &init.value.upload_instructions {
            let start = instruction.first_byte as usize;
            let end = (instruction.last_byte as usize + 1).min(data.len());
            let chunk = data.get(start..end).ok_or_else(|| {
                PlatformError::Posting(format!(
                    "LinkedIn upload range {}-{} exceeds video size {}",
                    instruction.first_byte,
                    instruction.last_byte,
                    data.len()
                ))
            })?;

            let resp = self
                .http
                .put(&instruction.upload_url)
                .header("Content-Type", "application/octet-stream")
                .body(chunk.to_vec())
                .send()
                .await?;
            let etag = resp
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            read_body(SocialPlatform::LinkedIn, resp).await?;

            part_ids.push(etag.ok_or_else(|| {
                PlatformError::Posting("LinkedIn upload part returned no ETag".to_string())
            })?);
        }

        let body = serde_json::json!({
            "finalizeUploadRequest": {
                "video": init.value.video,
                "uploadToken": init.value.upload_token,
                "uploadedPartIds": part_ids
            }
        });
        let resp = self
            .rest(reqwest::Method::POST, "/videos?action=finalizeUpload", token)
            .json(&body)
            .send()
            .await?;
        read_body(SocialPlatform::LinkedIn, resp).await?;

        Ok(init.value.video)
    }
}

#[async_trait]
impl LinkedInApi for HttpLinkedInApi {
    async fn create_post(
        &self,
        token: &SecretString,
        request: &LinkedInPostRequest,
    ) -> Result<String, PlatformError> {
        let owner = request.author_urn.as_str();

        let media_urns = match select_media(request) {
            PostMedia::None => Vec::new(),
            PostMedia::Video(url) => vec![self.upload_video(token, owner, url).await?],
            PostMedia::Images(urls) => {
                let mut urns = Vec::with_capacity(urls.len());
                for url in urls {
                    urns.push(self.upload_image(token, owner, url).await?);
                }
                urns
            }
        };

        let body = post_body(owner, &request.text, &media_urns);
        let resp = self
            .rest(reqwest::Method::POST, "/posts", token)
            .json(&body)
            .send()
            .await?;

        let post_urn = resp
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        read_body(SocialPlatform::LinkedIn, resp).await?;

        post_urn.ok_or_else(|| {
            PlatformError::Posting("LinkedIn did not return the new post id".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{ComposedContent, MediaList};
    use crate::platforms::mock::{MockApi, MockCall};
    use crate::types::{Post, SocialAccount};

    fn request(images: &[&str], videos: &[&str]) -> LinkedInPostRequest {
        LinkedInPostRequest {
            author_urn: "urn:li:person:abc".to_string(),
            text: "hello".to_string(),
            images: images.iter().map(|s| s.to_string()).collect(),
            videos: videos.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn publish(api: Arc<MockApi>, account: &SocialAccount) -> Result<String, PlatformError> {
        let post = Post::new("user-1".to_string(), "Hello".to_string());
        let composed = ComposedContent {
            text: "Hello".to_string(),
            images: ["a.png", "b.png"].into_iter().collect::<MediaList>(),
            videos: ["v.mp4"].into_iter().collect::<MediaList>(),
        };
        let token = SecretString::from("token".to_string());
        let ctx = PublishContext {
            post: &post,
            account,
            composed: &composed,
            access_token: &token,
        };
        LinkedInPublisher::new(api).publish(&ctx).await
    }

    fn account(metadata: Option<&str>) -> SocialAccount {
        let mut account = SocialAccount::new(
            "user-1".to_string(),
            SocialPlatform::LinkedIn,
            "abc".to_string(),
            "Jane".to_string(),
        );
        account.metadata = metadata.map(str::to_string);
        account
    }

    #[tokio::test]
    async fn test_all_media_passed_through_with_person_urn() {
        let api = Arc::new(MockApi::new());

        publish(api.clone(), &account(None)).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![MockCall::LinkedInPost(LinkedInPostRequest {
                author_urn: "urn:li:person:abc".to_string(),
                text: "Hello".to_string(),
                images: vec!["a.png".to_string(), "b.png".to_string()],
                videos: vec!["v.mp4".to_string()],
            })]
        );
    }

    #[tokio::test]
    async fn test_author_urn_from_metadata() {
        let api = Arc::new(MockApi::new());

        publish(
            api.clone(),
            &account(Some(r#"{"authorUrn":"urn:li:organization:42"}"#)),
        )
        .await
        .unwrap();

        match &api.calls()[0] {
            MockCall::LinkedInPost(request) => {
                assert_eq!(request.author_urn, "urn:li:organization:42")
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_select_media_video_wins() {
        assert_eq!(
            select_media(&request(&["a.png"], &["v.mp4"])),
            PostMedia::Video("v.mp4")
        );
    }

    #[test]
    fn test_select_media_caps_images() {
        let urls: Vec<String> = (0..25).map(|i| format!("{}.png", i)).collect();
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let req = request(&refs, &[]);

        match select_media(&req) {
            PostMedia::Images(images) => assert_eq!(images.len(), MAX_IMAGES),
            other => panic!("unexpected selection {:?}", other),
        }
        assert_eq!(select_media(&request(&[], &[])), PostMedia::None);
    }

    #[test]
    fn test_post_body_shapes() {
        let text_only = post_body("urn:a", "hi", &[]);
        assert!(text_only.get("content").is_none());
        assert_eq!(text_only["commentary"], "hi");

        let single = post_body("urn:a", "hi", &["urn:li:image:1".to_string()]);
        assert_eq!(single["content"]["media"]["id"], "urn:li:image:1");

        let multi = post_body(
            "urn:a",
            "hi",
            &["urn:li:image:1".to_string(), "urn:li:image:2".to_string()],
        );
        assert_eq!(multi["content"]["multiImage"]["images"][1]["id"], "urn:li:image:2");
    }
}
