//! Facebook Page publishing
//!
//! Posts always go to a Page. BUSINESS accounts are Page connections
//! themselves; any other account has to resolve to exactly one Page, either
//! the one selected in the account metadata or the only Page the user manages.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::graph::{read_graph_json, IdResponse, GRAPH_BASE};
use super::{PlatformPublisher, PublishContext};
use crate::error::PlatformError;
use crate::types::{AccountType, SocialPlatform};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FacebookPage {
    pub id: String,
    pub name: String,
    /// Page access token, when the listing includes it
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacebookPostRequest {
    pub page_id: String,
    pub message: String,
    pub images: Vec<String>,
    pub video: Option<String>,
}

#[async_trait]
pub trait FacebookApi: Send + Sync {
    /// Pages managed by the user owning `token`
    async fn get_user_pages(&self, token: &SecretString) -> Result<Vec<FacebookPage>, PlatformError>;

    /// Publish to a Page and return the new post id
    async fn publish_to_page(
        &self,
        page_token: &SecretString,
        request: &FacebookPostRequest,
    ) -> Result<String, PlatformError>;
}

pub struct FacebookPublisher {
    api: Arc<dyn FacebookApi>,
}

impl FacebookPublisher {
    pub fn new(api: Arc<dyn FacebookApi>) -> Self {
        Self { api }
    }
}

/// Choose the Page a personal connection publishes to
pub fn resolve_page<'a>(
    pages: &'a [FacebookPage],
    selected_page_id: Option<&str>,
) -> Result<&'a FacebookPage, PlatformError> {
    if let Some(selected) = selected_page_id {
        return pages.iter().find(|page| page.id == selected).ok_or_else(|| {
            PlatformError::Configuration(format!(
                "Selected Facebook Page {} is no longer available to this account; select another Page",
                selected
            ))
        });
    }

    match pages {
        [page] => Ok(page),
        [] => Err(PlatformError::Configuration(
            "This Facebook account manages no Pages; connect a Page to publish".to_string(),
        )),
        many => {
            let names: Vec<&str> = many.iter().map(|page| page.name.as_str()).collect();
            Err(PlatformError::Configuration(format!(
                "This Facebook account manages multiple Pages ({}); select one in the account settings",
                names.join(", ")
            )))
        }
    }
}

#[async_trait]
impl PlatformPublisher for FacebookPublisher {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::Facebook
    }

    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<String, PlatformError> {
        let mut page_secret: Option<SecretString> = None;
        let page_id = if ctx.account.account_type == AccountType::Business {
            ctx.account.account_id.clone()
        } else {
            let pages = self.api.get_user_pages(ctx.access_token).await?;
            let selected = ctx.account.metadata().selected_page_id;
            let page = resolve_page(&pages, selected.as_deref())?;
            debug!("Publishing to Facebook Page {} ({})", page.name, page.id);

            page_secret = page.access_token.clone().map(SecretString::from);
            page.id.clone()
        };
        let page_token = page_secret.as_ref().unwrap_or(ctx.access_token);

        let composed = ctx.composed;
        let video = composed.videos.first().map(str::to_string);
        let images = if video.is_some() {
            if !composed.images.is_empty() {
                debug!("Facebook video post; dropping {} image(s)", composed.images.len());
            }
            Vec::new()
        } else {
            composed.images.as_slice().to_vec()
        };

        let request = FacebookPostRequest {
            page_id,
            message: composed.text.clone(),
            images,
            video,
        };

        self.api.publish_to_page(page_token, &request).await
    }
}

// ============================================================================
// HTTP client
// ============================================================================

#[derive(Debug, Deserialize)]
struct PageList {
    #[serde(default)]
    data: Vec<FacebookPage>,
}

#[derive(Debug, Deserialize)]
struct PhotoResponse {
    id: String,
    post_id: Option<String>,
}

pub struct HttpFacebookApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpFacebookApi {
    pub fn new(http: reqwest::Client, graph_version: &str) -> Self {
        Self {
            http,
            base_url: format!("{}/{}", GRAPH_BASE, graph_version),
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        token: &SecretString,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, PlatformError> {
        let resp = self
            .http
            .post(format!("{}/{}", self.base_url, path))
            .query(&[("access_token", token.expose_secret())])
            .form(params)
            .send()
            .await?;
        read_graph_json(SocialPlatform::Facebook, resp).await
    }
}

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl FacebookApi for HttpFacebookApi {
    async fn get_user_pages(&self, token: &SecretString) -> Result<Vec<FacebookPage>, PlatformError> {
        let resp = self
            .http
            .get(format!("{}/me/accounts", self.base_url))
            .query(&[
                ("fields", "id,name,access_token"),
                ("access_token", token.expose_secret()),
            ])
            .send()
            .await?;
        let list: PageList = read_graph_json(SocialPlatform::Facebook, resp).await?;
        Ok(list.data)
    }

    async fn publish_to_page(
        &self,
        page_token: &SecretString,
        request: &FacebookPostRequest,
    ) -> Result<String, PlatformError> {
        let page = request.page_id.as_str();

        if let Some(video) = &request.video {
            let created: IdResponse = self
                .post_form(
                    page_token,
                    &format!("{}/videos", page),
                    &params(&[("file_url", video.as_str()), ("description", request.message.as_str())]),
                )
                .await?;
            return Ok(created.id);
        }

        match request.images.as_slice() {
            [] => {
                let created: IdResponse = self
                    .post_form(
                        page_token,
                        &format!("{}/feed", page),
                        &params(&[("message", request.message.as_str())]),
                    )
                    .await?;
                Ok(created.id)
            }
            [image] => {
                let photo: PhotoResponse = self
                    .post_form(
                        page_token,
                        &format!("{}/photos", page),
                        &params(&[("url", image.as_str()), ("caption", request.message.as_str())]),
                    )
                    .await?;
                Ok(photo.post_id.unwrap_or(photo.id))
            }
            images => {
                // Upload unpublished photos, then attach them to one feed post
                let mut form = params(&[("message", request.message.as_str())]);
                for (i, image) in images.iter().enumerate() {
                    let photo: PhotoResponse = self
                        .post_form(
                            page_token,
                            &format!("{}/photos", page),
                            &params(&[("url", image.as_str()), ("published", "false")]),
                        )
                        .await?;
                    form.push((
                        format!("attached_media[{}]", i),
                        serde_json::json!({ "media_fbid": photo.id }).to_string(),
                    ));
                }

                let created: IdResponse = self
                    .post_form(page_token, &format!("{}/feed", page), &form)
                    .await?;
                Ok(created.id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{ComposedContent, MediaList};
    use crate::platforms::mock::{MockApi, MockCall};
    use crate::types::{Post, SocialAccount};

    fn page(id: &str, name: &str, token: Option<&str>) -> FacebookPage {
        FacebookPage {
            id: id.to_string(),
            name: name.to_string(),
            access_token: token.map(str::to_string),
        }
    }

    fn account(account_type: AccountType, metadata: Option<&str>) -> SocialAccount {
        let mut account = SocialAccount::new(
            "user-1".to_string(),
            SocialPlatform::Facebook,
            "fb-1".to_string(),
            "Jane".to_string(),
        );
        account.account_type = account_type;
        account.metadata = metadata.map(str::to_string);
        account
    }

    async fn publish(
        api: Arc<MockApi>,
        account: &SocialAccount,
        images: &[&str],
        videos: &[&str],
    ) -> Result<String, PlatformError> {
        let post = Post::new("user-1".to_string(), "Hello".to_string());
        let composed = ComposedContent {
            text: "Hello".to_string(),
            images: images.iter().copied().collect::<MediaList>(),
            videos: videos.iter().copied().collect::<MediaList>(),
        };
        let token = SecretString::from("user-token".to_string());
        let ctx = PublishContext {
            post: &post,
            account,
            composed: &composed,
            access_token: &token,
        };
        FacebookPublisher::new(api).publish(&ctx).await
    }

    #[test]
    fn test_resolve_single_page() {
        let pages = vec![page("p1", "Shop", None)];
        assert_eq!(resolve_page(&pages, None).unwrap().id, "p1");
    }

    #[test]
    fn test_resolve_selected_page() {
        let pages = vec![page("p1", "Shop", None), page("p2", "Blog", None)];
        assert_eq!(resolve_page(&pages, Some("p2")).unwrap().id, "p2");

        let err = resolve_page(&pages, Some("p9")).unwrap_err();
        assert!(matches!(err, PlatformError::Configuration(_)));
    }

    #[test]
    fn test_resolve_no_pages() {
        let err = resolve_page(&[], None).unwrap_err();
        assert!(err.to_string().contains("no Pages"));
    }

    #[tokio::test]
    async fn test_multiple_pages_without_selection_never_posts() {
        let api = Arc::new(MockApi::new().with_pages(vec![
            page("p1", "Shop", Some("t1")),
            page("p2", "Blog", Some("t2")),
        ]));

        let err = publish(api.clone(), &account(AccountType::Personal, None), &[], &[])
            .await
            .unwrap_err();

        assert!(matches!(err, PlatformError::Configuration(_)));
        assert!(err.to_string().contains("multiple Pages"));
        assert_eq!(api.calls(), vec![MockCall::FacebookPages]);
    }

    #[tokio::test]
    async fn test_business_account_posts_directly() {
        let api = Arc::new(MockApi::new());

        publish(api.clone(), &account(AccountType::Business, None), &["a.png"], &[])
            .await
            .unwrap();

        assert_eq!(
            api.calls(),
            vec![MockCall::FacebookPost {
                page_token: "user-token".to_string(),
                request: FacebookPostRequest {
                    page_id: "fb-1".to_string(),
                    message: "Hello".to_string(),
                    images: vec!["a.png".to_string()],
                    video: None,
                },
            }]
        );
    }

    #[tokio::test]
    async fn test_selected_page_uses_page_token_and_video_wins() {
        let api = Arc::new(MockApi::new().with_pages(vec![
            page("p1", "Shop", Some("t1")),
            page("p2", "Blog", Some("t2")),
        ]));

        publish(
            api.clone(),
            &account(AccountType::Personal, Some(r#"{"selectedPageId":"p2"}"#)),
            &["a.png"],
            &["v.mp4"],
        )
        .await
        .unwrap();

        assert_eq!(
            api.calls()[1],
            MockCall::FacebookPost {
                page_token: "t2".to_string(),
                request: FacebookPostRequest {
                    page_id: "p2".to_string(),
                    message: "Hello".to_string(),
                    images: vec![],
                    video: Some("v.mp4".to_string()),
                },
            }
        );
    }
}
