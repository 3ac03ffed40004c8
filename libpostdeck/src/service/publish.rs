//! Publishing a stored post to its target accounts
//!
//! Accounts are handled one after another. Each account runs token
//! validation and its platform publisher; whatever happens is recorded on
//! that account's publication and the loop moves on. The post row is claimed
//! (`publishing`) for the duration of the run so a second request for the same
//! post is rejected instead of publishing twice.
//!
//! The run itself is a spawned task: a caller that stops waiting (a dropped
//! HTTP request) does not abandon it halfway, and the claim is always released
//! by the task. A claim left behind by a process that died mid-run expires
//! after the configured claim timeout.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate, PublishSummary};
use crate::compose::{compose, ComposedContent};
use crate::db::{Database, PublicationTarget};
use crate::error::{PostdeckError, Result};
use crate::platforms::{PublishContext, PublisherRegistry};
use crate::token::TokenManager;
use crate::types::{Post, PostStatus, PublishResult, SocialAccount};

#[derive(Clone)]
pub struct PublishService {
    db: Arc<Database>,
    tokens: Arc<TokenManager>,
    publishers: Arc<PublisherRegistry>,
    claim_timeout_secs: i64,
}

/// Result of one publish run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    /// The post as stored after the run
    pub post: Post,
    pub results: Vec<PublishResult>,
    pub summary: PublishSummary,
}

/// Wire shape of a publish outcome shared by the HTTP API and `--format json`
///
/// The reconnection and warning fields are only present when set.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport<'a> {
    pub post: &'a Post,
    pub publish_results: &'a [PublishResult],
    pub success_count: usize,
    pub total_count: usize,
    pub message: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub has_warnings: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub needs_reconnection: bool,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub reconnection_platforms: &'a [String],
}

impl PublishOutcome {
    pub fn report(&self) -> PublishReport<'_> {
        PublishReport {
            post: &self.post,
            publish_results: &self.results,
            success_count: self.summary.success_count,
            total_count: self.summary.total_count,
            message: &self.summary.message,
            has_warnings: self.summary.has_warnings,
            needs_reconnection: self.summary.needs_reconnection,
            reconnection_platforms: &self.summary.reconnection_platforms,
        }
    }

    /// `{ success, data }` envelope; when nothing was published `success` is
    /// false and `error` carries the summary message
    pub fn envelope(&self) -> serde_json::Value {
        if self.summary.any_succeeded() {
            json!({ "success": true, "data": self.report() })
        } else {
            json!({
                "success": false,
                "error": self.summary.message,
                "data": self.report(),
            })
        }
    }
}

impl PublishService {
    pub fn new(
        db: Arc<Database>,
        tokens: Arc<TokenManager>,
        publishers: Arc<PublisherRegistry>,
        claim_timeout_secs: i64,
    ) -> Self {
        Self {
            db,
            tokens,
            publishers,
            claim_timeout_secs,
        }
    }

    /// Publish `post_id` on behalf of `user_id`
    ///
    /// # Errors
    ///
    /// - `NotFound` when the user owns no such post
    /// - `Precondition` when it is already published or has no active targets
    /// - `Conflict` when another run holds the post
    /// - `Database` when recording results fails; the post status is restored
    /// - `Internal` when the publish task panicked
    ///
    /// Platform failures are never errors here; they are reported per account
    /// in the outcome.
    pub async fn publish(&self, user_id: &str, post_id: &str) -> Result<PublishOutcome> {
        let post = self
            .db
            .get_post_for_user(post_id, user_id)
            .await?
            .ok_or_else(|| PostdeckError::NotFound(format!("Post {}", post_id)))?;

        if post.status == PostStatus::Published {
            return Err(PostdeckError::Precondition(
                "Post has already been published".to_string(),
            ));
        }

        let targets = self.db.get_publication_targets(post_id).await?;
        if targets.is_empty() {
            return Err(PostdeckError::Precondition(
                "No social accounts selected for this post".to_string(),
            ));
        }

        if !self
            .db
            .claim_post_for_publishing(post_id, user_id, self.claim_timeout_secs)
            .await?
        {
            return Err(PostdeckError::Conflict(
                "Post is already being published".to_string(),
            ));
        }

        // A stale claim was taken over; the earlier run never recorded a result
        let restore_status = match post.status {
            PostStatus::Publishing => {
                warn!("Taking over expired publishing claim on post {}", post_id);
                PostStatus::Failed
            }
            status => status,
        };

        info!(
            "Publishing post {} to {} account(s)",
            post_id,
            targets.len()
        );

        let service = self.clone();
        let task = tokio::spawn(async move {
            let result = service.run(&post, &targets).await;
            if result.is_err() {
                service.release(&post.id, restore_status).await;
            }
            result
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                self.release(post_id, restore_status).await;
                Err(PostdeckError::Internal(format!(
                    "Publish run for post {} did not complete: {}",
                    post_id, e
                )))
            }
        }
    }

    /// Put a claimed post back into `status` after a run failed
    async fn release(&self, post_id: &str, status: PostStatus) {
        if let Err(e) = self.db.update_post_status(post_id, status).await {
            warn!(
                "Failed to restore status of post {} after error: {}",
                post_id, e
            );
        }
    }

    async fn run(&self, post: &Post, targets: &[PublicationTarget]) -> Result<PublishOutcome> {
        let composed = compose(post);
        let mut results = Vec::with_capacity(targets.len());

        for target in targets {
            let result = self.publish_to_account(post, &composed, &target.account).await;

            match (&result.platform_post_id, &result.error) {
                (Some(platform_post_id), _) if result.success => {
                    self.db
                        .mark_publication_published(
                            &target.publication.id,
                            platform_post_id,
                            Utc::now().timestamp(),
                        )
                        .await?;
                }
                (_, error) => {
                    let message = error.as_deref().unwrap_or("Unknown error");
                    self.db
                        .mark_publication_failed(&target.publication.id, message)
                        .await?;
                }
            }

            results.push(result);
        }

        let summary = aggregate(&results);
        let published_at = summary.any_succeeded().then(|| Utc::now().timestamp());
        self.db
            .finish_post(&post.id, summary.status, published_at)
            .await?;

        info!("Post {}: {}", post.id, summary.message);

        let mut post = post.clone();
        post.status = summary.status;
        post.published_at = published_at;

        Ok(PublishOutcome {
            post,
            results,
            summary,
        })
    }

    /// Validate the token and publish to a single account
    async fn publish_to_account(
        &self,
        post: &Post,
        composed: &ComposedContent,
        account: &SocialAccount,
    ) -> PublishResult {
        let publisher = match self.publishers.resolve(&account.platform_name) {
            Ok(publisher) => publisher,
            Err(e) => return failed(&account.platform_name, account, e.to_string(), false),
        };
        let platform = publisher.platform();
        let label = platform.as_str();

        let validation = match self.tokens.validate_account(account, platform).await {
            Ok(validation) => validation,
            Err(e) => {
                return failed(label, account, format!("Token validation failed: {}", e), false)
            }
        };

        let access_token = match validation.access_token {
            Some(token) if validation.is_valid => token,
            _ => {
                let error = validation
                    .error
                    .unwrap_or_else(|| format!("{} needs reconnection", platform));
                return failed(label, account, error, validation.needs_reconnection);
            }
        };

        debug!(
            "Dispatching post {} to {} account {}",
            post.id, platform, account.account_name
        );

        let ctx = PublishContext {
            post,
            account,
            composed,
            access_token: &access_token,
        };

        match publisher.publish(&ctx).await {
            Ok(platform_post_id) => {
                info!(
                    "Published post {} to {} account {} as {}",
                    post.id, platform, account.account_name, platform_post_id
                );
                PublishResult::succeeded(
                    label.to_string(),
                    account.account_name.clone(),
                    platform_post_id,
                )
            }
            Err(e) => failed(label, account, e.to_string(), e.needs_reconnection()),
        }
    }
}

fn failed(
    platform: &str,
    account: &SocialAccount,
    error: String,
    needs_reconnection: bool,
) -> PublishResult {
    warn!(
        "Publishing to {} account {} failed: {}",
        platform, account.account_name, error
    );
    PublishResult::failed(
        platform.to_string(),
        account.account_name.clone(),
        error,
        needs_reconnection,
    )
}
