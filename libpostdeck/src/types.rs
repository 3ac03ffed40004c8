//! Core types for Postdeck

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PlatformError;

/// A unit of content owned by a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    /// Comma-separated or JSON-array encoded hashtags
    pub hashtags: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// JSON-encoded array of additional image URLs
    pub images: Option<String>,
    pub video_url: Option<String>,
    /// JSON-encoded array of additional video URLs
    pub videos: Option<String>,
    pub status: PostStatus,
    pub scheduled_at: Option<i64>,
    pub published_at: Option<i64>,
    pub created_at: i64,
}

impl Post {
    pub fn new(user_id: String, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            content,
            hashtags: None,
            title: None,
            description: None,
            image_url: None,
            images: None,
            video_url: None,
            videos: None,
            status: PostStatus::Draft,
            scheduled_at: None,
            published_at: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    Draft,
    Scheduled,
    /// Held while a publish run is in flight
    Publishing,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("Unknown post status: {}", other)),
        }
    }
}

/// One platform-delivery attempt linking a post to a social account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub id: String,
    pub post_id: String,
    pub social_account_id: String,
    pub status: PublicationStatus,
    pub platform_post_id: Option<String>,
    pub error_message: Option<String>,
    pub published_at: Option<i64>,
}

impl Publication {
    pub fn new_pending(post_id: String, social_account_id: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            post_id,
            social_account_id,
            status: PublicationStatus::Pending,
            platform_post_id: None,
            error_message: None,
            published_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationStatus {
    Pending,
    Published,
    Failed,
}

impl PublicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationStatus::Pending => "pending",
            PublicationStatus::Published => "published",
            PublicationStatus::Failed => "failed",
        }
    }
}

impl FromStr for PublicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PublicationStatus::Pending),
            "published" => Ok(PublicationStatus::Published),
            "failed" => Ok(PublicationStatus::Failed),
            other => Err(format!("Unknown publication status: {}", other)),
        }
    }
}

/// The closed set of platforms Postdeck can publish to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SocialPlatform {
    Twitter,
    LinkedIn,
    Instagram,
    YouTube,
    Facebook,
}

impl SocialPlatform {
    pub const ALL: [SocialPlatform; 5] = [
        SocialPlatform::Twitter,
        SocialPlatform::LinkedIn,
        SocialPlatform::Instagram,
        SocialPlatform::YouTube,
        SocialPlatform::Facebook,
    ];

    /// Storage representation (matches the values written by the dashboard)
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialPlatform::Twitter => "TWITTER",
            SocialPlatform::LinkedIn => "LINKEDIN",
            SocialPlatform::Instagram => "INSTAGRAM",
            SocialPlatform::YouTube => "YOUTUBE",
            SocialPlatform::Facebook => "FACEBOOK",
        }
    }

    /// Human-readable name used in messages
    pub fn display_name(&self) -> &'static str {
        match self {
            SocialPlatform::Twitter => "Twitter",
            SocialPlatform::LinkedIn => "LinkedIn",
            SocialPlatform::Instagram => "Instagram",
            SocialPlatform::YouTube => "YouTube",
            SocialPlatform::Facebook => "Facebook",
        }
    }
}

impl std::fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for SocialPlatform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TWITTER" | "X" => Ok(SocialPlatform::Twitter),
            "LINKEDIN" => Ok(SocialPlatform::LinkedIn),
            "INSTAGRAM" => Ok(SocialPlatform::Instagram),
            "YOUTUBE" => Ok(SocialPlatform::YouTube),
            "FACEBOOK" => Ok(SocialPlatform::Facebook),
            _ => Err(PlatformError::Unsupported(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Personal,
    Business,
    Creator,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Personal => "PERSONAL",
            AccountType::Business => "BUSINESS",
            AccountType::Creator => "CREATOR",
        }
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PERSONAL" => Ok(AccountType::Personal),
            "BUSINESS" => Ok(AccountType::Business),
            "CREATOR" => Ok(AccountType::Creator),
            other => Err(format!("Unknown account type: {}", other)),
        }
    }
}

/// A connected external platform identity
///
/// `platform` keeps the stored text so that rows written for platforms this
/// build does not know about still load; [`SocialAccount::platform`] parses it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SocialAccount {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "platform")]
    pub platform_name: String,
    pub account_id: String,
    pub account_name: String,
    pub account_type: AccountType,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub is_active: bool,
    pub metadata: Option<String>,
}

impl SocialAccount {
    pub fn new(
        user_id: String,
        platform: SocialPlatform,
        account_id: String,
        account_name: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            platform_name: platform.as_str().to_string(),
            account_id,
            account_name,
            account_type: AccountType::Personal,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            is_active: true,
            metadata: None,
        }
    }

    pub fn platform(&self) -> Result<SocialPlatform, PlatformError> {
        self.platform_name.parse()
    }

    /// Parsed platform-specific extras; malformed metadata reads as empty
    pub fn metadata(&self) -> AccountMetadata {
        match self.metadata.as_deref() {
            Some(raw) if !raw.trim().is_empty() => match serde_json::from_str(raw) {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(
                        "Ignoring malformed metadata on account {}: {}",
                        self.id,
                        e
                    );
                    AccountMetadata::default()
                }
            },
            _ => AccountMetadata::default(),
        }
    }
}

/// Platform-specific extras stored alongside a social account
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountMetadata {
    /// Facebook Page chosen by the user when several are connected
    pub selected_page_id: Option<String>,
    /// LinkedIn author URN (person or organization)
    pub author_urn: Option<String>,
}

/// Per-account outcome of one publish attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub platform: String,
    pub account_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub needs_reconnection: bool,
}

impl PublishResult {
    pub fn succeeded(platform: String, account_name: String, platform_post_id: String) -> Self {
        Self {
            platform,
            account_name,
            success: true,
            platform_post_id: Some(platform_post_id),
            error: None,
            needs_reconnection: false,
        }
    }

    pub fn failed(
        platform: String,
        account_name: String,
        error: String,
        needs_reconnection: bool,
    ) -> Self {
        Self {
            platform,
            account_name,
            success: false,
            platform_post_id: None,
            error: Some(error),
            needs_reconnection,
        }
    }
}
