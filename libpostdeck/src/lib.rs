//! Postdeck - publish one post to many social accounts
//!
//! This library holds the publish orchestration shared by the `deck-publish`
//! CLI and the `deck-server` HTTP service: content composition, token
//! validation, per-platform dispatch and result aggregation, plus the
//! persistence, configuration and logging they run on.

pub mod aggregate;
pub mod analytics;
pub mod compose;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod service;
pub mod token;
pub mod types;

// Re-export commonly used types
pub use aggregate::PublishSummary;
pub use config::Config;
pub use db::Database;
pub use error::{PlatformError, PostdeckError, Result};
pub use service::{PostdeckService, PublishOutcome};
pub use types::{Post, PostStatus, PublishResult, SocialAccount, SocialPlatform};
