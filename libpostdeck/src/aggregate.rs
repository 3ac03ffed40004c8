//! Reduce per-account results to an overall post outcome

use serde::Serialize;

use crate::types::{PostStatus, PublishResult};

/// Overall outcome of one publish run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishSummary {
    pub status: PostStatus,
    pub success_count: usize,
    pub total_count: usize,
    pub has_warnings: bool,
    pub needs_reconnection: bool,
    pub reconnection_platforms: Vec<String>,
    pub message: String,
}

impl PublishSummary {
    /// At least one account received the post
    pub fn any_succeeded(&self) -> bool {
        self.success_count > 0
    }
}

pub fn aggregate(results: &[PublishResult]) -> PublishSummary {
    let total_count = results.len();
    let success_count = results.iter().filter(|r| r.success).count();

    let mut reconnection_platforms: Vec<String> = Vec::new();
    for result in results.iter().filter(|r| r.needs_reconnection) {
        if !reconnection_platforms.contains(&result.platform) {
            reconnection_platforms.push(result.platform.clone());
        }
    }

    let (status, message) = if success_count == 0 {
        (
            PostStatus::Failed,
            format!("Failed to publish to any of {} account(s)", total_count),
        )
    } else if success_count < total_count {
        (
            PostStatus::Published,
            format!(
                "Published to {} of {} accounts",
                success_count, total_count
            ),
        )
    } else {
        (
            PostStatus::Published,
            format!("Published to all {} account(s)", total_count),
        )
    };

    PublishSummary {
        status,
        success_count,
        total_count,
        has_warnings: success_count > 0 && success_count < total_count,
        needs_reconnection: !reconnection_platforms.is_empty(),
        reconnection_platforms,
        message,
    }
}
