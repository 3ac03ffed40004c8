//! Database operations for Postdeck

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{
    Post, PostStatus, Publication, PublicationStatus, SocialAccount, SocialPlatform,
};

/// A publication joined with the account it targets
#[derive(Debug, Clone)]
pub struct PublicationTarget {
    pub publication: Publication,
    pub account: SocialAccount,
}

const POST_COLUMNS: &str = "id, user_id, content, hashtags, title, description, image_url, images, \
     video_url, videos, status, scheduled_at, published_at, created_at";

const ACCOUNT_COLUMNS: &str = "id, user_id, platform, account_id, account_name, account_type, \
     access_token, refresh_token, expires_at, is_active, metadata";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the file on first use
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Round trip to the database, for health checks
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, content, hashtags, title, description, image_url,
                               images, video_url, videos, status, scheduled_at, published_at,
                               created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(&post.hashtags)
        .bind(&post.title)
        .bind(&post.description)
        .bind(&post.image_url)
        .bind(&post.images)
        .bind(&post.video_url)
        .bind(&post.videos)
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let query = format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS);
        let row = sqlx::query(&query)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| post_from_row(&r)).transpose()
    }

    /// Fetch a post only if it belongs to `user_id`
    pub async fn get_post_for_user(&self, post_id: &str, user_id: &str) -> Result<Option<Post>> {
        let query = format!(
            "SELECT {} FROM posts WHERE id = ? AND user_id = ?",
            POST_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(post_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| post_from_row(&r)).transpose()
    }

    /// Atomically move a post into `publishing`
    ///
    /// Draft, scheduled and failed posts can be claimed. A post already in
    /// `publishing` can only be taken over once its claim is older than
    /// `claim_timeout_secs`, which frees posts whose run never finished.
    /// Returns false when the claim is held or the post is published.
    pub async fn claim_post_for_publishing(
        &self,
        post_id: &str,
        user_id: &str,
        claim_timeout_secs: i64,
    ) -> Result<bool> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE posts SET status = 'publishing', publishing_since = ?
            WHERE id = ? AND user_id = ?
              AND (status IN ('draft', 'scheduled', 'failed')
                   OR (status = 'publishing'
                       AND (publishing_since IS NULL OR publishing_since < ?)))
            "#,
        )
        .bind(now)
        .bind(post_id)
        .bind(user_id)
        .bind(now - claim_timeout_secs)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn update_post_status(&self, post_id: &str, status: PostStatus) -> Result<()> {
        sqlx::query("UPDATE posts SET status = ?, publishing_since = NULL WHERE id = ?")
            .bind(status.as_str())
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Record the outcome of a publish run on the post row
    pub async fn finish_post(
        &self,
        post_id: &str,
        status: PostStatus,
        published_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE posts SET status = ?, published_at = ?, publishing_since = NULL WHERE id = ?",
        )
            .bind(status.as_str())
            .bind(published_at)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Social accounts
    // ------------------------------------------------------------------

    pub async fn create_account(&self, account: &SocialAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO social_accounts (id, user_id, platform, account_id, account_name,
                                         account_type, access_token, refresh_token, expires_at,
                                         is_active, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(&account.platform_name)
        .bind(&account.account_id)
        .bind(&account.account_name)
        .bind(account.account_type.as_str())
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.expires_at)
        .bind(account.is_active)
        .bind(&account.metadata)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_account(&self, id: &str) -> Result<Option<SocialAccount>> {
        let query = format!("SELECT {} FROM social_accounts WHERE id = ?", ACCOUNT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| account_from_row(&r)).transpose()
    }

    /// Look up an account by owner, platform and external account id
    ///
    /// Stored platform names are matched with the same parsing rule as the
    /// publisher registry, so aliases resolve to their platform here too.
    pub async fn find_account(
        &self,
        user_id: &str,
        platform: SocialPlatform,
        account_id: &str,
    ) -> Result<Option<SocialAccount>> {
        let query = format!(
            "SELECT {} FROM social_accounts WHERE user_id = ? AND account_id = ? ORDER BY rowid",
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        for row in &rows {
            let account = account_from_row(row)?;
            if account.platform().ok() == Some(platform) {
                return Ok(Some(account));
            }
        }
        Ok(None)
    }

    /// Persist a refreshed token; a `None` refresh token keeps the stored one
    pub async fn update_account_tokens(
        &self,
        id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE social_accounts
            SET access_token = ?, refresh_token = COALESCE(?, refresh_token), expires_at = ?
            WHERE id = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn deactivate_account(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE social_accounts SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Publications
    // ------------------------------------------------------------------

    pub async fn create_publication(&self, publication: &Publication) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO publications (id, post_id, social_account_id, status, platform_post_id,
                                      error_message, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&publication.id)
        .bind(&publication.post_id)
        .bind(&publication.social_account_id)
        .bind(publication.status.as_str())
        .bind(&publication.platform_post_id)
        .bind(&publication.error_message)
        .bind(publication.published_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_publications(&self, post_id: &str) -> Result<Vec<Publication>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, social_account_id, status, platform_post_id, error_message,
                   published_at
            FROM publications WHERE post_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(publication_from_row).collect()
    }

    /// Publications of a post whose target account is still active
    pub async fn get_publication_targets(&self, post_id: &str) -> Result<Vec<PublicationTarget>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id AS publication_id, p.post_id, p.social_account_id, p.status AS publication_status,
                   p.platform_post_id, p.error_message, p.published_at,
                   a.id, a.user_id, a.platform, a.account_id, a.account_name, a.account_type,
                   a.access_token, a.refresh_token, a.expires_at, a.is_active, a.metadata
            FROM publications p
            JOIN social_accounts a ON a.id = p.social_account_id
            WHERE p.post_id = ? AND a.is_active = 1
              AND a.user_id = (SELECT user_id FROM posts WHERE id = p.post_id)
            ORDER BY p.rowid
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| -> Result<PublicationTarget> {
                let status: String = r.get("publication_status");
                let publication = Publication {
                    id: r.get("publication_id"),
                    post_id: r.get("post_id"),
                    social_account_id: r.get("social_account_id"),
                    status: status.parse().map_err(DbError::CorruptRow)?,
                    platform_post_id: r.get("platform_post_id"),
                    error_message: r.get("error_message"),
                    published_at: r.get("published_at"),
                };
                Ok(PublicationTarget {
                    publication,
                    account: account_from_row(r)?,
                })
            })
            .collect()
    }

    pub async fn mark_publication_published(
        &self,
        id: &str,
        platform_post_id: &str,
        published_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE publications
            SET status = 'published', platform_post_id = ?, published_at = ?, error_message = NULL
            WHERE id = ?
            "#,
        )
        .bind(platform_post_id)
        .bind(published_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn mark_publication_failed(&self, id: &str, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE publications SET status = 'failed', error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

fn post_from_row(r: &SqliteRow) -> Result<Post> {
    let status: String = r.get("status");
    Ok(Post {
        id: r.get("id"),
        user_id: r.get("user_id"),
        content: r.get("content"),
        hashtags: r.get("hashtags"),
        title: r.get("title"),
        description: r.get("description"),
        image_url: r.get("image_url"),
        images: r.get("images"),
        video_url: r.get("video_url"),
        videos: r.get("videos"),
        status: status.parse().map_err(DbError::CorruptRow)?,
        scheduled_at: r.get("scheduled_at"),
        published_at: r.get("published_at"),
        created_at: r.get("created_at"),
    })
}

fn account_from_row(r: &SqliteRow) -> Result<SocialAccount> {
    let account_type: String = r.get("account_type");
    Ok(SocialAccount {
        id: r.get("id"),
        user_id: r.get("user_id"),
        platform_name: r.get("platform"),
        account_id: r.get("account_id"),
        account_name: r.get("account_name"),
        account_type: account_type.parse().map_err(DbError::CorruptRow)?,
        access_token: r.get("access_token"),
        refresh_token: r.get("refresh_token"),
        expires_at: r.get("expires_at"),
        is_active: r.get("is_active"),
        metadata: r.get("metadata"),
    })
}

fn publication_from_row(r: &SqliteRow) -> Result<Publication> {
    let status: String = r.get("status");
    Ok(Publication {
        id: r.get("id"),
        post_id: r.get("post_id"),
        social_account_id: r.get("social_account_id"),
        status: status
            .parse::<PublicationStatus>()
            .map_err(DbError::CorruptRow)?,
        platform_post_id: r.get("platform_post_id"),
        error_message: r.get("error_message"),
        published_at: r.get("published_at"),
    })
}
