//! Service layer for Postdeck
//!
//! `PostdeckService` wires the shared resources (database, configuration,
//! token manager, publisher registry) once and hands out the sub-services used
//! by the CLI and the HTTP server:
//!
//! - `PublishService`: publish a stored post to its target accounts
//! - `YouTubeStatsService`: cached channel statistics
//!
//! # Example
//!
//! ```no_run
//! use libpostdeck::service::PostdeckService;
//!
//! # async fn example() -> libpostdeck::Result<()> {
//! let service = PostdeckService::new().await?;
//!
//! let outcome = service.publishing().publish("user-1", "post-1").await?;
//! println!("{}", outcome.summary.message);
//! # Ok(())
//! # }
//! ```

pub mod publish;

pub use publish::{PublishOutcome, PublishReport, PublishService};

use std::sync::Arc;

use crate::analytics::YouTubeStatsService;
use crate::error::ConfigError;
use crate::platforms::youtube::{HttpYouTubeApi, YouTubeApi};
use crate::platforms::{http_client, PublisherRegistry};
use crate::token::{OAuthRefresher, TokenManager, TokenRefresher};
use crate::{Config, Database, Result};

/// Main service facade
///
/// All sub-services share the same `Arc<Database>` and `Arc<TokenManager>`.
pub struct PostdeckService {
    db: Arc<Database>,
    config: Arc<Config>,
    publishing: PublishService,
    youtube_stats: YouTubeStatsService,
}

impl PostdeckService {
    /// Create a service from the configuration file at the default location
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service talking to the real platform APIs
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated, or the
    /// HTTP client cannot be built.
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Arc::new(open_database(&config).await?);
        let config = Arc::new(config);

        let refresher: Arc<dyn TokenRefresher> = Arc::new(OAuthRefresher::new(Arc::clone(&config))?);
        let publishers = PublisherRegistry::from_config(&config)?;
        let youtube: Arc<dyn YouTubeApi> = Arc::new(HttpYouTubeApi::new(http_client(&config)?));

        Ok(Self::assemble(db, config, refresher, publishers, youtube))
    }

    /// Build the service from explicit collaborators
    pub fn assemble(
        db: Arc<Database>,
        config: Arc<Config>,
        refresher: Arc<dyn TokenRefresher>,
        publishers: PublisherRegistry,
        youtube: Arc<dyn YouTubeApi>,
    ) -> Self {
        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&db),
            refresher,
            config.tokens.refresh_window_secs,
        ));

        let publishing = PublishService::new(
            Arc::clone(&db),
            Arc::clone(&tokens),
            Arc::new(publishers),
            config.publishing.claim_timeout_secs,
        );
        let youtube_stats = YouTubeStatsService::new(
            Arc::clone(&db),
            tokens,
            youtube,
            &config.youtube_stats,
        );

        Self {
            db,
            config,
            publishing,
            youtube_stats,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn publishing(&self) -> &PublishService {
        &self.publishing
    }

    pub fn youtube_stats(&self) -> &YouTubeStatsService {
        &self.youtube_stats
    }
}

/// Open (and migrate) the database named in the configuration
pub async fn open_database(config: &Config) -> Result<Database> {
    let db_path = config.database_path()?;
    let db_path_str = db_path.to_str().ok_or_else(|| {
        ConfigError::MissingField(format!("database path {} is not valid UTF-8", db_path.display()))
    })?;
    Database::new(db_path_str).await
}
