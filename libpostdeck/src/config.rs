//! Configuration management for Postdeck

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub publishing: PublishConfig,
    pub twitter: Option<OAuthClientConfig>,
    pub linkedin: Option<OAuthClientConfig>,
    /// Google OAuth client, used for YouTube
    pub google: Option<OAuthClientConfig>,
    pub facebook: Option<FacebookConfig>,
    #[serde(default)]
    pub youtube_stats: StatsCacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Tokens expiring within this many seconds are refreshed before use
    #[serde(default = "default_refresh_window")]
    pub refresh_window_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            refresh_window_secs: default_refresh_window(),
        }
    }
}

fn default_refresh_window() -> i64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// A `publishing` claim older than this is treated as abandoned and can be
    /// taken over by the next run
    #[serde(default = "default_claim_timeout")]
    pub claim_timeout_secs: i64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            claim_timeout_secs: default_claim_timeout(),
        }
    }
}

fn default_claim_timeout() -> i64 {
    900
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookConfig {
    pub app_id: String,
    pub app_secret: String,
    #[serde(default = "default_graph_version")]
    pub graph_version: String,
}

fn default_graph_version() -> String {
    "v19.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsCacheConfig {
    #[serde(default = "default_stats_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_stats_capacity")]
    pub capacity: usize,
    /// Minimum spacing between upstream analytics calls
    #[serde(default = "default_stats_interval")]
    pub min_interval_ms: u64,
}

impl Default for StatsCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_stats_ttl(),
            capacity: default_stats_capacity(),
            min_interval_ms: default_stats_interval(),
        }
    }
}

fn default_stats_ttl() -> u64 {
    300
}

fn default_stats_capacity() -> usize {
    256
}

fn default_stats_interval() -> u64 {
    1000
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/postdeck/postdeck.db".to_string(),
            },
            server: ServerConfig::default(),
            tokens: TokenConfig::default(),
            http: HttpConfig::default(),
            publishing: PublishConfig::default(),
            twitter: None,
            linkedin: None,
            google: None,
            facebook: None,
            youtube_stats: StatsCacheConfig::default(),
        }
    }

    /// Graph API version for Facebook and Instagram calls
    pub fn graph_version(&self) -> String {
        self.facebook
            .as_ref()
            .map(|fb| fb.graph_version.clone())
            .unwrap_or_else(default_graph_version)
    }

    /// Database path with `~` and environment variables expanded
    pub fn database_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.database.path).map_err(|e| {
            ConfigError::MissingField(format!("database.path could not be expanded: {}", e))
        })?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("POSTDECK_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("postdeck").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml(
            r#"
[database]
path = "/tmp/postdeck.db"
"#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.tokens.refresh_window_secs, 300);
        assert_eq!(config.http.timeout_secs, 120);
        assert_eq!(config.publishing.claim_timeout_secs, 900);
        assert_eq!(config.youtube_stats.capacity, 256);
        assert!(config.twitter.is_none());
        assert!(config.facebook.is_none());
    }

    #[test]
    fn test_full_config_parses_platform_sections() {
        let config = Config::from_toml(
            r#"
[database]
path = "/tmp/postdeck.db"

[server]
bind = "0.0.0.0:9000"

[tokens]
refresh_window_secs = 60

[publishing]
claim_timeout_secs = 120

[twitter]
client_id = "tw-id"
client_secret = "tw-secret"

[google]
client_id = "g-id"
client_secret = "g-secret"

[facebook]
app_id = "fb-app"
app_secret = "fb-secret"
"#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.tokens.refresh_window_secs, 60);
        assert_eq!(config.publishing.claim_timeout_secs, 120);
        assert_eq!(config.twitter.unwrap().client_id, "tw-id");
        assert_eq!(config.google.unwrap().client_secret, "g-secret");
        let facebook = config.facebook.unwrap();
        assert_eq!(facebook.app_id, "fb-app");
        assert_eq!(facebook.graph_version, "v19.0");
        assert!(config.linkedin.is_none());
    }

    #[test]
    fn test_missing_database_section_is_an_error() {
        let result = Config::from_toml("[server]\nbind = \"127.0.0.1:1\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let result = Config::load_from_path(Path::new("/nonexistent/postdeck/config.toml"));
        let message = result.unwrap_err().to_string();
        assert!(message.contains("Failed to read config file"));
    }

    #[test]
    fn test_database_path_expands_tilde() {
        let config = Config::default_config();
        let path = config.database_path().unwrap();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with("postdeck/postdeck.db"));
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_honours_env() {
        std::env::set_var("POSTDECK_CONFIG", "/etc/postdeck/custom.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("POSTDECK_CONFIG");

        assert_eq!(path, PathBuf::from("/etc/postdeck/custom.toml"));
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_default_location() {
        std::env::remove_var("POSTDECK_CONFIG");
        if let Ok(path) = resolve_config_path() {
            assert!(path.ends_with("postdeck/config.toml"));
        }
    }
}
