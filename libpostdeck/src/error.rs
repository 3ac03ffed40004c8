//! Error types for Postdeck

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PostdeckError>;

#[derive(Error, Debug)]
pub enum PostdeckError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Precondition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A background task failed before reporting a result
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PostdeckError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PostdeckError::InvalidInput(_)
            | PostdeckError::NotFound(_)
            | PostdeckError::Precondition(_) => 3,
            PostdeckError::Platform(e) if e.needs_reconnection() => 2,
            PostdeckError::Platform(_) => 1,
            PostdeckError::Conflict(_) => 1,
            PostdeckError::Config(_) => 1,
            PostdeckError::Database(_) => 1,
            PostdeckError::Internal(_) => 1,
        }
    }

    /// HTTP status code the server answers with for this error
    pub fn http_status(&self) -> u16 {
        match self {
            PostdeckError::NotFound(_) => 404,
            PostdeckError::InvalidInput(_) | PostdeckError::Precondition(_) => 400,
            PostdeckError::Conflict(_) => 409,
            PostdeckError::Platform(PlatformError::RateLimit(_)) => 429,
            PostdeckError::Platform(_) => 502,
            PostdeckError::Config(_) | PostdeckError::Database(_) | PostdeckError::Internal(_) => {
                500
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Structured failure kinds reported by platform collaborators
///
/// The variant carries the classification; callers never inspect the message
/// text to decide how to react.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The stored credential is no longer usable
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    /// The platform refused the content (policy, media format, aspect ratio)
    #[error("Content rejected: {0}")]
    ContentRejected(String),

    /// The account is connected but not set up in a way we can publish to
    #[error("Configuration required: {0}")]
    Configuration(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(String),
}

impl PlatformError {
    /// Whether the user has to reconnect the account before retrying
    pub fn needs_reconnection(&self) -> bool {
        matches!(self, PlatformError::Authentication(_))
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() || error.is_request() {
            PlatformError::Network(error.to_string())
        } else if error.is_decode() {
            PlatformError::Posting(format!("Unexpected response body: {}", error))
        } else {
            PlatformError::Posting(error.to_string())
        }
    }
}

/// Classify a non-success HTTP status from a platform API
pub fn classify_http_status(platform: &str, status: u16, body: &str) -> PlatformError {
    let message = format!("{} returned {}: {}", platform, status, body);
    match status {
        401 | 403 => PlatformError::Authentication(message),
        429 => PlatformError::RateLimit(message),
        400 | 413 | 415 | 422 => PlatformError::ContentRejected(message),
        500..=599 => PlatformError::Network(message),
        _ => PlatformError::Posting(message),
    }
}
