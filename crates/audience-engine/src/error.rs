//! Engine error types.

use audience_database::DatabaseError;
use thiserror::Error;

/// Engine error type.
///
/// None of these are fatal to the host: callers log and degrade.
#[derive(Error, Debug)]
pub enum AudienceError {
    /// Queue or profile persistence failed
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL assembly or parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A required configuration value is absent
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    /// A persisted hit could not be decoded
    #[error("Invalid hit record: {0}")]
    InvalidHit(String),

    /// A server response was not a JSON object
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// The extension task is no longer running
    #[error("Extension stopped")]
    Stopped,
}

/// Result type alias using AudienceError.
pub type AudienceResult<T> = Result<T, AudienceError>;
