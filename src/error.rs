// Error types for the dispatch path

use thiserror::Error;

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Failures the orchestrator did not anticipate.
///
/// Render and transform failures are not represented here: they travel as
/// [`crate::dispatch::Outcome`] values because the stage that produced them
/// has already told the user.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No request stored under the given id
    #[error("Request `{0}` not found")]
    RequestNotFound(String),

    /// No environment stored under the given id
    #[error("Environment `{0}` not found")]
    EnvironmentNotFound(String),

    /// Composed URL could not be parsed
    #[error("Invalid URL `{url}`: {reason}")]
    InvalidUrl {
        /// URL as composed
        url: String,
        /// Parser message
        reason: String,
    },

    /// Network or protocol failure in the backend
    #[error("Request failed: {0}")]
    Transport(String),

    /// The session task is gone
    #[error("Dispatch session closed")]
    SessionClosed,

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Transport(err.to_string())
    }
}
