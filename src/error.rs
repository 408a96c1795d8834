//! Error types for the dialogue agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Turn-scoped conditions
    // =============================

    /// The stage needed input and got none; the stage re-prompts.
    #[error("Input is empty")]
    InputEmpty,

    #[error("Generation failure: {0}")]
    GenerationFailure(String),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Rate limit exceeded for {subject}: more than {limit} requests in {window_secs}s")]
    RateLimitExceeded {
        subject: String,
        limit: u64,
        window_secs: u64,
    },

    // =============================
    // Infrastructure
    // =============================

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Render error: {0}")]
    Render(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AgentError {
    /// Only a rate limit rejection ends a request early; everything else is
    /// degraded into a user-visible message by the caller.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AgentError::RateLimitExceeded { .. })
    }
}
