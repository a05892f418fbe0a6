//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// Coarse failure classes shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credential missing or rejected
    Auth,
    /// Provider asked us to slow down
    RateLimited,
    /// Connection, stream or timeout trouble
    Transport,
    /// The provider answered with something we could not use
    Provider,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::Transport => "transport",
            ErrorKind::Provider => "provider",
        };
        f.write_str(label)
    }
}

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Stream error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API key not found: set {0} in the environment or a .env file")]
    CredentialMissing(String),
}

impl LlmError {
    /// Map a non-success HTTP status to an error
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => LlmError::Auth { status, message },
            429 => LlmError::RateLimited {
                retry_after: retry_after.unwrap_or(Duration::from_secs(60)),
            },
            _ => LlmError::ApiError { status, message },
        }
    }

    /// Classify for display
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Auth { .. } | LlmError::CredentialMissing(_) => ErrorKind::Auth,
            LlmError::RateLimited { .. } => ErrorKind::RateLimited,
            LlmError::Network(_) | LlmError::Transport(_) | LlmError::Timeout(_) => ErrorKind::Transport,
            LlmError::ApiError { status, .. } if *status == 408 || *status >= 500 => ErrorKind::Transport,
            LlmError::ApiError { .. } | LlmError::InvalidResponse(_) | LlmError::Json(_) => ErrorKind::Provider,
        }
    }
}
