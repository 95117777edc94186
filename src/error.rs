//! Error types for image generation and storage.

use std::time::Duration;

/// Longest upstream error body kept in an error message.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while generating, storing, or listing images.
#[derive(Debug, thiserror::Error)]
pub enum GenStudioError {
    /// The prompt was empty or whitespace only.
    #[error("prompt must not be empty")]
    EmptyPrompt,

    /// A provider credential is not configured.
    #[error("{provider} requires the {env_var} environment variable (or config entry) to be set")]
    MissingCredential {
        /// Provider display name.
        provider: &'static str,
        /// Variable that supplies the key.
        env_var: &'static str,
    },

    /// API key rejected by the upstream service.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Upstream returned a non-success HTTP status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Sanitized error detail.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Delay suggested by the `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// Content was blocked by the provider's safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// The remote generation job failed or returned something unusable.
    #[error("generation job failed: {0}")]
    UpstreamJob(String),

    /// Remote job did not complete in time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Result URL expired before the image could be downloaded.
    #[error("download URL expired")]
    UrlExpired,

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Model identifier is not one of the supported models.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Provider not available (feature not enabled).
    #[error("provider not available: {0}")]
    ProviderNotAvailable(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error (e.g., writing an image).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be resolved.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GenStudioError {
    /// Returns true if the error was detected before any request was sent.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::EmptyPrompt
                | Self::MissingCredential { .. }
                | Self::UnknownModel(_)
                | Self::ProviderNotAvailable(_)
        )
    }
}

/// Result type alias for generation operations.
pub type Result<T> = std::result::Result<T, GenStudioError>;

/// Collapses whitespace in an upstream error body and truncates it.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
    truncated.push_str("...");
    truncated
}

/// Reads a `Retry-After` header expressed in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
