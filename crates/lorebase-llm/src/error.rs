#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("provider unavailable")]
    Unavailable,

    #[error("{provider} API request failed (status {status})")]
    Api { provider: &'static str, status: u16 },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: &'static str },

    #[error("embedding count mismatch: requested {expected}, received {got}")]
    EmbeddingCount { expected: usize, got: usize },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    ///
    /// Client errors that will fail identically on every attempt (bad request,
    /// auth, missing model, malformed payloads) are permanent; everything else is
    /// treated as a transient provider hiccup.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Json(_) | Self::EmbedUnsupported { .. } | Self::EmbeddingCount { .. } => false,
            Self::Api { status, .. } => !matches!(status, 400 | 401 | 403 | 404 | 422),
            Self::Http(_)
            | Self::RateLimited
            | Self::Unavailable
            | Self::EmptyResponse { .. }
            | Self::Other(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
