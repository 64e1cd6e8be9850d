use thiserror::Error;

/// Abstract error-kind taxonomy shared by every component boundary.
///
/// Matchers inspect this enum, never the formatted message — string matching
/// on error text is exactly the pattern this replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TransientNetwork,
    Timeout,
    HttpClientError,
    HttpServerError,
    RateLimited,
    ContentQualityRejection,
    AuthFailure,
    UsageExhausted,
    CircuitOpen,
    Unknown,
}

impl ErrorKind {
    /// Whether the default retry predicate should retry an error of this kind.
    pub fn is_retryable_by_default(self) -> bool {
        matches!(
            self,
            ErrorKind::TransientNetwork | ErrorKind::Timeout | ErrorKind::HttpServerError
        )
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("content rejected: {0}")]
    ContentQuality(String),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("usage ceiling exhausted: {0}")]
    UsageExhausted(String),

    #[error("circuit breaker open: {0}")]
    CircuitOpen(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Network(_) => ErrorKind::TransientNetwork,
            IngestError::Timeout(_) => ErrorKind::Timeout,
            IngestError::Http { status, .. } if *status == 408 || *status == 429 => {
                ErrorKind::RateLimited
            }
            IngestError::Http { status, .. } if *status >= 500 => ErrorKind::HttpServerError,
            IngestError::Http { .. } => ErrorKind::HttpClientError,
            IngestError::RateLimited(_) => ErrorKind::RateLimited,
            IngestError::ContentQuality(_) => ErrorKind::ContentQualityRejection,
            IngestError::AuthFailure(_) => ErrorKind::AuthFailure,
            IngestError::UsageExhausted(_) => ErrorKind::UsageExhausted,
            IngestError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            IngestError::InvalidUrl(_) | IngestError::Storage(_) | IngestError::Config(_) => {
                ErrorKind::Unknown
            }
            IngestError::Other(_) => ErrorKind::Unknown,
        }
    }
}
