//! Error taxonomy for the analysis pipeline.
//!
//! Two error families with opposite propagation policies:
//! - [`ApiError`] — external lookups. Transient variants are retried by the
//!   gateway, permanent ones surface immediately.
//! - [`CacheError`] — cache backends. Always swallowed by the cache layer,
//!   which degrades to pass-through; callers never see these.

use thiserror::Error;

/// Failure of an external drive/content lookup.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Rate-limited by the vendor API (429).
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// Server-side failure (5xx family).
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Transport-level failure (connect, TLS, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// Authentication or authorization failure (401/403).
    #[error("auth failure ({status}): {message}")]
    Auth { status: u16, message: String },

    /// The requested file, permission or drive does not exist (404).
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Malformed or unexpected response body.
    #[error("bad response: {0}")]
    BadResponse(String),

    /// Any other non-retryable vendor error.
    #[error("api error ({status}): {message}")]
    Other { status: u16, message: String },
}

impl ApiError {
    /// Classify an HTTP status plus body into the taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited { message },
            500..=599 => Self::Server { status, message },
            401 | 403 => Self::Auth { status, message },
            404 => Self::NotFound { message },
            _ => Self::Other { status, message },
        }
    }

    /// Whether the gateway should retry this failure.
    ///
    /// Only rate limits, the 5xx family and transport failures qualify;
    /// everything else propagates on first occurrence.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Network(_)
        )
    }
}

/// Failure of a cache backend read or write.
///
/// Never crosses the cache boundary: lookups report absent, writes are
/// dropped with a warning.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Backend(String),

    #[error("cache entry could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::from_status(429, "slow down").is_transient());
        assert!(ApiError::from_status(500, "boom").is_transient());
        assert!(ApiError::from_status(503, "maintenance").is_transient());
        assert!(ApiError::Network("reset".into()).is_transient());

        assert!(!ApiError::from_status(404, "gone").is_transient());
        assert!(!ApiError::from_status(403, "forbidden").is_transient());
        assert!(!ApiError::from_status(400, "bad request").is_transient());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ApiError::from_status(401, ""),
            ApiError::Auth { status: 401, .. }
        ));
        assert!(matches!(
            ApiError::from_status(404, ""),
            ApiError::NotFound { .. }
        ));
        assert!(matches!(
            ApiError::from_status(418, ""),
            ApiError::Other { status: 418, .. }
        ));
    }
}
