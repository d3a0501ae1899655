//! Crate-level error type and retry categorization.
//!
//! Provider-boundary failures live in
//! [`crate::client::providers::ProviderError`] and never cross the collection
//! barrier; everything that reaches a caller is expressed as [`Error`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Service {service} unavailable: {reason}")]
    ServiceUnavailable { service: String, reason: String },

    #[error("Download failed with status {code}: {message}")]
    Download { code: u16, message: String },

    #[error("Authentication required for {url}")]
    AuthRequired { url: String },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Invalid content from {url}: {reason} (signature: {signature})")]
    InvalidContent {
        url: String,
        reason: String,
        signature: String,
    },

    #[error("Cache tier {tier} degraded: {message}")]
    CacheTier { tier: String, message: String },

    #[error("Operation failed: {0}")]
    Service(String),
}

/// Coarse retry classification used by the download orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Timeout, connection reset, 5xx - retried within the same candidate.
    Transient,
    /// 404, malformed response - move straight to the next candidate.
    Permanent,
    /// Provider-imposed throttling - triggers a provider-wide backoff.
    RateLimited,
    /// Paywalled or credentialed resource - skip the candidate.
    Auth,
    /// Payload failed signature validation - next candidate.
    InvalidContent,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Download { code, .. } => match code {
                404 | 410 => ErrorCategory::Permanent,
                401 | 403 => ErrorCategory::Auth,
                429 => ErrorCategory::RateLimited,
                _ => ErrorCategory::Transient,
            },
            Error::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Permanent
                }
            }
            Error::RateLimited { .. } => ErrorCategory::RateLimited,
            Error::AuthRequired { .. } => ErrorCategory::Auth,
            Error::InvalidContent { .. } => ErrorCategory::InvalidContent,
            Error::ServiceUnavailable { .. } | Error::CacheTier { .. } => ErrorCategory::Transient,
            _ => ErrorCategory::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::RateLimited
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse {
            context: "json".to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_status_categorization() {
        let cases = vec![
            (403, ErrorCategory::Auth),
            (404, ErrorCategory::Permanent),
            (410, ErrorCategory::Permanent),
            (429, ErrorCategory::RateLimited),
            (500, ErrorCategory::Transient),
            (503, ErrorCategory::Transient),
        ];

        for (code, expected) in cases {
            let err = Error::Download {
                code,
                message: "test".to_string(),
            };
            assert_eq!(err.category(), expected, "status {code}");
        }
    }

    #[test]
    fn test_retryable_matches_category() {
        let transient = Error::Download {
            code: 502,
            message: "bad gateway".to_string(),
        };
        assert!(transient.is_retryable());

        let permanent = Error::Download {
            code: 404,
            message: "not found".to_string(),
        };
        assert!(!permanent.is_retryable());

        let rate_limited = Error::RateLimited {
            provider: "unpaywall".to_string(),
        };
        assert!(rate_limited.is_retryable());

        let invalid = Error::InvalidContent {
            url: "https://example.org/x.pdf".to_string(),
            reason: "html masquerading as pdf".to_string(),
            signature: "3c21444f".to_string(),
        };
        assert!(!invalid.is_retryable());
    }
}
