//! Error types for the collector.

use thiserror::Error;

/// Result type alias for collector operations.
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Errors that can occur while crawling.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// No proxy is currently available. Callers should back off and retry.
    #[error("No proxy urls available")]
    PoolEmpty,

    /// A candidate proxy address could not be parsed.
    #[error("Unparseable proxy address '{address}': {reason}")]
    UnparseableAddress { address: String, reason: String },

    /// A health-check probe through a proxy failed.
    #[error("Probe through {0} failed: {1}")]
    Probe(String, String),

    /// The proxy source could not be reached or returned garbage.
    #[error("Proxy source unavailable: {0}")]
    SourceUnavailable(String),

    /// A job handler returned an error or panicked.
    #[error("Job handler failed: {0}")]
    JobHandler(String),

    /// The dispatcher no longer accepts jobs.
    #[error("Dispatcher is stopped")]
    DispatcherStopped,

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a page.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// URL parsing error.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl CollectorError {
    /// Returns true for failures that a later attempt may not hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollectorError::PoolEmpty
                | CollectorError::SourceUnavailable(_)
                | CollectorError::Probe(..)
                | CollectorError::Http(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_pool_empty() {
        let err = CollectorError::PoolEmpty;
        assert_eq!(err.to_string(), "No proxy urls available");
    }

    #[test]
    fn test_error_display_unparseable_address() {
        let err = CollectorError::UnparseableAddress {
            address: "ftp://x".to_string(),
            reason: "unsupported scheme".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unparseable proxy address 'ftp://x': unsupported scheme"
        );
    }

    #[test]
    fn test_error_display_probe() {
        let err = CollectorError::Probe("http://1.2.3.4:80".to_string(), "timeout".to_string());
        assert_eq!(err.to_string(), "Probe through http://1.2.3.4:80 failed: timeout");
    }

    #[test]
    fn test_error_display_source_unavailable() {
        let err = CollectorError::SourceUnavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "Proxy source unavailable: connection refused");
    }

    #[test]
    fn test_error_display_dispatcher_stopped() {
        assert_eq!(
            CollectorError::DispatcherStopped.to_string(),
            "Dispatcher is stopped"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CollectorError = io.into();
        assert!(matches!(err, CollectorError::Io(_)));
    }

    #[test]
    fn test_retryable() {
        assert!(CollectorError::PoolEmpty.is_retryable());
        assert!(CollectorError::SourceUnavailable("x".into()).is_retryable());
        assert!(!CollectorError::Config("x".into()).is_retryable());
        assert!(!CollectorError::DispatcherStopped.is_retryable());
    }
}
