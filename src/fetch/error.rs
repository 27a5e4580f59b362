//! Error types for the fetch module.
//!
//! This module defines structured errors for all API fetch operations,
//! providing context-rich error messages for debugging and run reports.

use thiserror::Error;

/// Errors that can occur while fetching an API page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed to fetch.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body was not the expected JSON envelope.
    #[error("malformed response body from {url}: {message}")]
    MalformedBody {
        /// The URL whose body failed to parse.
        url: String,
        /// What was wrong with the body.
        message: String,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a malformed-body error.
    pub fn malformed_body(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedBody {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns the HTTP status code if this is an HTTP status error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_error_display() {
        let err = FetchError::http_status("https://example.com/api", 503);
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("https://example.com/api"));
    }

    #[test]
    fn test_timeout_error_display() {
        let err = FetchError::timeout("https://example.com/api");
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_malformed_body_error_display() {
        let err = FetchError::malformed_body("https://example.com/api", "missing result_size");
        let msg = err.to_string();
        assert!(msg.contains("malformed"));
        assert!(msg.contains("missing result_size"));
    }

    #[test]
    fn test_status_accessor() {
        assert_eq!(FetchError::http_status("u", 429).status(), Some(429));
        assert_eq!(FetchError::timeout("u").status(), None);
    }
}
