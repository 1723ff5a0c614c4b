//! Error types for the bulk FHIR client.

use thiserror::Error;

/// Errors that can occur while talking to a bulk FHIR export server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulkFhirError {
    /// The server rejected the bearer token, or no token has been obtained yet.
    /// Callers should authenticate again and retry.
    #[error("Server indicates this client is unauthorized")]
    Unauthorized,

    /// Fetching a token failed.
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// A status code the operation does not handle.
    #[error("Unexpected HTTP status code: {status}")]
    UnexpectedStatus { status: u16 },

    /// A non-OK status for which a retry may succeed.
    #[error("Retryable HTTP status code: {status}")]
    RetryableStatus { status: u16 },

    /// Exactly one value was expected for a response header.
    #[error("Expected exactly one {header} header, got {count}")]
    HeaderCountMismatch { header: &'static str, count: usize },

    /// The progress header did not contain a parenthesized percentage.
    #[error("Unable to parse progress from X-Progress header: {0}")]
    ProgressParseFailure(String),

    /// A resource type name the client does not know.
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    /// The job did not complete before the monitor deadline.
    #[error("Job status monitoring timed out")]
    Timeout,

    /// Malformed instant in a request or response.
    #[error("Invalid instant: {0}")]
    InvalidInstant(String),

    /// Malformed URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The response body could not be decoded.
    #[error("Invalid response body: {0}")]
    InvalidResponse(String),

    /// The HTTP request itself failed (connect, timeout, I/O).
    #[error("Transport error: {0}")]
    Transport(String),
}

impl BulkFhirError {
    /// Whether the caller may retry the same request and expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableStatus { .. })
    }

    /// Whether the caller should re-authenticate before retrying.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<reqwest::Error> for BulkFhirError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BulkFhirError::InvalidResponse(e.to_string())
        } else {
            BulkFhirError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(BulkFhirError::RetryableStatus { status: 404 }.is_retryable());
        assert!(!BulkFhirError::UnexpectedStatus { status: 500 }.is_retryable());
        assert!(!BulkFhirError::Unauthorized.is_retryable());
    }

    #[test]
    fn test_is_unauthorized() {
        assert!(BulkFhirError::Unauthorized.is_unauthorized());
        assert!(!BulkFhirError::AuthFailure("bad".to_string()).is_unauthorized());
    }

    #[test]
    fn test_display_header_count() {
        let err = BulkFhirError::HeaderCountMismatch {
            header: "Content-Location",
            count: 2,
        };
        assert_eq!(
            err.to_string(),
            "Expected exactly one Content-Location header, got 2"
        );
    }
}
