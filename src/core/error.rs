//! Error types for the document/chat API client.
//!
//! Every caller renders user-facing messages off this three-way split:
//! the server answered with an error status, the server never answered,
//! or something else went wrong on our side.

use thiserror::Error;

/// Result type alias for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by [`ApiClient`](crate::core::api::ApiClient).
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server responded with a non-2xx status.
    #[error("server error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Server-supplied message (`detail` field) or a generic fallback.
        message: String,
    },

    /// The request never got a response (connect failure, timeout).
    #[error("no response from server: {0}")]
    NoResponse(#[source] reqwest::Error),

    /// Anything else: decode failures, malformed URLs, local IO.
    #[error("request failed: {0}")]
    Unexpected(String),
}

impl ApiError {
    /// Classify a `reqwest` transport error.
    ///
    /// Connect/timeout/request failures mean the server never answered;
    /// everything else (body, decode) is unexpected.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            ApiError::NoResponse(err)
        } else {
            ApiError::Unexpected(err.to_string())
        }
    }

    /// True when this is an HTTP error with the given status.
    pub fn is_status(&self, code: u16) -> bool {
        matches!(self, ApiError::Api { status, .. } if *status == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Api {
            status: 404,
            message: "Document not found".to_string(),
        };
        assert_eq!(err.to_string(), "server error (404): Document not found");
        assert!(err.is_status(404));
        assert!(!err.is_status(500));
    }

    #[test]
    fn test_unexpected_display() {
        let err = ApiError::Unexpected("boom".to_string());
        assert_eq!(err.to_string(), "request failed: boom");
    }
}
