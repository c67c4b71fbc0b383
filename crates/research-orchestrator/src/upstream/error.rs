//! Upstream client errors.

use thiserror::Error;

/// Errors from talking to an upstream HTTP service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// Connection, TLS, or request-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Upstream answered 2xx with a body we could not use.
    #[error("decode error: {0}")]
    Decode(String),

    /// Configured base URL cannot carry a path.
    #[error("invalid upstream URL: {0}")]
    InvalidUrl(String),

    /// Run id that cannot be addressed as a path segment.
    #[error("invalid run id: {0:?}")]
    InvalidRunId(String),

    /// Required credentials or endpoint missing from configuration.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}
