//! Error types for the orchestrator client.

use thiserror::Error;

/// Errors that can occur when talking to the orchestrator.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The orchestrator answered with an error status.
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Serialization(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> ClientError {
        ClientError::Api {
            status,
            code: None,
            message: "nope".to_string(),
            retry_after_secs: None,
        }
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(api(429).is_retryable());
        assert!(api(502).is_retryable());
        assert!(!api(400).is_retryable());
        assert!(!api(401).is_retryable());
        assert!(!ClientError::Serialization("bad".into()).is_retryable());
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(api(422).to_string(), "API error (422): nope");
    }
}
