//! HTTP request and response types.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use research_core::{Citation, PollDiagnostics, PollStatus};

use crate::service::{ComposeError, SubmitError};

// ============================================================================
// Compose types
// ============================================================================

/// Request body for `POST /compose`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeBody {
    #[serde(default)]
    pub prompt: String,
    pub business_context: Option<String>,
    pub company_block: Option<String>,
    pub processor: Option<String>,
}

// ============================================================================
// Run types
// ============================================================================

/// Request body for `POST /runs`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunBody {
    #[serde(default)]
    pub company_name: String,
    pub website: Option<String>,
    pub org_number: Option<String>,
    pub processor: Option<String>,
    pub input: Option<String>,
    pub output_schema: Option<String>,
}

/// Response body for an accepted run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCreatedResponse {
    pub run_id: String,
    pub status: PollStatus,
}

/// Query string for `GET /runs`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollQuery {
    pub run_id: Option<String>,
    /// Any number; clamped into the supported wait range.
    pub wait_sec: Option<f64>,
    pub processor: Option<String>,
}

/// Response body for `GET /runs`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub run_id: String,
    pub status: PollStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<PollDiagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `result` of a completed poll: normalized output plus extracted citations.
#[derive(Debug, Serialize)]
pub struct ResultBody {
    pub output: OutputBody,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Serialize)]
pub struct OutputBody {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basis: Option<Value>,
}

// ============================================================================
// Error types
// ============================================================================

/// Error response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_sec: Option<u64>,
}

/// API errors with their HTTP status codes.
#[derive(Debug)]
pub enum ApiError {
    /// Invalid JSON in request body.
    InvalidJson { message: String },
    /// Malformed query string.
    InvalidQuery { message: String },
    /// Missing required field.
    MissingField { field: &'static str },
    /// Invalid field value.
    InvalidField {
        field: &'static str,
        message: String,
    },
    /// Compose stage failed.
    Compose(ComposeError),
    /// Run creation failed.
    Submit(SubmitError),
}

impl From<ComposeError> for ApiError {
    fn from(e: ComposeError) -> Self {
        Self::Compose(e)
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        Self::Submit(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let mut details = None;

        let (status, code, message) = match self {
            ApiError::InvalidJson { message } => (StatusCode::BAD_REQUEST, "invalid_json", message),
            ApiError::InvalidQuery { message } => {
                (StatusCode::BAD_REQUEST, "invalid_query", message)
            }
            ApiError::MissingField { field } => (
                StatusCode::BAD_REQUEST,
                "missing_field",
                format!("{} is required", field),
            ),
            ApiError::InvalidField { field, message } => (
                StatusCode::BAD_REQUEST,
                "invalid_field",
                format!("Invalid field '{}': {}", field, message),
            ),
            ApiError::Compose(e) => {
                let (status, code) = match &e {
                    ComposeError::EmptyPrompt => (StatusCode::BAD_REQUEST, "missing_field"),
                    ComposeError::NoCandidates => {
                        (StatusCode::SERVICE_UNAVAILABLE, "no_compose_models")
                    }
                    ComposeError::Exhausted { .. } => (StatusCode::BAD_GATEWAY, "compose_failed"),
                };
                details = e.last_error().map(str::to_string);
                (status, code, e.to_string())
            }
            ApiError::Submit(e) => {
                let status = match &e {
                    SubmitError::RateLimited { retry_after_secs } => {
                        retry_after = *retry_after_secs;
                        StatusCode::TOO_MANY_REQUESTS
                    }
                    SubmitError::Unauthorized => StatusCode::UNAUTHORIZED,
                    SubmitError::Forbidden => StatusCode::FORBIDDEN,
                    SubmitError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    SubmitError::Upstream(_) | SubmitError::MissingRunId => StatusCode::BAD_GATEWAY,
                    SubmitError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                };
                (status, e.code(), e.to_string())
            }
        };

        let body = ErrorResponse {
            error: message,
            code,
            details,
            retry_after_sec: retry_after,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
