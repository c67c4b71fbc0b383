//! HTTP client for the orchestrator's REST endpoints.

use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use research_core::{Citation, PollDiagnostics, PollStatus, ProcessorTier, RunId};

use crate::error::ClientError;

/// Body of `POST /compose`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor: Option<ProcessorTier>,
}

/// A composed task ready for submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeResponse {
    pub input: String,
    pub output_schema: String,
    pub model: String,
}

/// Body of `POST /runs`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub company_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor: Option<ProcessorTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<String>,
}

/// Acknowledgement of a created run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCreated {
    pub run_id: RunId,
    pub status: PollStatus,
}

/// Normalized output of a completed run, with the upstream basis if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(default)]
    pub output: RunOutput,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// One reconciliation pass as reported by `GET /runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub run_id: RunId,
    pub status: PollStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<PollDiagnostics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    retry_after_sec: Option<u64>,
}

/// HTTP client for the orchestrator API.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client around an existing `reqwest::Client`.
    pub fn with_client(inner: reqwest::Client, base_url: &str) -> Self {
        Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the orchestrator is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let url = format!("{}/health", self.base_url);
        debug!(url = %url, "Checking health");

        let response = self.inner.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// Turn a free-form request into a task input and output description.
    pub async fn compose(&self, request: &ComposeRequest) -> Result<ComposeResponse, ClientError> {
        let url = format!("{}/compose", self.base_url);
        debug!(url = %url, "Composing task");

        let response = self.inner.post(&url).json(request).send().await?;
        read_json(response).await
    }

    /// Submit a run. The orchestrator answers `202 Accepted` on success.
    pub async fn create_run(&self, request: &CreateRunRequest) -> Result<RunCreated, ClientError> {
        let url = format!("{}/runs", self.base_url);
        debug!(url = %url, company = %request.company_name, "Creating run");

        let response = self.inner.post(&url).json(request).send().await?;
        read_json(response).await
    }

    /// Ask the orchestrator for one reconciliation pass.
    pub async fn poll_run(
        &self,
        run_id: &RunId,
        wait_secs: Option<u64>,
        processor: Option<ProcessorTier>,
    ) -> Result<PollResponse, ClientError> {
        let url = format!("{}/runs", self.base_url);
        debug!(url = %url, run_id = %run_id, ?wait_secs, "Polling run");

        let mut query = vec![("runId", run_id.to_string())];
        if let Some(wait) = wait_secs {
            query.push(("waitSec", wait.to_string()));
        }
        if let Some(tier) = processor {
            query.push(("processor", tier.to_string()));
        }

        let response = self.inner.get(&url).query(&query).send().await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let text = response.text().await?;
        return Err(api_error(status.as_u16(), retry_after, &text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::Serialization(e.to_string()))
}

fn api_error(status: u16, retry_after_header: Option<u64>, text: &str) -> ClientError {
    let body: ErrorBody = serde_json::from_str(text).unwrap_or_default();
    let message = match (body.error.trim(), body.details) {
        ("", _) if text.trim().is_empty() => format!("HTTP {}", status),
        ("", _) => text.trim().to_string(),
        (error, Some(details)) => format!("{}: {}", error, details),
        (error, None) => error.to_string(),
    };

    ClientError::Api {
        status,
        code: body.code,
        message,
        retry_after_secs: body.retry_after_sec.or(retry_after_header),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_api_error_reads_typed_body() {
        let err = api_error(
            429,
            Some(3),
            r#"{"error":"rate limited by upstream","code":"rate_limited","retryAfterSec":7}"#,
        );
        match err {
            ClientError::Api {
                status,
                code,
                message,
                retry_after_secs,
            } => {
                assert_eq!(status, 429);
                assert_eq!(code.as_deref(), Some("rate_limited"));
                assert_eq!(message, "rate limited by upstream");
                assert_eq!(retry_after_secs, Some(7));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_appends_details_and_falls_back_to_header() {
        let err = api_error(
            502,
            Some(4),
            r#"{"error":"all models failed","details":"HTTP 500: boom"}"#,
        );
        match err {
            ClientError::Api {
                message,
                retry_after_secs,
                ..
            } => {
                assert_eq!(message, "all models failed: HTTP 500: boom");
                assert_eq!(retry_after_secs, Some(4));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_non_json_body() {
        match api_error(503, None, "") {
            ClientError::Api { message, code, .. } => {
                assert_eq!(message, "HTTP 503");
                assert!(code.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        match api_error(500, None, "gateway melted") {
            ClientError::Api { message, .. } => assert_eq!(message, "gateway melted"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_poll_response_decodes_stuck_and_completed() {
        let stuck: PollResponse = serde_json::from_value(json!({
            "runId": "trun_1",
            "status": "stuck",
            "retryAfterSeconds": 12,
            "diagnostics": { "elapsedSeconds": 300, "estimateSeconds": 180 }
        }))
        .unwrap();
        assert_eq!(stuck.status, PollStatus::Stuck);
        assert_eq!(stuck.diagnostics.unwrap().elapsed_seconds, 300);

        let done: PollResponse = serde_json::from_value(json!({
            "runId": "trun_1",
            "status": "completed",
            "result": {
                "output": { "text": "hi", "basis": [{ "citations": [{ "url": "https://a.example" }] }] },
                "citations": [{ "url": "https://a.example" }]
            }
        }))
        .unwrap();
        let result = done.result.unwrap();
        assert_eq!(result.output.text, "hi");
        assert!(result.output.basis.is_some());
        assert_eq!(result.citations[0].url, "https://a.example");
    }

    #[test]
    fn test_create_run_request_omits_absent_fields() {
        let body = serde_json::to_value(CreateRunRequest {
            company_name: "Acme AB".to_string(),
            processor: Some(ProcessorTier::Pro),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, json!({ "companyName": "Acme AB", "processor": "pro" }));
    }
}
