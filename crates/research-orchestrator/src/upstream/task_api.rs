//! Client for the upstream long-running task API.
//!
//! The client only moves bytes: it returns the HTTP status, `Retry-After`, and
//! the decoded body, and leaves their interpretation to the submitter and the
//! poll coordinator.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use research_core::{ProcessorTier, RunId};

use super::UpstreamError;

/// Raw answer from the task API.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamReply {
    pub status: u16,

    /// Parsed `Retry-After` header (delta-seconds form only).
    pub retry_after_secs: Option<u64>,

    /// JSON body, a JSON string holding the raw text if it was not JSON, or null if empty.
    pub body: Value,
}

impl UpstreamReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Job-creation payload sent upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateRunRequest {
    pub input: String,
    pub processor: ProcessorTier,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_spec: Option<TaskSpec>,

    /// Correlation metadata echoed back by upstream.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSpec {
    pub output_schema: OutputSchemaSpec,
}

/// Requested output shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputSchemaSpec {
    /// A JSON Schema object.
    Json { json_schema: Value },
    /// A plain-language description of the deliverable.
    Text { description: String },
}

impl TaskSpec {
    /// Build a task spec from a composed output schema.
    ///
    /// Schemas that parse as a JSON object are sent as JSON Schema; anything
    /// else is sent as a text description. Blank schemas yield no spec.
    pub fn from_output_schema(schema: &str) -> Option<Self> {
        let trimmed = schema.trim();
        if trimmed.is_empty() {
            return None;
        }

        let output_schema = match serde_json::from_str::<Value>(trimmed) {
            Ok(json_schema @ Value::Object(_)) => OutputSchemaSpec::Json { json_schema },
            _ => OutputSchemaSpec::Text {
                description: trimmed.to_string(),
            },
        };

        Some(Self { output_schema })
    }
}

/// Operations on the upstream task API.
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Create a run. Exactly one request; no retries.
    async fn create_run(&self, request: &CreateRunRequest) -> Result<UpstreamReply, UpstreamError>;

    /// Fetch the final result, letting upstream hold the request up to `timeout_secs`.
    async fn fetch_result(
        &self,
        run_id: &RunId,
        timeout_secs: u64,
    ) -> Result<UpstreamReply, UpstreamError>;

    /// Fetch the run's current status document.
    async fn fetch_status(&self, run_id: &RunId) -> Result<UpstreamReply, UpstreamError>;
}

/// reqwest-backed [`TaskApi`] for `{base_url}/v1/tasks/runs`.
pub struct HttpTaskApi {
    inner: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTaskApi {
    /// Create a new task API client.
    pub fn new(inner: Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn runs_url(&self) -> String {
        format!("{}/v1/tasks/runs", self.base_url)
    }

    /// URL of one run. The id is percent-encoded into a single path segment.
    fn run_url(&self, run_id: &RunId, tail: Option<&str>) -> Result<Url, UpstreamError> {
        let id = run_id.as_str();
        if matches!(id, "" | "." | "..") {
            return Err(UpstreamError::InvalidRunId(id.to_string()));
        }

        let mut url =
            Url::parse(&self.runs_url()).map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| UpstreamError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(id)
            .extend(tail);
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> Result<RequestBuilder, UpstreamError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(UpstreamError::NotConfigured("task API key"))?;
        Ok(builder.header("x-api-key", api_key))
    }

    async fn read_reply(response: Response) -> Result<UpstreamReply, UpstreamError> {
        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(UpstreamReply {
            status,
            retry_after_secs,
            body,
        })
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn create_run(&self, request: &CreateRunRequest) -> Result<UpstreamReply, UpstreamError> {
        let url = self.runs_url();
        debug!(url = %url, processor = %request.processor, "Creating upstream run");

        let response = self
            .authorize(self.inner.post(&url))?
            .json(request)
            .send()
            .await?;
        Self::read_reply(response).await
    }

    async fn fetch_result(
        &self,
        run_id: &RunId,
        timeout_secs: u64,
    ) -> Result<UpstreamReply, UpstreamError> {
        let url = self.run_url(run_id, Some("result"))?;
        debug!(url = %url, timeout_secs, "Fetching run result");

        let response = self
            .authorize(self.inner.get(url))?
            .query(&[("timeout", timeout_secs)])
            .send()
            .await?;
        Self::read_reply(response).await
    }

    async fn fetch_status(&self, run_id: &RunId) -> Result<UpstreamReply, UpstreamError> {
        let url = self.run_url(run_id, None)?;
        debug!(url = %url, "Fetching run status");

        let response = self.authorize(self.inner.get(url))?.send().await?;
        Self::read_reply(response).await
    }
}
