//! Run submitter: creates one job on the upstream task API.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use research_core::{ProcessorTier, Run, RunId};

use crate::deadline::within;
use crate::upstream::{error_message, CreateRunRequest, TaskApi, TaskSpec, UpstreamReply};

/// Caller input for one run creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitRequest {
    pub company_name: String,
    pub website: Option<String>,
    pub org_number: Option<String>,
    pub processor: Option<ProcessorTier>,
    /// Composed task input. Built from the company fields when absent.
    pub input: Option<String>,
    pub output_schema: Option<String>,
}

/// Run-creation failures. All are terminal and reported with a machine code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("rate limited by upstream")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("upstream rejected credentials")]
    Unauthorized,

    #[error("upstream denied access")]
    Forbidden,

    #[error("upstream rejected the request: {0}")]
    InvalidRequest(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("missing run id")]
    MissingRunId,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SubmitError {
    /// Machine-readable outcome code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Upstream(_) | Self::MissingRunId => "upstream_error",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}

/// Submits runs. One upstream request per call and no internal retry.
pub struct Submitter {
    api: Arc<dyn TaskApi>,
    timeout: Duration,
}

impl Submitter {
    pub fn new(api: Arc<dyn TaskApi>, timeout: Duration) -> Self {
        Self { api, timeout }
    }

    /// Create a run. The returned `Run` is the caller's only handle to it.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<Run, SubmitError> {
        let company_name = request.company_name.trim();
        if company_name.is_empty() {
            return Err(SubmitError::InvalidInput("companyName is required".to_string()));
        }

        let tier = request.processor.unwrap_or_default();
        let upstream_request = CreateRunRequest {
            input: task_input(request),
            processor: tier,
            task_spec: request
                .output_schema
                .as_deref()
                .and_then(TaskSpec::from_output_schema),
            metadata: correlation_metadata(request),
        };

        let correlation_id = upstream_request
            .metadata
            .get("correlation_id")
            .cloned()
            .unwrap_or_default();

        info!(
            company = %company_name,
            processor = %tier,
            correlation_id = %correlation_id,
            "Submitting research run"
        );

        let reply = match within(self.timeout, self.api.create_run(&upstream_request)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(error = %e, "Run creation request failed");
                return Err(SubmitError::Upstream(e.to_string()));
            }
            Err(timed_out) => {
                warn!(error = %timed_out, "Run creation timed out");
                return Err(SubmitError::Upstream(timed_out.to_string()));
            }
        };

        let run_id = interpret_reply(&reply)?;
        info!(run_id = %run_id, correlation_id = %correlation_id, "Run queued upstream");

        Ok(Run::new(run_id, tier, Utc::now()))
    }
}

/// Map the upstream answer to a run id or a typed failure.
fn interpret_reply(reply: &UpstreamReply) -> Result<RunId, SubmitError> {
    match reply.status {
        429 => Err(SubmitError::RateLimited {
            retry_after_secs: reply.retry_after_secs,
        }),
        401 => Err(SubmitError::Unauthorized),
        403 => Err(SubmitError::Forbidden),
        422 => Err(SubmitError::InvalidRequest(
            error_message(&reply.body).unwrap_or_else(|| "unprocessable request".to_string()),
        )),
        status if !reply.is_success() => {
            let detail = error_message(&reply.body)
                .map(|m| format!(": {}", m))
                .unwrap_or_default();
            Err(SubmitError::Upstream(format!(
                "upstream returned HTTP {}{}",
                status, detail
            )))
        }
        _ => ["run_id", "id"]
            .iter()
            .find_map(|key| reply.body.get(*key).and_then(Value::as_str))
            .filter(|id| !id.trim().is_empty())
            .map(RunId::from)
            .ok_or(SubmitError::MissingRunId),
    }
}

fn task_input(request: &SubmitRequest) -> String {
    if let Some(input) = request.input.as_deref().map(str::trim) {
        if !input.is_empty() {
            return input.to_string();
        }
    }

    let mut identifiers = Vec::new();
    if let Some(website) = non_blank(&request.website) {
        identifiers.push(format!("website: {}", website));
    }
    if let Some(org_number) = non_blank(&request.org_number) {
        identifiers.push(format!("organisation number: {}", org_number));
    }

    let subject = if identifiers.is_empty() {
        request.company_name.trim().to_string()
    } else {
        format!("{} ({})", request.company_name.trim(), identifiers.join("; "))
    };

    format!(
        "Research the company {}. Summarise what it does, its ownership and leadership, \
         financial signals, recent news, and notable risks. Cite sources.",
        subject
    )
}

fn correlation_metadata(request: &SubmitRequest) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert(
        "company_name".to_string(),
        request.company_name.trim().to_string(),
    );
    if let Some(website) = non_blank(&request.website) {
        metadata.insert("website".to_string(), website.to_string());
    }
    if let Some(org_number) = non_blank(&request.org_number) {
        metadata.insert("org_number".to_string(), org_number.to_string());
    }
    metadata.insert("correlation_id".to_string(), Uuid::new_v4().to_string());
    metadata
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
