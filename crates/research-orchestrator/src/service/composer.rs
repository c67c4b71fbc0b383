//! Task composer: authors a research task through an ordered list of models.
//!
//! Candidates are tried strictly one after another. The first candidate that
//! returns a usable JSON object wins and no later candidate is called, so a
//! success never costs more than one billable completion.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use research_core::{ComposeResult, ModelCandidate, ProcessorTier};

use crate::deadline::within;
use crate::upstream::ChatBackend;

use super::prompt::build_meta_prompt;

/// Fallback key accepted for the output schema.
const SCHEMA_KEYS: [&str; 2] = ["output_schema", "outputSchema"];

/// Caller input for one compose.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposeRequest {
    pub prompt: String,
    pub business_context: Option<String>,
    pub company_block: Option<String>,
    pub processor: Option<ProcessorTier>,
}

/// Compose failures. All are terminal for the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("prompt is required")]
    EmptyPrompt,

    #[error("no compose models configured")]
    NoCandidates,

    /// Every candidate failed; `last_error` is the final candidate's error text.
    #[error("all {attempts} compose candidates failed: {last_error}")]
    Exhausted { attempts: usize, last_error: String },
}

impl ComposeError {
    /// Raw error text of the last candidate tried, if any was tried.
    pub fn last_error(&self) -> Option<&str> {
        match self {
            Self::Exhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }
}

/// Authors `{input, output_schema}` pairs via the configured model list.
pub struct Composer {
    backend: Arc<dyn ChatBackend>,
    candidates: Vec<ModelCandidate>,
    attempt_timeout: Duration,
}

impl Composer {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        candidates: Vec<ModelCandidate>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            candidates,
            attempt_timeout,
        }
    }

    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.candidates
    }

    /// Compose a task, returning the first candidate's valid result.
    pub async fn compose(&self, request: &ComposeRequest) -> Result<ComposeResult, ComposeError> {
        if request.prompt.trim().is_empty() {
            return Err(ComposeError::EmptyPrompt);
        }
        if self.candidates.is_empty() {
            return Err(ComposeError::NoCandidates);
        }

        let prompt = build_meta_prompt(request);
        let mut last_error = String::new();

        for (index, model) in self.candidates.iter().enumerate() {
            info!(model = %model, attempt = index + 1, "Composing research task");

            match self.try_candidate(model, &prompt).await {
                Ok(result) => {
                    info!(model = %model, "Compose succeeded");
                    return Ok(result);
                }
                Err(error) => {
                    warn!(model = %model, error = %error, "Compose candidate failed");
                    last_error = error;
                }
            }
        }

        Err(ComposeError::Exhausted {
            attempts: self.candidates.len(),
            last_error,
        })
    }

    async fn try_candidate(
        &self,
        model: &ModelCandidate,
        prompt: &str,
    ) -> Result<ComposeResult, String> {
        let content = match within(self.attempt_timeout, self.backend.complete_json(model, prompt))
            .await
        {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(timed_out) => return Err(timed_out.to_string()),
        };

        let parsed = parse_json_object(&content)
            .ok_or_else(|| format!("model {} returned content that is not a JSON object", model))?;

        extract_result(&parsed, model)
    }
}

/// Strict parse first, then the outermost `{...}` span.
fn parse_json_object(content: &str) -> Option<Value> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(content) {
        return Some(value);
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str::<Value>(&content[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn extract_result(parsed: &Value, model: &ModelCandidate) -> Result<ComposeResult, String> {
    let input = parsed
        .get("input")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("model {} response is missing string field \"input\"", model))?;

    let schema = SCHEMA_KEYS
        .iter()
        .find_map(|key| parsed.get(*key).and_then(Value::as_str))
        .ok_or_else(|| {
            format!(
                "model {} response is missing string field \"output_schema\"",
                model
            )
        })?;

    ComposeResult::new(input.trim(), schema.trim(), model.clone())
        .map_err(|e| format!("model {} response rejected: {}", model, e))
}
