//! Chat-completion backends and the composer's output.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreError;

/// A chat-completion model tried by the composer.
///
/// Candidates are held in a fixed, ordered list decided at configuration time;
/// the position in that list is the fallback priority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCandidate(String);

impl ModelCandidate {
    /// Create a candidate from a model name (e.g., "gpt-4o-mini").
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModelCandidate {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Task input and output schema authored by one chat-completion backend.
///
/// Fields are private so a result can only exist fully populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeResult {
    input: String,
    output_schema: String,
    model: ModelCandidate,
}

impl ComposeResult {
    /// Build a result, refusing empty input or schema.
    pub fn new(
        input: impl Into<String>,
        output_schema: impl Into<String>,
        model: ModelCandidate,
    ) -> Result<Self, CoreError> {
        let input = input.into();
        let output_schema = output_schema.into();

        if input.trim().is_empty() {
            return Err(CoreError::EmptyField("input"));
        }
        if output_schema.trim().is_empty() {
            return Err(CoreError::EmptyField("output_schema"));
        }

        Ok(Self {
            input,
            output_schema,
            model,
        })
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output_schema(&self) -> &str {
        &self.output_schema
    }

    /// The candidate that produced this result.
    pub fn model(&self) -> &ModelCandidate {
        &self.model
    }
}
