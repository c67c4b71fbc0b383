//! Run and PollOutcome types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{NormalizedResult, PollStatus, ProcessorTier, RunId};

/// One job submitted to the upstream task API.
///
/// Created exactly once by the submitter and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    id: RunId,
    processor_tier: ProcessorTier,
    created_at: DateTime<Utc>,
}

impl Run {
    pub fn new(id: RunId, processor_tier: ProcessorTier, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            processor_tier,
            created_at,
        }
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn processor_tier(&self) -> ProcessorTier {
        self.processor_tier
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Timing evidence attached to a stuck verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDiagnostics {
    pub elapsed_seconds: u64,
    pub estimate_seconds: u64,
}

/// Result of one reconciliation pass. Built fresh per call, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutcome {
    pub status: PollStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<NormalizedResult>,

    /// Suggested delay before the caller's next poll.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<PollDiagnostics>,

    /// Upstream failure message for `error` outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollOutcome {
    pub fn completed(result: NormalizedResult) -> Self {
        Self {
            status: PollStatus::Completed,
            result: Some(result),
            retry_after_seconds: None,
            diagnostics: None,
            error: None,
        }
    }

    /// A `queued` or `running` outcome.
    pub fn in_progress(status: PollStatus, retry_after_seconds: u64) -> Self {
        Self {
            status,
            result: None,
            retry_after_seconds: Some(retry_after_seconds),
            diagnostics: None,
            error: None,
        }
    }

    pub fn stuck(diagnostics: PollDiagnostics, retry_after_seconds: u64) -> Self {
        Self {
            status: PollStatus::Stuck,
            result: None,
            retry_after_seconds: Some(retry_after_seconds),
            diagnostics: Some(diagnostics),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, retry_after_seconds: u64) -> Self {
        Self {
            status: PollStatus::Error,
            result: None,
            retry_after_seconds: Some(retry_after_seconds),
            diagnostics: None,
            error: Some(message.into()),
        }
    }
}
