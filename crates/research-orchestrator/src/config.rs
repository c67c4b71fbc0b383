//! Orchestrator configuration.

use research_core::{ModelCandidate, ProcessorTier};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub bind_addr: String,

    /// Chat-completion backend used by the composer.
    pub chat: ChatConfig,

    /// Upstream long-running task API.
    pub task_api: TaskApiConfig,

    /// Poll reconciliation settings.
    pub poll: PollConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            chat: ChatConfig::default(),
            task_api: TaskApiConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

/// Chat-completion backend settings.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,

    pub api_key: Option<String>,

    /// Ordered fallback list. The first entry is tried first.
    pub models: Vec<ModelCandidate>,

    /// Deadline for a single candidate's request (seconds).
    pub attempt_timeout_secs: u64,

    pub temperature: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            models: vec![
                ModelCandidate::new("gpt-4o-mini"),
                ModelCandidate::new("gpt-4.1-mini"),
                ModelCandidate::new("gpt-4o"),
            ],
            attempt_timeout_secs: 25,
            temperature: 0.2,
        }
    }
}

/// Upstream task API settings.
#[derive(Debug, Clone)]
pub struct TaskApiConfig {
    pub base_url: String,

    pub api_key: Option<String>,

    /// Deadline for the run-creation request (seconds).
    pub submit_timeout_secs: u64,
}

impl Default for TaskApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.parallel.ai".to_string(),
            api_key: None,
            submit_timeout_secs: 20,
        }
    }
}

/// Poll reconciliation settings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Result-fetch wait when the caller does not ask for one (seconds).
    pub default_wait_secs: u64,

    /// Upper clamp for caller-requested waits (seconds).
    pub max_wait_secs: u64,

    /// Fixed deadline for the status probe (seconds).
    pub status_probe_timeout_secs: u64,

    pub stuck: StuckPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            default_wait_secs: 25,
            max_wait_secs: 55,
            status_probe_timeout_secs: 8,
            stuck: StuckPolicy::default(),
        }
    }
}

/// Thresholds for declaring a queued run stuck.
///
/// The per-tier estimates are heuristics; recalibrate them against the
/// upstream's observed queue latencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckPolicy {
    /// Slack added to the long-end estimate before a run counts as stuck.
    pub grace_secs: u64,
    pub lite_secs: u64,
    pub base_secs: u64,
    pub core_secs: u64,
    pub pro_secs: u64,
    pub ultra_secs: u64,
}

impl StuckPolicy {
    /// Long-end estimate for a tier when upstream exposes none.
    pub fn estimate_for(&self, tier: ProcessorTier) -> u64 {
        match tier {
            ProcessorTier::Lite => self.lite_secs,
            ProcessorTier::Base => self.base_secs,
            ProcessorTier::Core => self.core_secs,
            ProcessorTier::Pro => self.pro_secs,
            ProcessorTier::Ultra => self.ultra_secs,
        }
    }

    /// Returns true once `elapsed` exceeds `estimate` plus the grace period.
    pub fn is_stuck(&self, elapsed_secs: u64, estimate_secs: u64) -> bool {
        elapsed_secs > estimate_secs.saturating_add(self.grace_secs)
    }
}

impl Default for StuckPolicy {
    fn default() -> Self {
        Self {
            grace_secs: 10,
            lite_secs: ProcessorTier::Lite.default_long_end_secs(),
            base_secs: ProcessorTier::Base.default_long_end_secs(),
            core_secs: ProcessorTier::Core.default_long_end_secs(),
            pro_secs: ProcessorTier::Pro.default_long_end_secs(),
            ultra_secs: ProcessorTier::Ultra.default_long_end_secs(),
        }
    }
}
