//! Status enums for polls and processor tiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Caller-facing status of a research run, recomputed on every poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    /// Run accepted upstream but not started (also the fallback on probe failure).
    #[default]
    Queued,
    /// Run actively executing upstream.
    Running,
    /// Result fetched and normalized.
    Completed,
    /// Queued far longer than its estimated ceiling. Advisory only.
    Stuck,
    /// Upstream reported a definitive failure.
    Error,
}

impl PollStatus {
    /// Returns true if the caller must stop polling this run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Returns true for soft-terminal states the caller may retry or abandon.
    pub fn is_advisory(&self) -> bool {
        matches!(self, Self::Stuck)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stuck => "stuck",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality/cost/latency level of a research job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorTier {
    Lite,
    #[default]
    Base,
    Core,
    Pro,
    Ultra,
}

impl ProcessorTier {
    pub const ALL: [ProcessorTier; 5] = [
        ProcessorTier::Lite,
        ProcessorTier::Base,
        ProcessorTier::Core,
        ProcessorTier::Pro,
        ProcessorTier::Ultra,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lite => "lite",
            Self::Base => "base",
            Self::Core => "core",
            Self::Pro => "pro",
            Self::Ultra => "ultra",
        }
    }

    /// Target length of the research answer requested in the authoring prompt.
    pub fn word_budget(&self) -> u32 {
        match self {
            Self::Lite => 150,
            Self::Base => 300,
            Self::Core => 500,
            Self::Pro => 900,
            Self::Ultra => 1500,
        }
    }

    /// Heuristic upper bound on queue time, used when upstream gives no estimate.
    pub fn default_long_end_secs(&self) -> u64 {
        match self {
            Self::Lite => 90,
            Self::Base | Self::Core => 120,
            Self::Pro => 180,
            Self::Ultra => 240,
        }
    }
}

impl fmt::Display for ProcessorTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessorTier {
    type Err = CoreError;

    /// Accepts plain tier names and upstream variants such as `pro-fast`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let head = lowered
            .split(|c: char| c == '-' || c == '_')
            .next()
            .unwrap_or_default();

        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str() == head)
            .ok_or_else(|| CoreError::UnknownProcessor(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(PollStatus::Completed.is_terminal());
        assert!(PollStatus::Error.is_terminal());
        assert!(!PollStatus::Stuck.is_terminal());
        assert!(PollStatus::Stuck.is_advisory());
        assert!(!PollStatus::Queued.is_terminal());
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("pro".parse::<ProcessorTier>().unwrap(), ProcessorTier::Pro);
        assert_eq!("ULTRA".parse::<ProcessorTier>().unwrap(), ProcessorTier::Ultra);
        assert_eq!("lite-fast".parse::<ProcessorTier>().unwrap(), ProcessorTier::Lite);
        assert!(matches!(
            "turbo".parse::<ProcessorTier>(),
            Err(CoreError::UnknownProcessor(_))
        ));
    }

    #[test]
    fn test_tier_defaults() {
        assert_eq!(ProcessorTier::Lite.default_long_end_secs(), 90);
        assert_eq!(ProcessorTier::Base.default_long_end_secs(), 120);
        assert_eq!(ProcessorTier::Pro.default_long_end_secs(), 180);
        assert_eq!(ProcessorTier::Ultra.default_long_end_secs(), 240);
        assert_eq!(ProcessorTier::default(), ProcessorTier::Base);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&PollStatus::Stuck).unwrap(), "\"stuck\"");
    }
}
