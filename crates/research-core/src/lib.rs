//! Research Orchestrator Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP clients
//! - Database
//! - Runtime specifics
//!
//! All types here describe the research-job lifecycle: composing a task,
//! the run it becomes, and the outcome of each reconciliation pass.

pub mod error;
pub mod ids;
pub mod model;
pub mod normalize;
pub mod run;
pub mod status;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{GenerationToken, RunId};
pub use model::{ComposeResult, ModelCandidate};
pub use normalize::{normalize, normalize_envelope, Citation, NormalizedResult, OutputShape};
pub use run::{PollDiagnostics, PollOutcome, Run};
pub use status::{PollStatus, ProcessorTier};
