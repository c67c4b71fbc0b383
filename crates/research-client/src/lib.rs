//! Client library for the research orchestrator.
//!
//! Provides an HTTP client for the orchestrator's REST endpoints and a
//! caller-driven poll loop that follows a run until it settles.

pub mod error;
pub mod http;
pub mod poll_loop;

pub use error::ClientError;
pub use http::{
    ComposeRequest, ComposeResponse, CreateRunRequest, HttpClient, PollResponse, RunCreated,
    RunOutput, RunResult,
};
pub use poll_loop::{LoopOutcome, PollLoop, RunPoller, RunTracker};
