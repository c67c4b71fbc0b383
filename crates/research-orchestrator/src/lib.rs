//! Research Orchestrator Library
//!
//! Turns free-form research requests into runs on a long-running task API
//! and reconciles those runs into a stable status contract:
//!
//! - [`service::Composer`] authors a task through an ordered list of models.
//! - [`service::Submitter`] creates exactly one upstream run.
//! - [`service::PollCoordinator`] performs one bounded reconciliation pass.
//!
//! Polling is driven by callers; nothing here runs in the background.

pub mod config;
pub mod deadline;
pub mod http;
pub mod service;
pub mod state;
pub mod upstream;

pub use config::Config;
pub use http::create_router;
pub use state::AppState;
