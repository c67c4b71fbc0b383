//! Core domain errors.

use thiserror::Error;

/// Core domain errors for the research orchestrator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A required field was empty after trimming.
    #[error("Empty field: {0}")]
    EmptyField(&'static str),

    /// Processor tier name not recognized.
    #[error("Unknown processor tier: {0}")]
    UnknownProcessor(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
