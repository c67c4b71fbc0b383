//! HTTP request handlers.

mod compose;
mod health;
mod runs;

pub use compose::compose;
pub use health::health_check;
pub use runs::{create_run, poll_run};

use research_core::ProcessorTier;

use crate::http::responses::ApiError;

/// Parse an optional processor name; blank counts as absent.
fn parse_processor(raw: Option<&str>) -> Result<Option<ProcessorTier>, ApiError> {
    match raw.map(str::trim).filter(|p| !p.is_empty()) {
        None => Ok(None),
        Some(name) => name
            .parse()
            .map(Some)
            .map_err(|e: research_core::CoreError| ApiError::InvalidField {
                field: "processor",
                message: e.to_string(),
            }),
    }
}
