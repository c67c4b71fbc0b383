//! `POST /runs` and `GET /runs` handlers.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use research_core::{PollOutcome, PollStatus, RunId};

use crate::http::responses::{
    ApiError, CreateRunBody, OutputBody, PollQuery, PollResponse, ResultBody, RunCreatedResponse,
};
use crate::service::{PollRequest, SubmitRequest};
use crate::state::AppState;

use super::parse_processor;

/// Submit a research run.
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    json_result: Result<Json<CreateRunBody>, JsonRejection>,
) -> Response {
    let body = match json_result {
        Ok(Json(body)) => body,
        Err(rejection) => {
            warn!(error = %rejection, "Invalid JSON in run request");
            return ApiError::InvalidJson {
                message: rejection.body_text(),
            }
            .into_response();
        }
    };

    if body.company_name.trim().is_empty() {
        return ApiError::MissingField {
            field: "companyName",
        }
        .into_response();
    }

    let processor = match parse_processor(body.processor.as_deref()) {
        Ok(processor) => processor,
        Err(e) => return e.into_response(),
    };

    let request = SubmitRequest {
        company_name: body.company_name,
        website: body.website,
        org_number: body.org_number,
        processor,
        input: body.input,
        output_schema: body.output_schema,
    };

    match state.submitter.submit(&request).await {
        Ok(run) => (
            StatusCode::ACCEPTED,
            Json(RunCreatedResponse {
                run_id: run.id().to_string(),
                status: PollStatus::Queued,
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, code = e.code(), "Run creation failed");
            ApiError::from(e).into_response()
        }
    }
}

/// Run one reconciliation pass for a run.
pub async fn poll_run(
    State(state): State<Arc<AppState>>,
    query_result: Result<Query<PollQuery>, QueryRejection>,
) -> Response {
    let query = match query_result {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return ApiError::InvalidQuery {
                message: rejection.body_text(),
            }
            .into_response();
        }
    };

    let Some(run_id) = query.run_id.filter(|id| !id.trim().is_empty()) else {
        return ApiError::MissingField { field: "runId" }.into_response();
    };

    let processor = match parse_processor(query.processor.as_deref()) {
        Ok(processor) => processor,
        Err(e) => return e.into_response(),
    };

    let request = PollRequest {
        run_id: RunId::new(run_id.trim()),
        wait_secs: query.wait_sec.and_then(whole_wait_secs),
        processor,
    };

    let outcome = state.coordinator.poll(&request).await;
    poll_response(request.run_id, outcome)
}

/// Floor a requested wait to whole seconds, with negatives at zero.
/// Non-finite values count as absent; the upper bound is applied by the coordinator.
fn whole_wait_secs(raw: f64) -> Option<u64> {
    raw.is_finite().then(|| raw.max(0.0).floor() as u64)
}

fn poll_response(run_id: RunId, outcome: PollOutcome) -> Response {
    let status = outcome.status;
    let retry_after = outcome.retry_after_seconds;

    let body = PollResponse {
        run_id: run_id.into_inner(),
        status,
        result: outcome.result.map(|result| ResultBody {
            output: OutputBody {
                text: result.text,
                basis: result.basis,
            },
            citations: result.citations,
        }),
        retry_after_seconds: retry_after,
        diagnostics: outcome.diagnostics,
        error: outcome.error,
    };

    if status.is_terminal() {
        return (StatusCode::OK, Json(body)).into_response();
    }

    let mut response = (StatusCode::ACCEPTED, Json(body)).into_response();
    if let Some(secs) = retry_after {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}
