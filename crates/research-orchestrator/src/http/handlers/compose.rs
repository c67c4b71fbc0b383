//! `POST /compose` handler.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use crate::http::responses::{ApiError, ComposeBody};
use crate::service::ComposeRequest;
use crate::state::AppState;

use super::parse_processor;

/// Author a research task from a free-form prompt.
pub async fn compose(
    State(state): State<Arc<AppState>>,
    json_result: Result<Json<ComposeBody>, JsonRejection>,
) -> Response {
    let body = match json_result {
        Ok(Json(body)) => body,
        Err(rejection) => {
            warn!(error = %rejection, "Invalid JSON in compose request");
            return ApiError::InvalidJson {
                message: rejection.body_text(),
            }
            .into_response();
        }
    };

    let processor = match parse_processor(body.processor.as_deref()) {
        Ok(processor) => processor,
        Err(e) => return e.into_response(),
    };

    let request = ComposeRequest {
        prompt: body.prompt,
        business_context: body.business_context,
        company_block: body.company_block,
        processor,
    };

    match state.composer.compose(&request).await {
        Ok(result) => {
            info!(model = %result.model(), "Compose request served");
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Compose request failed");
            ApiError::from(e).into_response()
        }
    }
}
