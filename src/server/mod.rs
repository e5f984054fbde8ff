//! HTTP boundary.
//!
//! A thin axum layer over the [`OperationManager`]: start an operation,
//! poll its status, fetch the fitted result as base64, and append to the
//! prompt library. All domain decisions live in the manager; handlers
//! translate between JSON and domain calls and map errors to the uniform
//! [`ErrorResponse`] envelope.

pub mod config;
pub mod model;

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::stream;
use tracing::{debug, info};

use crate::manager::{OpType, OperationManager, Status};
use crate::prompts::PromptLibrary;
use crate::providers::compose_prompt;
use crate::telemetry;
use crate::ArtgateError;

use model::{
    ErrorResponse, ImageBody, PromptAddRequest, ResultQuery, ResultResponse, StartRequest,
    StartResponse, StatusResponse,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<OperationManager>,
    pub prompts: Arc<PromptLibrary>,
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/operation/start", post(start_operation))
        .route("/operation/status/{id}", get(operation_status))
        .route("/operation/result/{id}", get(operation_result))
        .route("/prompt/add", post(prompt_add))
        .with_state(state)
}

async fn start_operation(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let op_type = OpType::parse(&req.op_type);
    let prompt = req
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| compose_prompt(p, req.negative.as_deref()));

    info!(?op_type, has_prompt = prompt.is_some(), "start operation");
    let id = state
        .manager
        .start_operation(op_type, prompt.as_deref())
        .await?;
    // Cache peek only: a freshly started provider operation is pending,
    // a local one already done.
    let status = state.manager.peek_status(&id).await?;
    Ok(Json(StartResponse {
        id,
        status: status.status,
    }))
}

async fn operation_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let result = state.manager.status(&id).await;
    let outcome = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(telemetry::STATUS_CHECKS_TOTAL, "status" => outcome).increment(1);
    let status = result?;
    debug!(operation_id = %id, status = ?status.status, "status check");
    Ok(Json(StatusResponse::new(id, status)))
}

/// Serves the serialized result in caller-configurable chunks so large
/// base64 payloads stream instead of landing in one write.
async fn operation_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ResultQuery>,
) -> Result<Response, ApiError> {
    let json = match result_payload(&state, &id).await {
        Ok(json) => {
            metrics::counter!(telemetry::IMAGES_SERVED_TOTAL, "status" => "ok").increment(1);
            json
        }
        Err(err) => {
            metrics::counter!(telemetry::IMAGES_SERVED_TOTAL, "status" => "error").increment(1);
            return Err(err.into());
        }
    };

    let chunk_size = query.chunk_size_or_default();
    debug!(operation_id = %id, size = json.len(), chunk_size, "serving result");
    let chunks: Vec<Result<Bytes, Infallible>> = json
        .chunks(chunk_size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    let body = Body::from_stream(stream::iter(chunks));
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

async fn result_payload(state: &AppState, id: &str) -> Result<Vec<u8>, ArtgateError> {
    let path = state.manager.file_name(id).await?;
    let bytes = tokio::fs::read(&path).await?;
    let body = ResultResponse {
        id: id.to_string(),
        status: Status::Done,
        response: ImageBody {
            image: BASE64.encode(&bytes),
        },
    };
    Ok(serde_json::to_vec(&body)?)
}

async fn prompt_add(
    State(state): State<AppState>,
    Json(req): Json<PromptAddRequest>,
) -> Result<StatusCode, ApiError> {
    state.prompts.add(req.prompt, req.negative)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Error wrapper mapping domain errors onto HTTP statuses.
#[derive(Debug)]
pub struct ApiError(ArtgateError);

impl From<ArtgateError> for ApiError {
    fn from(err: ArtgateError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.0 {
            ArtgateError::NotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found", "operation not found")
            }
            ArtgateError::NotComplete(_) => (
                StatusCode::CONFLICT,
                "not_complete",
                "operation is not complete",
            ),
            ArtgateError::InvalidInput(_) => {
                (StatusCode::BAD_REQUEST, "invalid_input", "invalid request")
            }
            ArtgateError::PoolEmpty => (
                StatusCode::SERVICE_UNAVAILABLE,
                "pool_empty",
                "no image available",
            ),
            ArtgateError::NoProvider => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no_provider",
                "no image provider available",
            ),
            ArtgateError::NoPrompts => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no_prompts",
                "no prompts available",
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "internal error",
            ),
        };
        let body = ErrorResponse::new(code, message, Some(self.0.to_string()));
        (status, Json(body)).into_response()
    }
}
