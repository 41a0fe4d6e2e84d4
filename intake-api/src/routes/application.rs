//! Application REST API Routes
//!
//! Axum handlers for the application intake endpoints. Handlers only
//! translate between HTTP and [`SubmissionService`].

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use intake_core::ApplicationData;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    services::SubmissionService,
    types::{GetResponse, ListResponse, MessageResponse, SubmitResponse},
};

// ============================================================================
// SHARED STATE
// ============================================================================

/// Shared application state for application routes.
#[derive(Clone)]
pub struct ApplicationState {
    pub service: SubmissionService,
}

impl ApplicationState {
    pub fn new(service: SubmissionService) -> Self {
        Self { service }
    }
}

fn payload(body: Result<Json<JsonValue>, JsonRejection>) -> ApiResult<ApplicationData> {
    match body {
        Ok(Json(value)) => Ok(ApplicationData::new(value)),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected request body");
            Err(ApiError::invalid_input(rejection.body_text()))
        }
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/application - Submit a new application
#[utoipa::path(
    post,
    path = "/api/application",
    tag = "Applications",
    request_body(content = ApplicationData, description = "Structured application payload"),
    responses(
        (status = 201, description = "Application accepted", body = SubmitResponse),
        (status = 400, description = "Required fields missing or duplicate application", body = ApiError),
        (status = 500, description = "Server error", body = ApiError),
    ),
)]
pub async fn submit_application(
    State(state): State<Arc<ApplicationState>>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let data = payload(body)?;
    let receipt = state.service.submit(data).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse::new(receipt.application_id)),
    ))
}

/// GET /api/applications - List all applications, newest first
#[utoipa::path(
    get,
    path = "/api/applications",
    tag = "Applications",
    responses(
        (status = 200, description = "All applications", body = ListResponse),
        (status = 500, description = "Server error", body = ApiError),
    ),
)]
pub async fn list_applications(
    State(state): State<Arc<ApplicationState>>,
) -> ApiResult<impl IntoResponse> {
    let records = state.service.list().await?;
    Ok(Json(ListResponse::new(records)))
}

/// GET /api/application/{id} - Fetch one application
#[utoipa::path(
    get,
    path = "/api/application/{id}",
    tag = "Applications",
    params(
        ("id" = String, Path, description = "Display identifier, e.g. APP-202505-00007")
    ),
    responses(
        (status = 200, description = "Application details", body = GetResponse),
        (status = 404, description = "Application not found", body = ApiError),
        (status = 500, description = "Server error", body = ApiError),
    ),
)]
pub async fn get_application(
    State(state): State<Arc<ApplicationState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let record = state.service.fetch(&id).await?;
    Ok(Json(GetResponse::new(record)))
}

/// PUT /api/application/{id} - Replace an application's payload
#[utoipa::path(
    put,
    path = "/api/application/{id}",
    tag = "Applications",
    params(
        ("id" = String, Path, description = "Display identifier")
    ),
    request_body(content = ApplicationData, description = "Replacement payload (no merge)"),
    responses(
        (status = 200, description = "Application updated", body = MessageResponse),
        (status = 400, description = "Payload is not a JSON object", body = ApiError),
        (status = 404, description = "Application not found", body = ApiError),
        (status = 500, description = "Server error", body = ApiError),
    ),
)]
pub async fn update_application(
    State(state): State<Arc<ApplicationState>>,
    Path(id): Path<String>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let data = payload(body)?;
    state.service.replace(&id, data).await?;
    Ok(Json(MessageResponse::new("Application updated")))
}

/// DELETE /api/application/{id} - Delete an application
#[utoipa::path(
    delete,
    path = "/api/application/{id}",
    tag = "Applications",
    params(
        ("id" = String, Path, description = "Display identifier")
    ),
    responses(
        (status = 200, description = "Application deleted", body = MessageResponse),
        (status = 404, description = "Application not found", body = ApiError),
        (status = 500, description = "Server error", body = ApiError),
    ),
)]
pub async fn delete_application(
    State(state): State<Arc<ApplicationState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.service.remove(&id).await?;
    Ok(Json(MessageResponse::new("Application deleted")))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

/// Create the application router, mounted under `/api`.
pub fn create_router(service: SubmissionService) -> Router {
    let state = Arc::new(ApplicationState::new(service));

    Router::new()
        .route("/application", post(submit_application))
        .route("/applications", get(list_applications))
        .route(
            "/application/:id",
            get(get_application)
                .put(update_application)
                .delete(delete_application),
        )
        .with_state(state)
}
