//! HTTP surface for the registration API
//!
//! Exposes the registry operations as JSON over HTTP with gRPC-style
//! status mapping, plus the authenticated admin review endpoint. The
//! router carries no state beyond the shared [`Registry`].

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::error::Error;
use crate::registry::{
    HealthCheck, LookupRequest, RegisterRequest, Registry, ReviewRequest, SearchRequest,
    VerifyContactRequest,
};

/// Build the API router over a shared registry
pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/v1/register", post(register))
        .route("/v1/lookup", get(lookup))
        .route("/v1/search", post(search))
        .route("/v1/verification", get(verification))
        .route("/v1/verify", get(verify_contact))
        .route("/v1/status", get(status))
        .route("/v1/review", post(review))
        .with_state(registry)
}

/// Error wrapper mapping the RPC taxonomy onto HTTP statuses
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            Error::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::AlreadyExists(_) => (StatusCode::CONFLICT, "ALREADY_EXISTS"),
            Error::FailedPrecondition(_) => {
                (StatusCode::PRECONDITION_FAILED, "FAILED_PRECONDITION")
            }
            Error::Aborted(_) => (StatusCode::CONFLICT, "ABORTED"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };
        let body = Json(json!({ "code": code, "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

async fn register(
    State(registry): State<Arc<Registry>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(registry.register(req).await?))
}

async fn lookup(
    State(registry): State<Arc<Registry>>,
    Query(req): Query<LookupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(registry.lookup(req).await?))
}

async fn search(
    State(registry): State<Arc<Registry>>,
    Json(req): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(registry.search(req).await?))
}

async fn verification(
    State(registry): State<Arc<Registry>>,
    Query(req): Query<LookupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(registry.verification(req).await?))
}

async fn verify_contact(
    State(registry): State<Arc<Registry>>,
    Query(req): Query<VerifyContactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(registry.verify_contact(req).await?))
}

async fn status(
    State(registry): State<Arc<Registry>>,
    Query(req): Query<HealthCheck>,
) -> impl IntoResponse {
    Json(registry.status(req))
}

async fn review(
    State(registry): State<Arc<Registry>>,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(registry.review(req).await?))
}
