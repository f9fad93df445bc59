//! HTTP API
//!
//! - `POST /api/orders` (idempotency-gated)
//! - `GET  /api/orders/{id}`
//! - `GET  /api/products`
//! - `PUT  /api/products/{id}/stock`
//! - `GET  /health`

pub mod health;
pub mod orders;
pub mod products;

use axum::Router;
use axum::extract::Path;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::routing::get;
use http::HeaderName;
use shared::error::AppError;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use validator::ValidationErrors;

use crate::state::AppState;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(orders::router(&state))
        .merge(products::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        // Request ID: set before tracing, echoed on the response
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .with_state(state)
}

/// Map validator output to a 400 with per-field messages
pub(crate) fn validation_error(errors: ValidationErrors) -> AppError {
    let mut err = AppError::validation("Request validation failed");
    for (field, field_errors) in errors.field_errors() {
        let messages: Vec<String> = field_errors
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string())
            })
            .collect();
        err = err.with_detail(field.to_string(), messages);
    }
    if err.details.is_none() {
        // Only nested (per-item) errors
        err = err.with_detail("errors", errors.to_string());
    }
    err
}

pub(crate) fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::invalid_request(rejection.body_text())
}

/// Positive numeric id from the path
pub(crate) fn path_id(id: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    match id {
        Ok(Path(id)) if id > 0 => Ok(id),
        _ => Err(AppError::invalid_request("id must be a positive integer")),
    }
}
