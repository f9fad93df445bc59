//! Idempotency middleware for the create-order route

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::error::{AppError, ErrorCode};

use super::{Admission, IDEMPOTENCY_HEADER, IdempotencyGate, ResponseCapture};

/// Apply the idempotency protocol around `next`.
///
/// Install with `middleware::from_fn_with_state(gate, idempotency_layer)`.
pub async fn idempotency_layer(
    State(gate): State<IdempotencyGate>,
    request: Request,
    next: Next,
) -> Response {
    let token = match request.headers().get(IDEMPOTENCY_HEADER) {
        None => None,
        Some(value) => match value.to_str() {
            Ok(token) => Some(token.to_owned()),
            Err(_) => {
                return AppError::invalid_request("Idempotency-Key must be visible ASCII")
                    .into_response();
            }
        },
    };

    let key = match gate.admit(token.as_deref()).await {
        Admission::Bypass => return next.run(request).await,
        Admission::Conflict => {
            tracing::info!(idempotency_key = ?token, "Duplicate request while in progress");
            return AppError::new(ErrorCode::IdempotencyConflict).into_response();
        }
        Admission::Replay(cached) => {
            tracing::info!(idempotency_key = ?token, "Replaying completed response");
            return cached.into_response();
        }
        Admission::Claimed(key) => key,
    };

    let response = next.run(request).await;
    let capture = match ResponseCapture::from_response(response).await {
        Ok(capture) => capture,
        Err(e) => {
            tracing::error!(idempotency_key = %key, error = %e, "Failed to buffer response");
            return AppError::internal("Failed to read response").into_response();
        }
    };

    if capture.is_success() {
        gate.complete(&key, capture.to_cached()).await;
    } else {
        tracing::warn!(
            idempotency_key = %key,
            status = capture.status().as_u16(),
            "Request failed, key held until expiry"
        );
    }

    capture.into_response()
}
