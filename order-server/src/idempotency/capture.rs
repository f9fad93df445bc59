//! Response capture
//!
//! Buffers a downstream response so the same bytes can be handed to the caller
//! and cached for replay.

use axum::body::{Body, Bytes};
use axum::response::Response;
use http::header;
use http::response::Parts;

use super::CachedResponse;

/// Upper bound on a buffered response body (1 MiB)
pub const MAX_CAPTURED_BODY: usize = 1024 * 1024;

pub struct ResponseCapture {
    parts: Parts,
    body: Bytes,
}

impl ResponseCapture {
    /// Drain the response body into memory
    pub async fn from_response(response: Response) -> Result<Self, axum::Error> {
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, MAX_CAPTURED_BODY).await?;
        Ok(Self { parts, body })
    }

    pub fn status(&self) -> http::StatusCode {
        self.parts.status
    }

    pub fn is_success(&self) -> bool {
        self.parts.status.is_success()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Snapshot for the idempotency cache
    pub fn to_cached(&self) -> CachedResponse {
        CachedResponse {
            status: self.parts.status.as_u16(),
            content_type: self
                .parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
            body: self.body.to_vec(),
        }
    }

    /// Rebuild the original response from the buffered bytes
    pub fn into_response(self) -> Response {
        Response::from_parts(self.parts, Body::from(self.body))
    }
}
