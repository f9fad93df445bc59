//! Idempotency gate
//!
//! Guards the create-order entry point against duplicate submissions. Each client
//! token maps to a record in a shared cache with expiring entries:
//!
//! ```text
//! Absent ──claim──▶ IN_PROGRESS ──2xx captured──▶ COMPLETED
//!    ▲                   │                            │
//!    └───────── TTL ─────┴────────────────────────────┘
//! ```
//!
//! - IN_PROGRESS seen by another caller: 409 conflict, handler not run
//! - COMPLETED seen by any caller: cached response replayed byte for byte
//! - handler produced a non-2xx response: record stays IN_PROGRESS until it expires
//! - cache unreachable: request proceeds without deduplication (logged)

pub mod capture;
pub mod memory;
pub mod middleware;
pub mod postgres;

pub use capture::ResponseCapture;
pub use memory::MemoryIdempotencyStore;
pub use middleware::idempotency_layer;
pub use postgres::PgIdempotencyStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode, header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cache key namespace
pub const KEY_PREFIX: &str = "idempotency:";

/// Request header carrying the client token
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Default record lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
}

/// Response as produced by the handler, kept for replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        if let Some(content_type) = self
            .content_type
            .and_then(|ct| HeaderValue::from_str(&ct).ok())
        {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub status: IdempotencyStatus,
    /// Present once COMPLETED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<CachedResponse>,
}

impl IdempotencyRecord {
    pub fn in_progress() -> Self {
        Self {
            status: IdempotencyStatus::InProgress,
            response: None,
        }
    }

    pub fn completed(response: CachedResponse) -> Self {
        Self {
            status: IdempotencyStatus::Completed,
            response: Some(response),
        }
    }
}

#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Malformed record: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<sqlx::Error> for IdempotencyError {
    fn from(err: sqlx::Error) -> Self {
        IdempotencyError::Backend(err.to_string())
    }
}

pub type IdempotencyResult<T> = Result<T, IdempotencyError>;

/// Shared key-value cache with expiring entries
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Live (non-expired) record for `key`
    async fn get(&self, key: &str) -> IdempotencyResult<Option<IdempotencyRecord>>;

    /// Write `record` unconditionally with a fresh expiry (last write wins)
    async fn set(
        &self,
        key: &str,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> IdempotencyResult<()>;

    /// Write `record` only if no live record exists. Returns whether it was written.
    ///
    /// The default is get-then-set and is NOT atomic: two callers may both see
    /// the key absent and both write. Backends that can claim atomically override it.
    async fn set_if_absent(
        &self,
        key: &str,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> IdempotencyResult<bool> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }
        self.set(key, record, ttl).await?;
        Ok(true)
    }

    /// Drop expired records, returning how many were removed
    async fn evict_expired(&self) -> IdempotencyResult<u64>;
}

/// Outcome of presenting a token to the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// No token, or the cache is unreachable: run the handler without dedup
    Bypass,
    /// This caller owns the key and must run the handler
    Claimed(String),
    /// Another caller owns the key and has not completed
    Conflict,
    /// Completed earlier; return this instead of running the handler
    Replay(CachedResponse),
}

#[derive(Clone)]
pub struct IdempotencyGate {
    store: Arc<dyn IdempotencyStore>,
    ttl: Duration,
}

impl IdempotencyGate {
    pub fn new(store: Arc<dyn IdempotencyStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cache key for a client token
    pub fn cache_key(token: &str) -> String {
        format!("{KEY_PREFIX}{token}")
    }

    /// Decide whether a request carrying `token` may proceed
    pub async fn admit(&self, token: Option<&str>) -> Admission {
        let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
            return Admission::Bypass;
        };
        let key = Self::cache_key(token);

        match self.store.get(&key).await {
            Ok(Some(record)) => return Self::decide_existing(record),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(idempotency_key = %key, error = %e, "Idempotency lookup failed, proceeding without dedup");
                return Admission::Bypass;
            }
        }

        match self
            .store
            .set_if_absent(&key, &IdempotencyRecord::in_progress(), self.ttl)
            .await
        {
            Ok(true) => {
                tracing::debug!(idempotency_key = %key, "Idempotency key claimed");
                Admission::Claimed(key)
            }
            // Another caller claimed between our read and our claim
            Ok(false) => match self.store.get(&key).await {
                Ok(Some(record)) => Self::decide_existing(record),
                _ => Admission::Conflict,
            },
            Err(e) => {
                tracing::warn!(idempotency_key = %key, error = %e, "Idempotency claim failed, proceeding without dedup");
                Admission::Bypass
            }
        }
    }

    /// Move a claimed key to COMPLETED with the captured response
    pub async fn complete(&self, key: &str, response: CachedResponse) {
        if let Err(e) = self
            .store
            .set(key, &IdempotencyRecord::completed(response), self.ttl)
            .await
        {
            tracing::error!(idempotency_key = %key, error = %e, "Failed to store idempotent response");
        }
    }

    pub async fn evict_expired(&self) {
        match self.store.evict_expired().await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Evicted expired idempotency records"),
            Err(e) => tracing::warn!(error = %e, "Idempotency eviction failed"),
        }
    }

    fn decide_existing(record: IdempotencyRecord) -> Admission {
        match (record.status, record.response) {
            (IdempotencyStatus::Completed, Some(response)) => Admission::Replay(response),
            _ => Admission::Conflict,
        }
    }
}

mod body_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
