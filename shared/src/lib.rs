//! Shared types for the order intake service
//!
//! Common types used by the server and its clients: error codes, the unified
//! API response envelope, domain models and request/response payloads.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::{Json, body};
pub use http;
pub use serde::{Deserialize, Serialize};
