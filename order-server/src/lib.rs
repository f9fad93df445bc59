//! order-server: order intake with retry-safe creation
//!
//! - `db`: unit-of-work stores (Postgres, in-memory)
//! - `orders`: transactional order workflow
//! - `products`: catalog listing and manual stock adjustment
//! - `idempotency`: duplicate-submission gate for create-order
//! - `api`: axum routes

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod idempotency;
pub mod logger;
pub mod orders;
pub mod products;
pub mod state;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
