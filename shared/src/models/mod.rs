//! Data models
//!
//! Shared between the server and its clients (via API).
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` (Postgres BIGSERIAL), timestamps are epoch millis.
//! Money is `rust_decimal::Decimal`, serialized as a JSON number.

pub mod order;
pub mod product;

// Re-exports
pub use order::*;
pub use product::*;
