//! Persistence layer
//!
//! Stores take an explicit transaction handle (`Tx`) on every call that must share
//! atomicity with other calls. The order workflow begins one unit of work, threads
//! it through product locking, stock updates and the order insert, then commits
//! or rolls it back as a whole.
//!
//! Two backends implement the traits:
//! - [`PgStore`]: PostgreSQL via sqlx (`SELECT ... FOR UPDATE` row locks)
//! - [`MemoryStore`]: in-process tables with per-product locks (tests, local runs)

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::models::{Order, Product};
use thiserror::Error;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
            sqlx::Error::Database(db_err)
                if db_err.is_check_violation() || db_err.is_foreign_key_violation() =>
            {
                StoreError::Constraint(db_err.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Unit of work boundary
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Transaction handle threaded through store calls
    type Tx: Send;

    async fn begin(&self) -> StoreResult<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> StoreResult<()>;
    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()>;
}

/// Product stock access
#[async_trait]
pub trait ProductStockStore: TransactionManager {
    /// Read a product and hold an exclusive lock on it until `tx` ends.
    ///
    /// Locking a product already locked by the same `tx` succeeds and returns the
    /// stock as last written inside `tx`.
    async fn lock_and_fetch(&self, tx: &mut Self::Tx, id: i64) -> StoreResult<Option<Product>>;

    /// Overwrite the stock of a product inside `tx`
    async fn set_stock(&self, tx: &mut Self::Tx, id: i64, stock: i32) -> StoreResult<()>;

    /// All committed products ordered by id (no locking)
    async fn list_products(&self) -> StoreResult<Vec<Product>>;
}

/// Order aggregate persistence
#[async_trait]
pub trait OrderStore: TransactionManager {
    /// Insert order header and items inside `tx`, returning the stored aggregate
    async fn insert(&self, tx: &mut Self::Tx, order: &NewOrder) -> StoreResult<Order>;

    /// Committed order with its items and product names
    async fn fetch_with_items_and_products(&self, id: i64) -> StoreResult<Option<Order>>;
}

/// Order ready to be persisted
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_name: String,
    pub total_amount: Decimal,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub subtotal: Decimal,
}
