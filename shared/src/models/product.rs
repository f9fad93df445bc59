//! Product Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Product entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub name: String,
    /// Unit price (NUMERIC(10,2))
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Units on hand, never negative once committed
    pub stock: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Manual stock adjustment payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateStockRequest {
    #[validate(range(min = 0, message = "stock must not be negative"))]
    pub stock: i32,
}
