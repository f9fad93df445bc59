//! Service-layer error type
//!
//! `OrderError` bridges store errors (`StoreError`) and the API-layer error
//! (`AppError`). Store-level text is logged here and never reaches the client.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use crate::db::StoreError;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Product {0} not found")]
    ProductNotFound(i64),

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: i64,
        requested: i32,
        available: i32,
    },

    #[error("Failed to update stock for product {product_id}")]
    StockUpdateFailed {
        product_id: i64,
        #[source]
        source: StoreError,
    },

    #[error("Failed to persist order")]
    OrderPersistFailed(#[source] StoreError),

    /// Commit did not acknowledge: the order may or may not exist
    #[error("Transaction commit failed, outcome unknown")]
    TransactionCommitFailed(#[source] StoreError),

    #[error("Order {0} not found")]
    OrderNotFound(i64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Store unavailable before any work was done (begin, plain reads)
    #[error("Store error")]
    Store(#[from] StoreError),
}

pub type OrderResult<T> = Result<T, OrderError>;

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::ProductNotFound(id) => {
                AppError::with_message(ErrorCode::ProductNotFound, format!("Product {id} not found"))
                    .with_detail("product_id", id)
            }
            OrderError::InsufficientStock {
                product_id,
                requested,
                available,
            } => AppError::with_message(
                ErrorCode::InsufficientStock,
                format!("Insufficient stock for product {product_id}"),
            )
            .with_detail("product_id", product_id)
            .with_detail("requested", requested)
            .with_detail("available", available),
            OrderError::StockUpdateFailed { product_id, source } => {
                tracing::error!(product_id, error = %source, "Stock update failed");
                AppError::new(ErrorCode::StockUpdateFailed).with_detail("product_id", product_id)
            }
            OrderError::OrderPersistFailed(source) => {
                tracing::error!(error = %source, "Order insert failed");
                AppError::new(ErrorCode::OrderPersistFailed)
            }
            OrderError::TransactionCommitFailed(source) => {
                tracing::error!(error = %source, "Transaction commit failed");
                AppError::new(ErrorCode::TransactionCommitFailed).with_detail("outcome", "unknown")
            }
            OrderError::OrderNotFound(id) => {
                AppError::with_message(ErrorCode::OrderNotFound, format!("Order {id} not found"))
                    .with_detail("order_id", id)
            }
            OrderError::InvalidRequest(msg) => AppError::invalid_request(msg),
            OrderError::Validation(msg) => AppError::validation(msg),
            OrderError::Store(source) => {
                tracing::error!(error = %source, "Store unavailable");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}
