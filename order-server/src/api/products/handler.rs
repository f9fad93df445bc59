//! Product API Handlers

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
};
use shared::error::{ApiResponse, AppError, AppResult};
use shared::models::{Product, UpdateStockRequest};
use validator::Validate;

use crate::api::{json_rejection, path_id, validation_error};
use crate::state::AppState;

/// GET /api/products - all products
pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    let products = state
        .catalog
        .list_products()
        .await
        .map_err(AppError::from)?;
    Ok(Json(products))
}

/// PUT /api/products/{id}/stock - overwrite stock
pub async fn update_stock(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateStockRequest>, JsonRejection>,
) -> AppResult<ApiResponse<Product>> {
    let id = path_id(id)?;
    let Json(payload) = payload.map_err(json_rejection)?;
    payload.validate().map_err(validation_error)?;

    let product = state
        .catalog
        .update_stock(id, payload.stock)
        .await
        .map_err(AppError::from)?;
    Ok(ApiResponse::success_with_message("Stock updated", product))
}
