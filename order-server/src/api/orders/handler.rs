//! Order API Handlers

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
};
use http::StatusCode;
use shared::error::{ApiResponse, AppError, AppResult};
use shared::models::{CreateOrderRequest, OrderCreated, OrderResponse};
use validator::Validate;

use crate::api::{json_rejection, path_id, validation_error};
use crate::state::AppState;

/// POST /api/orders - create an order
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> AppResult<(StatusCode, ApiResponse<OrderCreated>)> {
    let Json(payload) = payload.map_err(json_rejection)?;
    payload.validate().map_err(validation_error)?;

    let order = state
        .orders
        .create_order(payload)
        .await
        .map_err(AppError::from)?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::success_with_message("Order created", OrderCreated::from(&order)),
    ))
}

/// GET /api/orders/{id} - order with items
pub async fn get_by_id(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<OrderResponse>> {
    let id = path_id(id)?;
    let order = state.orders.get_order(id).await.map_err(AppError::from)?;
    Ok(Json(OrderResponse::from(order)))
}
