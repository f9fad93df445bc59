//! Order API

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::idempotency::idempotency_layer;
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new().nest("/api/orders", order_routes(state))
}

fn order_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(handler::create).layer(middleware::from_fn_with_state(
                state.idempotency.clone(),
                idempotency_layer,
            )),
        )
        .route("/{id}", get(handler::get_by_id))
}
