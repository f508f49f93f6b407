// handlers/order_handlers.rs
use axum::extract::{rejection::JsonRejection, Json, Path, State};
use serde_json::{json, Value};
use tracing::info;
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::order::{CreateOrder, Order};
use crate::state::AppState;

pub async fn create_order(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateOrder>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(payload) = payload.map_err(|e| AppError::invalid_data(e.body_text()))?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::invalid_data(format!("Validation failed: {}", validation_errors)));
    }

    let order = state.orders.create_order(Order::new(payload)).await?;

    info!(
        order_id = %order.order_id,
        items = order.cart_items.len(),
        total = order.total,
        payment_method = %order.payment_method,
        "Order created"
    );
    Ok(Json(json!({
        "success": true,
        "orderId": order.order_id,
        "message": "Order created successfully",
    })))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>> {
    state
        .orders
        .get_order(&order_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Order not found"))
}
