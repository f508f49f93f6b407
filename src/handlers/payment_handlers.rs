// handlers/payment_handlers.rs
use axum::extract::{Json, Path, State};
use serde_json::Value;

use crate::errors::{AppError, Result};
use crate::models::payment::PaymentRecord;
use crate::state::AppState;

/// Pass-through to the gateway's status query; stored outcomes are not consulted.
pub async fn check_payment_status(
    State(state): State<AppState>,
    Path(checkout_request_id): Path<String>,
) -> Result<Json<Value>> {
    let response = state.mpesa_service.query_status(&checkout_request_id).await?;
    Ok(Json(response))
}

pub async fn get_payment_outcome(
    State(state): State<AppState>,
    Path(checkout_request_id): Path<String>,
) -> Result<Json<PaymentRecord>> {
    state
        .payments
        .get_payment(&checkout_request_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Payment not found"))
}
