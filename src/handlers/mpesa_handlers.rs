// handlers/mpesa_handlers.rs
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::errors::{AppError, Result};
use crate::models::payment::PendingPayment;
use crate::services::mpesa_service::PushRequest;
use crate::state::AppState;

// C2B Handlers
pub async fn initiate_stk_push(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(request) = payload.map_err(|e| AppError::invalid_data(e.body_text()))?;

    let submission = state.mpesa_service.submit(&request).await?;

    let pending = PendingPayment {
        checkout_request_id: submission.checkout_request_id.clone(),
        merchant_request_id: submission.merchant_request_id.clone(),
        account_reference: submission.account_reference.clone(),
        phone_number: submission.phone_number.clone(),
        amount: submission.amount,
    };
    if let Err(e) = state.payments.create_pending_outcome(pending).await {
        error!(
            checkout_request_id = %submission.checkout_request_id,
            error = %e,
            "Failed to record pending payment"
        );
    }

    info!(checkout_request_id = %submission.checkout_request_id, "STK push initiated");
    Ok(Json(json!({
        "success": true,
        "message": "STK push initiated successfully",
        "data": submission.raw,
        "checkoutRequestID": submission.checkout_request_id,
    })))
}

/// Daraja only needs to know the callback arrived. Malformed envelopes and
/// storage failures get a 500 so it tries again.
pub async fn mpesa_callback(State(state): State<AppState>, body: Bytes) -> Response {
    match state.reconciler.handle(&body).await {
        Ok(_) => (StatusCode::OK, "Callback received successfully").into_response(),
        Err(e) => {
            error!(error = %e, "Failed to process M-Pesa callback");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error processing callback").into_response()
        }
    }
}
