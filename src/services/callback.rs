// services/callback.rs
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::database::PaymentStore;
use crate::errors::{AppError, Result};
use crate::models::mpesa_callback::{CallbackEnvelope, StkCallback};
use crate::models::payment::{PaymentOutcome, PaymentStatus, Transition};
use crate::services::redact::mask_phone;

/// Parses the raw callback body. Anything that is not a `Body.stkCallback`
/// envelope is rejected so the gateway redelivers.
pub fn parse_callback(raw: &[u8]) -> Result<StkCallback> {
    serde_json::from_slice::<CallbackEnvelope>(raw)
        .map(|envelope| envelope.body.stk_callback)
        .map_err(|e| AppError::CallbackParse(e.to_string()))
}

/// Success is `ResultCode == 0` and nothing else.
pub fn outcome_from_callback(callback: &StkCallback) -> PaymentOutcome {
    if callback.result_code() != Some(0) {
        let reason = callback
            .result_desc
            .clone()
            .unwrap_or_else(|| "Payment failed".to_string());
        return PaymentOutcome::failed(reason);
    }

    PaymentOutcome {
        status: PaymentStatus::Confirmed,
        receipt_number: callback.metadata("MpesaReceiptNumber").and_then(value_to_string),
        amount: callback.metadata("Amount").and_then(value_to_amount),
        payer_phone: callback.metadata("PhoneNumber").and_then(value_to_string),
        transaction_date: callback.metadata("TransactionDate").and_then(value_to_string),
        failure_reason: None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_amount(value: &Value) -> Option<u64> {
    let float = match value {
        Value::Number(n) => {
            if let Some(whole) = n.as_u64() {
                return Some(whole);
            }
            n.as_f64()?
        }
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !float.is_finite() || float < 0.0 || float.fract() != 0.0 || float >= u64::MAX as f64 {
        warn!(amount = %value, "Callback amount is not a whole number; ignoring it");
        return None;
    }
    Some(float as u64)
}

/// What one callback delivery did.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub checkout_request_id: Option<String>,
    pub merchant_request_id: Option<String>,
    pub outcome: PaymentOutcome,
    pub transition: Option<Transition>,
}

/// Turns gateway callbacks into payment transitions. Holds no state of its
/// own; idempotence is the store's job.
pub struct CallbackReconciler {
    store: Arc<dyn PaymentStore>,
}

impl CallbackReconciler {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        CallbackReconciler { store }
    }

    pub async fn handle(&self, raw: &[u8]) -> Result<Reconciliation> {
        let callback = parse_callback(raw).map_err(|e| {
            error!(error = %e, "Rejecting malformed M-Pesa callback");
            e
        })?;
        let outcome = outcome_from_callback(&callback);

        info!(
            checkout_request_id = callback.checkout_request_id.as_deref().unwrap_or("-"),
            merchant_request_id = callback.merchant_request_id.as_deref().unwrap_or("-"),
            result_code = ?callback.result_code(),
            status = %outcome.status,
            receipt = outcome.receipt_number.as_deref().unwrap_or("-"),
            payer = %outcome.payer_phone.as_deref().map(mask_phone).unwrap_or_default(),
            "Received M-Pesa callback"
        );

        let checkout_request_id = match callback
            .checkout_request_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            Some(id) => id.to_string(),
            None => {
                warn!("Callback carries no CheckoutRequestID; nothing to reconcile");
                return Ok(Reconciliation {
                    checkout_request_id: None,
                    merchant_request_id: callback.merchant_request_id,
                    outcome,
                    transition: None,
                });
            }
        };

        let transition = self
            .store
            .transition_outcome(
                &checkout_request_id,
                callback.merchant_request_id.as_deref(),
                outcome.clone(),
            )
            .await?;

        match transition {
            Transition::AlreadyFinal => {
                info!(checkout_request_id = %checkout_request_id, "Duplicate callback ignored")
            }
            Transition::Recorded => {
                warn!(checkout_request_id = %checkout_request_id, "Callback for unknown push recorded")
            }
            Transition::Applied => {
                info!(checkout_request_id = %checkout_request_id, status = %outcome.status, "Payment updated")
            }
        }

        Ok(Reconciliation {
            checkout_request_id: Some(checkout_request_id),
            merchant_request_id: callback.merchant_request_id,
            outcome,
            transition: Some(transition),
        })
    }
}
