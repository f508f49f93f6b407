use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one STK push as far as the merchant can tell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl PaymentOutcome {
    pub fn pending() -> Self {
        PaymentOutcome {
            status: PaymentStatus::Pending,
            receipt_number: None,
            amount: None,
            payer_phone: None,
            transaction_date: None,
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        PaymentOutcome {
            status: PaymentStatus::Failed,
            failure_reason: Some(reason.into()),
            ..Self::pending()
        }
    }
}

/// What the merchant knows at submission time.
#[derive(Debug, Clone)]
pub struct PendingPayment {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub account_reference: String,
    pub phone_number: String,
    pub amount: u64,
}

/// Stored payment keyed by `checkout_request_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    #[serde(rename = "checkoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "merchantRequestID", default, skip_serializing_if = "Option::is_none")]
    pub merchant_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_amount: Option<u64>,
    pub outcome: PaymentOutcome,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn from_pending(pending: PendingPayment) -> Self {
        let now = Utc::now();
        PaymentRecord {
            checkout_request_id: pending.checkout_request_id,
            merchant_request_id: pending.merchant_request_id,
            account_reference: Some(pending.account_reference),
            phone_number: Some(pending.phone_number),
            requested_amount: Some(pending.amount),
            outcome: PaymentOutcome::pending(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record for a callback whose push was never recorded locally.
    pub fn from_callback(
        checkout_request_id: &str,
        merchant_request_id: Option<String>,
        outcome: PaymentOutcome,
    ) -> Self {
        let now = Utc::now();
        PaymentRecord {
            checkout_request_id: checkout_request_id.to_string(),
            merchant_request_id,
            account_reference: None,
            phone_number: None,
            requested_amount: None,
            outcome,
            created_at: now,
            updated_at: now,
        }
    }
}

/// How a transition request was resolved by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Pending record moved to a terminal status.
    Applied,
    /// No pending record existed; a terminal one was created.
    Recorded,
    /// Record was already terminal. Nothing changed.
    AlreadyFinal,
}
