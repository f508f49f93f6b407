// database/memory_store.rs
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::database::{OrderStore, PaymentStore};
use crate::errors::{AppError, Result};
use crate::models::order::Order;
use crate::models::payment::{PaymentOutcome, PaymentRecord, PendingPayment, Transition};

/// In-process store. Each payment sits behind its own mutex so callbacks for
/// one CheckoutRequestID are applied one at a time without blocking others.
#[derive(Default)]
pub struct MemoryStore {
    payments: RwLock<HashMap<String, Arc<Mutex<PaymentRecord>>>>,
    orders: RwLock<HashMap<String, Order>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, checkout_request_id: &str) -> Option<Arc<Mutex<PaymentRecord>>> {
        self.payments.read().await.get(checkout_request_id).cloned()
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn create_pending_outcome(&self, pending: PendingPayment) -> Result<()> {
        let existing = {
            let mut payments = self.payments.write().await;
            match payments.get(&pending.checkout_request_id) {
                Some(slot) => slot.clone(),
                None => {
                    let id = pending.checkout_request_id.clone();
                    payments.insert(id, Arc::new(Mutex::new(PaymentRecord::from_pending(pending))));
                    return Ok(());
                }
            }
        };

        // Callback got here first; keep its outcome.
        let mut record = existing.lock().await;
        record.merchant_request_id = pending.merchant_request_id.or(record.merchant_request_id.take());
        record.account_reference = Some(pending.account_reference);
        record.phone_number = Some(pending.phone_number);
        record.requested_amount = Some(pending.amount);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn transition_outcome(
        &self,
        checkout_request_id: &str,
        merchant_request_id: Option<&str>,
        outcome: PaymentOutcome,
    ) -> Result<Transition> {
        if !outcome.status.is_terminal() {
            return Err(AppError::invalid_data("a transition must end in confirmed or failed"));
        }

        let slot = match self.slot(checkout_request_id).await {
            Some(slot) => slot,
            None => {
                let mut payments = self.payments.write().await;
                match payments.get(checkout_request_id) {
                    Some(slot) => slot.clone(),
                    None => {
                        let record = PaymentRecord::from_callback(
                            checkout_request_id,
                            merchant_request_id.map(str::to_string),
                            outcome,
                        );
                        payments.insert(checkout_request_id.to_string(), Arc::new(Mutex::new(record)));
                        return Ok(Transition::Recorded);
                    }
                }
            }
        };

        let mut record = slot.lock().await;
        if record.outcome.status.is_terminal() {
            return Ok(Transition::AlreadyFinal);
        }
        if record.merchant_request_id.is_none() {
            record.merchant_request_id = merchant_request_id.map(str::to_string);
        }
        record.outcome = outcome;
        record.updated_at = Utc::now();
        Ok(Transition::Applied)
    }

    async fn get_payment(&self, checkout_request_id: &str) -> Result<Option<PaymentRecord>> {
        match self.slot(checkout_request_id).await {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, order: Order) -> Result<Order> {
        self.orders
            .write()
            .await
            .insert(order.order_id.clone(), order.clone());
        Ok(order)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }
}
