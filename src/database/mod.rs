pub mod connection;
pub mod memory_store;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::order::Order;
use crate::models::payment::{PaymentOutcome, PaymentRecord, PendingPayment, Transition};

pub use connection::MongoStore;
pub use memory_store::MemoryStore;

/// Payment state keyed by CheckoutRequestID.
///
/// Implementations serialize transitions per key: once a record leaves
/// `pending` it never changes again, however many callbacks arrive.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Records a submitted push. Calling it again for the same id refreshes
    /// the submission details but never touches the outcome.
    async fn create_pending_outcome(&self, pending: PendingPayment) -> Result<()>;

    async fn transition_outcome(
        &self,
        checkout_request_id: &str,
        merchant_request_id: Option<&str>,
        outcome: PaymentOutcome,
    ) -> Result<Transition>;

    async fn get_payment(&self, checkout_request_id: &str) -> Result<Option<PaymentRecord>>;

    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, order: Order) -> Result<Order>;

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>>;
}
