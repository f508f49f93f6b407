use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, to_bson, to_document, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{info, warn};

use crate::database::{OrderStore, PaymentStore};
use crate::errors::{AppError, Result};
use crate::models::order::Order;
use crate::models::payment::{PaymentOutcome, PaymentRecord, PendingPayment, Transition};

const DUPLICATE_KEY: i32 = 11000;

pub async fn get_db_client(database_url: &str, db_name: &str) -> Result<Database> {
    let client = Client::with_uri_str(database_url).await?;
    let db = client.database(db_name);

    match db.list_collection_names().await {
        Ok(collections) => info!(database = db_name, ?collections, "Connected to MongoDB"),
        Err(e) => warn!(database = db_name, error = %e, "Database may not exist or is inaccessible"),
    }

    Ok(db)
}

/// MongoDB-backed store. Transitions are conditional updates on
/// `outcome.status == "pending"`, and a unique index on the CheckoutRequestID
/// turns racing inserts into a single winner.
#[derive(Clone)]
pub struct MongoStore {
    payments: Collection<PaymentRecord>,
    orders: Collection<Order>,
}

impl MongoStore {
    pub async fn connect(database_url: &str, db_name: &str) -> Result<Self> {
        let db = get_db_client(database_url, db_name).await?;
        let store = MongoStore {
            payments: db.collection("payments"),
            orders: db.collection("orders"),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.payments
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "checkoutRequestID": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.orders
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "orderId": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Document> {
    to_document(value).map_err(|e| AppError::storage(format!("BSON encoding failed: {}", e)))
}

fn encode_value<T: serde::Serialize>(value: &T) -> Result<Bson> {
    to_bson(value).map_err(|e| AppError::storage(format!("BSON encoding failed: {}", e)))
}

/// Single-stage pipeline that writes the terminal outcome and backfills the
/// gateway's MerchantRequestID only where the record has none. Values go
/// through `$literal` so strings starting with `$` are not read as paths.
fn transition_update(
    outcome: &PaymentOutcome,
    merchant_request_id: Option<&str>,
    updated_at: DateTime<Utc>,
) -> Result<Vec<Document>> {
    let outcome = encode_value(outcome)?;
    let updated_at = encode_value(&updated_at)?;
    let mut set = doc! {
        "outcome": { "$literal": outcome },
        "updatedAt": { "$literal": updated_at },
    };
    if let Some(merchant_request_id) = merchant_request_id {
        set.insert(
            "merchantRequestID",
            doc! { "$ifNull": ["$merchantRequestID", { "$literal": merchant_request_id }] },
        );
    }
    Ok(vec![doc! { "$set": set }])
}

#[async_trait]
impl PaymentStore for MongoStore {
    async fn create_pending_outcome(&self, pending: PendingPayment) -> Result<()> {
        let checkout_request_id = pending.checkout_request_id.clone();
        let mut on_insert = encode(&PaymentRecord::from_pending(pending))?;
        on_insert.remove("checkoutRequestID");

        // Submission facts are always written; the outcome only on insert, so
        // a callback that arrived first is kept.
        let mut set = Document::new();
        for key in ["merchantRequestID", "accountReference", "phoneNumber", "requestedAmount", "updatedAt"] {
            if let Some(value) = on_insert.remove(key) {
                set.insert(key, value);
            }
        }

        self.payments
            .update_one(
                doc! { "checkoutRequestID": checkout_request_id.as_str() },
                doc! { "$setOnInsert": on_insert, "$set": set },
            )
            .upsert(true)
            .await?;
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

        let update = transition_update(&outcome, merchant_request_id, Utc::now())?;
        let result = self
            .payments
            .update_one(
                doc! { "checkoutRequestID": checkout_request_id, "outcome.status": "pending" },
                update,
            )
            .await?;
        if result.matched_count == 1 {
            return Ok(Transition::Applied);
        }

        let record = PaymentRecord::from_callback(
            checkout_request_id,
            merchant_request_id.map(str::to_string),
            outcome,
        );
        match self.payments.insert_one(&record).await {
            Ok(_) => Ok(Transition::Recorded),
            Err(e) if is_duplicate_key(&e) => Ok(Transition::AlreadyFinal),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_payment(&self, checkout_request_id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self
            .payments
            .find_one(doc! { "checkoutRequestID": checkout_request_id })
            .await?)
    }

    fn backend_name(&self) -> &'static str {
        "mongodb"
    }
}

#[async_trait]
impl OrderStore for MongoStore {
    async fn create_order(&self, order: Order) -> Result<Order> {
        self.orders.insert_one(&order).await?;
        Ok(order)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.find_one(doc! { "orderId": order_id }).await?)
    }
}
