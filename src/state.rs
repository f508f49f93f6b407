use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::database::{MemoryStore, MongoStore, OrderStore, PaymentStore};
use crate::errors::Result;
use crate::services::callback::CallbackReconciler;
use crate::services::mpesa_service::MpesaService;

#[derive(Clone)]
pub struct AppState {
    pub mpesa_service: Arc<MpesaService>,
    pub reconciler: Arc<CallbackReconciler>,
    pub payments: Arc<dyn PaymentStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl AppState {
    pub fn new(
        mpesa_service: Arc<MpesaService>,
        payments: Arc<dyn PaymentStore>,
        orders: Arc<dyn OrderStore>,
    ) -> Self {
        AppState {
            mpesa_service,
            reconciler: Arc::new(CallbackReconciler::new(payments.clone())),
            payments,
            orders,
        }
    }

    /// Wires the service graph. MongoDB is used when `DATABASE_URL` is set,
    /// otherwise state lives in process.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let mpesa_service = Arc::new(MpesaService::new(config)?);

        match config.database_url.as_deref() {
            Some(url) => {
                let store = Arc::new(MongoStore::connect(url, &config.database_name).await?);
                info!(database = %config.database_name, "Using MongoDB store");
                Ok(Self::new(mpesa_service, store.clone(), store))
            }
            None => {
                let store = Arc::new(MemoryStore::new());
                info!("DATABASE_URL not set, using in-memory store");
                Ok(Self::new(mpesa_service, store.clone(), store))
            }
        }
    }
}
