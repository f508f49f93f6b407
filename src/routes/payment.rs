use axum::{routing::get, Router};

use crate::handlers::payment_handlers;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/status/:checkout_request_id", get(payment_handlers::check_payment_status))
        .route("/outcome/:checkout_request_id", get(payment_handlers::get_payment_outcome))
}
