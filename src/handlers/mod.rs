pub mod mpesa_handlers;
pub mod order_handlers;
pub mod payment_handlers;
