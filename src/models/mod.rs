pub mod mpesa_callback;
pub mod order;
pub mod payment;
