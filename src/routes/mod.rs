pub mod mpesa;
pub mod orders;
pub mod payment;
