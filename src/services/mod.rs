pub mod callback;
pub mod credentials;
pub mod mpesa_service;
pub mod redact;
