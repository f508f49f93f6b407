// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid phone number format: {0}")]
    InvalidPhoneFormat(String),

    #[error("M-Pesa authentication failed: {body}")]
    UpstreamAuth { status: Option<u16>, body: String },

    #[error("STK push submission failed: {body}")]
    UpstreamSubmit { status: Option<u16>, body: String },

    #[error("STK push status query failed: {body}")]
    UpstreamQuery { status: Option<u16>, body: String },

    #[error("Malformed callback: {0}")]
    CallbackParse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidPhoneFormat(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Upstream payload kept verbatim for the client. JSON bodies are
    /// forwarded as JSON, everything else as a string.
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::UpstreamAuth { body, .. }
            | AppError::UpstreamSubmit { body, .. }
            | AppError::UpstreamQuery { body, .. } => Some(
                serde_json::from_str::<Value>(body).unwrap_or_else(|_| Value::String(body.clone())),
            ),
            AppError::Storage(msg) | AppError::CallbackParse(msg) => {
                Some(Value::String(msg.clone()))
            }
            _ => None,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::InvalidPhoneFormat(_) => self.to_string(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::UpstreamAuth { .. } => "Failed to authenticate with M-Pesa".to_string(),
            AppError::UpstreamSubmit { .. } => "Failed to initiate STK push".to_string(),
            AppError::UpstreamQuery { .. } => "Failed to query payment status".to_string(),
            AppError::CallbackParse(_) => "Malformed callback".to_string(),
            AppError::Storage(_) => "Storage error".to_string(),
            AppError::Configuration(_) => "Configuration error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let mut body = json!({
            "success": false,
            "error": self.public_message(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

// Helper conversion functions
impl AppError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        AppError::Storage(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = AppError::invalid_data("Phone number and amount are required");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.details().is_none());
    }

    #[test]
    fn upstream_json_body_is_forwarded_as_json() {
        let err = AppError::UpstreamSubmit {
            status: Some(400),
            body: r#"{"errorCode":"400.002.02","errorMessage":"Bad Request - Invalid Amount"}"#
                .to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.details().unwrap()["errorMessage"],
            "Bad Request - Invalid Amount"
        );
    }

    #[test]
    fn upstream_text_body_is_forwarded_as_string() {
        let err = AppError::UpstreamAuth {
            status: None,
            body: "connection refused".to_string(),
        };
        assert_eq!(err.details(), Some(Value::String("connection refused".into())));
    }
}
