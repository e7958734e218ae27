//! Outcome taxonomy for rejected LiqPay callbacks.
//!
//! LiqPay redelivers any callback answered with a non-2xx status, so only
//! unexpected faults map to 500. Everything else is acknowledged with 200
//! and a one-word body.

use axum::http::StatusCode;
use thiserror::Error;

/// Reasons a callback was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// Private key missing; an operator must fix the deployment.
    #[error("LiqPay integration is not configured")]
    Configuration,

    /// Payload missing, undecodable or not attributable to a user and plan.
    #[error("{0}")]
    Validation(String),

    /// Signature does not match the payload.
    #[error("LiqPay callback signature mismatch")]
    SignatureMismatch,

    /// Well-formed callback that business rules refuse to apply.
    #[error("{0}")]
    Rejected(String),

    /// Unexpected fault (storage, bug); LiqPay should retry.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CallbackError {
    pub fn validation(message: impl Into<String>) -> Self {
        CallbackError::Validation(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        CallbackError::Rejected(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CallbackError::Internal(message.into())
    }

    /// Plain-text body returned to LiqPay.
    pub fn response_body(&self) -> &'static str {
        match self {
            CallbackError::Validation(_) | CallbackError::SignatureMismatch => "invalid",
            CallbackError::Configuration | CallbackError::Rejected(_) => "ignored",
            CallbackError::Internal(_) => "error",
        }
    }

    /// Only internal faults ask LiqPay to redeliver.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CallbackError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        }
    }

    /// Audit step written by the HTTP layer for this outcome.
    pub fn audit_step(&self) -> &'static str {
        match self.response_body() {
            "invalid" => "SERVER_CALLBACK_INVALID",
            "ignored" => "SERVER_CALLBACK_IGNORED",
            _ => "SERVER_CALLBACK_ERROR",
        }
    }
}
