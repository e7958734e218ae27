//! Request and response DTOs for the billing endpoints.

use serde::{Deserialize, Serialize};

use crate::application::{CancelSubscriptionResult, CheckAccessResult, CheckoutSession};
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::domain::subscription::{CancellationReason, SubscriptionStatus};

// ════════════════════════════════════════════════════════════════════════════════
// LiqPay callback
// ════════════════════════════════════════════════════════════════════════════════

/// Form body LiqPay posts to the server callback URL.
///
/// Both fields default to empty so a partial form still reaches the
/// processor and is answered with `invalid` instead of an extractor error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackForm {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub signature: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start a LiqPay checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequest {
    pub plan_code: String,
}

/// Request to cancel the current subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelSubscriptionRequest {
    pub reason: CancellationReason,
    #[serde(default)]
    pub details: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Responses
// ════════════════════════════════════════════════════════════════════════════════

/// Signed checkout parameters plus a ready-to-render form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub data: String,
    pub signature: String,
    pub checkout_form_html: String,
    pub language: String,
    pub order_id: String,
    pub order_description: String,
    /// Minor units.
    pub amount: i64,
    pub currency: String,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            checkout_url: session.checkout_url,
            data: session.data,
            signature: session.signature,
            checkout_form_html: session.checkout_form_html,
            language: session.language,
            order_id: session.order_id,
            order_description: session.order_description,
            amount: session.amount,
            currency: session.currency,
        }
    }
}

/// Outcome of a user cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelSubscriptionResponse {
    pub subscription_id: SubscriptionId,
    pub status: SubscriptionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_at: Option<Timestamp>,
    pub remote_cancelled: bool,
}

impl From<CancelSubscriptionResult> for CancelSubscriptionResponse {
    fn from(result: CancelSubscriptionResult) -> Self {
        Self {
            subscription_id: result.subscription_id,
            status: result.status,
            effective_at: result.effective_at,
            remote_cancelled: result.remote_cancelled,
        }
    }
}

/// Access check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCheckResponse {
    pub has_access: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_ends_at: Option<Timestamp>,
}

impl From<CheckAccessResult> for AccessCheckResponse {
    fn from(result: CheckAccessResult) -> Self {
        Self {
            has_access: result.has_access,
            status: result.status,
            plan_code: result.plan_code,
            access_ends_at: result.access_ends_at,
        }
    }
}

/// Standard error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error_code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
