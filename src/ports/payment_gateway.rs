//! Payment gateway port for outbound LiqPay API calls.
//!
//! Covers the two server-to-server requests billing makes: the payment
//! status query used for reconciliation and the unsubscribe request used for
//! cancellation. Both are bounded by a timeout in the adapter.
//!
//! # Design
//!
//! - **Raw outcomes**: the gateway returns the provider's answer as-is;
//!   interpreting success/failure/not-found is left to the caller
//! - **Transport errors only**: `GatewayError` means no usable answer arrived

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::liqpay::payload::scalar_text;

/// Port for LiqPay API requests.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Whether both merchant keys are present.
    fn is_configured(&self) -> bool;

    /// `action=status` for an order, optionally narrowed by payment id.
    async fn query_status(
        &self,
        order_id: &str,
        payment_id: Option<&str>,
    ) -> Result<PaymentStatus, GatewayError>;

    /// `action=unsubscribe` for a recurring agreement.
    async fn send_unsubscribe(
        &self,
        request: &UnsubscribeRequest,
    ) -> Result<UnsubscribeResponse, GatewayError>;
}

/// Normalised `action=status` response. Blank values become `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentStatus {
    pub status: Option<String>,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub err_code: Option<String>,
    pub err_description: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
}

impl PaymentStatus {
    pub fn from_response(response: &Map<String, Value>) -> Self {
        let field = |name: &str| response.get(name).and_then(scalar_text);
        Self {
            status: field("status"),
            order_id: field("order_id"),
            payment_id: field("payment_id"),
            err_code: field("err_code"),
            err_description: field("err_description"),
            amount: field("amount"),
            currency: field("currency"),
        }
    }

    /// Description, else error code, else the raw status.
    pub fn failure_reason(&self) -> Option<String> {
        self.err_description
            .clone()
            .or_else(|| self.err_code.clone())
            .or_else(|| self.status.clone())
    }

    /// Non-empty fields for audit lines.
    pub fn log_context(&self) -> Vec<(&'static str, String)> {
        [
            ("status", &self.status),
            ("payment_id", &self.payment_id),
            ("err_code", &self.err_code),
            ("err_description", &self.err_description),
            ("amount", &self.amount),
            ("currency", &self.currency),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key, v)))
        .collect()
    }
}

/// Request field carrying the provider agreement id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierField {
    PaymentId,
    SubscribeId,
}

impl IdentifierField {
    pub fn field_name(&self) -> &'static str {
        match self {
            IdentifierField::PaymentId => "payment_id",
            IdentifierField::SubscribeId => "subscribe_id",
        }
    }
}

/// `action=unsubscribe` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeRequest {
    pub identifier_field: IdentifierField,
    pub provider_subscription_id: String,
    /// Local subscription id, echoed back by LiqPay.
    pub order_id: String,
    pub card_token: Option<String>,
}

impl UnsubscribeRequest {
    /// Request parameters, without `version`/`public_key`.
    pub fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("action".to_string(), Value::from("unsubscribe"));
        params.insert(
            self.identifier_field.field_name().to_string(),
            Value::from(self.provider_subscription_id.clone()),
        );
        params.insert("order_id".to_string(), Value::from(self.order_id.clone()));
        if let Some(token) = self.card_token.as_deref().filter(|t| !t.trim().is_empty()) {
            params.insert("card_token".to_string(), Value::from(token));
        }
        params
    }
}

const UNSUBSCRIBE_CONFIRMED: &[&str] = &[
    "success",
    "ok",
    "unsubscribed",
    "unsubscribesuccess",
    "subscribecanceled",
    "canceled",
    "cancelled",
];

/// `action=unsubscribe` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsubscribeResponse {
    pub status: Option<String>,
    pub result: Option<String>,
    pub err_code: Option<String>,
    pub err_description: Option<String>,
}

impl UnsubscribeResponse {
    pub fn from_response(response: &Map<String, Value>) -> Self {
        let field = |name: &str| response.get(name).and_then(scalar_text);
        Self {
            status: field("status"),
            result: field("result"),
            err_code: field("err_code"),
            err_description: field("err_description"),
        }
    }

    /// `status` or `result` confirms the cancellation.
    pub fn is_success(&self) -> bool {
        [&self.status, &self.result].into_iter().flatten().any(|value| {
            UNSUBSCRIBE_CONFIRMED.contains(&value.to_lowercase().as_str())
        })
    }

    /// The provider did not recognise the identifier we sent.
    pub fn is_not_found(&self) -> bool {
        let code_not_found = self.err_code.as_deref().map_or(false, |code| {
            let code = code.to_lowercase();
            code.contains("payment_not_found") || code.contains("subscribe_not_found")
        });
        let description_not_found = self.err_description.as_deref().map_or(false, |text| {
            let text = text.to_lowercase();
            text.contains("not found") || text.contains("не знайден")
        });
        code_not_found || description_not_found
    }

    /// Provider-facing reason for a refused cancellation, if the response has one.
    pub fn error_message(&self) -> Option<String> {
        self.err_description
            .clone()
            .or_else(|| self.err_code.clone())
            .or_else(|| {
                self.status
                    .clone()
                    .or_else(|| self.result.clone())
                    .map(|status| format!("LiqPay returned status {}", status))
            })
    }

    pub fn log_context(&self) -> Vec<(&'static str, String)> {
        [
            ("status", &self.status),
            ("result", &self.result),
            ("error_description", &self.err_description),
            ("error_code", &self.err_code),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key, v)))
        .collect()
    }
}

/// Gateway transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_configured() -> Self {
        Self::new(
            GatewayErrorCode::NotConfigured,
            "LiqPay integration is not configured",
        )
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Timeout, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidResponse, message)
    }
}

/// Gateway failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorCode {
    NotConfigured,
    Network,
    Timeout,
    InvalidResponse,
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::NotConfigured => "not_configured",
            GatewayErrorCode::Network => "network_error",
            GatewayErrorCode::Timeout => "timeout",
            GatewayErrorCode::InvalidResponse => "invalid_response",
        };
        write!(f, "{}", s)
    }
}
