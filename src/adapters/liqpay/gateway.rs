//! LiqPay API client.
//!
//! Implements the `PaymentGateway` port against the LiqPay request endpoint.
//! Every request is a form post of the signed envelope (`data`, `signature`)
//! and every response is a flat JSON object.
//!
//! # Configuration
//!
//! ```ignore
//! let credentials = LiqPayCredentials::from_keys(public_key, private_key);
//! let gateway = LiqPayGateway::new(credentials)
//!     .with_api_url("https://www.liqpay.ua/api/request")
//!     .with_timeout(Duration::from_secs(10));
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::liqpay::LiqPayCredentials;
use crate::ports::{
    GatewayError, PaymentGateway, PaymentStatus, UnsubscribeRequest, UnsubscribeResponse,
};

/// Default LiqPay server-to-server endpoint.
pub const DEFAULT_API_URL: &str = "https://www.liqpay.ua/api/request";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// LiqPay payment gateway adapter.
pub struct LiqPayGateway {
    credentials: LiqPayCredentials,
    api_url: String,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl LiqPayGateway {
    pub fn new(credentials: LiqPayCredentials) -> Self {
        Self {
            credentials,
            api_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            http_client: reqwest::Client::new(),
        }
    }

    /// Overrides the request endpoint (sandbox or test server).
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Upper bound for a single request, connect included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post(&self, params: &Map<String, Value>) -> Result<Map<String, Value>, GatewayError> {
        if !self.credentials.is_configured() {
            return Err(GatewayError::not_configured());
        }

        let envelope = self.credentials.seal(params);
        let form = [
            ("data", envelope.data.as_str()),
            ("signature", envelope.signature.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.api_url)
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            tracing::error!(status = %status, "LiqPay API returned HTTP error");
            return Err(GatewayError::invalid_response(format!(
                "LiqPay API returned HTTP {}",
                status
            )));
        }

        parse_response(&body)
    }
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::timeout(e.to_string())
    } else {
        GatewayError::network(e.to_string())
    }
}

fn parse_response(body: &str) -> Result<Map<String, Value>, GatewayError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(GatewayError::invalid_response(
            "LiqPay response is not a JSON object",
        )),
        Err(e) => Err(GatewayError::invalid_response(format!(
            "LiqPay response is not valid JSON: {}",
            e
        ))),
    }
}

#[async_trait]
impl PaymentGateway for LiqPayGateway {
    fn is_configured(&self) -> bool {
        self.credentials.is_configured()
    }

    async fn query_status(
        &self,
        order_id: &str,
        payment_id: Option<&str>,
    ) -> Result<PaymentStatus, GatewayError> {
        let mut params = Map::new();
        params.insert("action".to_string(), Value::from("status"));
        params.insert("order_id".to_string(), Value::from(order_id));
        if let Some(payment_id) = payment_id.map(str::trim).filter(|id| !id.is_empty()) {
            params.insert("payment_id".to_string(), Value::from(payment_id));
        }

        let response = self.post(&params).await?;
        tracing::debug!(order_id = %order_id, "LiqPay status query answered");
        Ok(PaymentStatus::from_response(&response))
    }

    async fn send_unsubscribe(
        &self,
        request: &UnsubscribeRequest,
    ) -> Result<UnsubscribeResponse, GatewayError> {
        let response = self.post(&request.params()).await?;
        tracing::debug!(
            order_id = %request.order_id,
            identifier = request.identifier_field.field_name(),
            "LiqPay unsubscribe answered"
        );
        Ok(UnsubscribeResponse::from_response(&response))
    }
}
