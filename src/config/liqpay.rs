//! LiqPay configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::liqpay::LiqPayCredentials;

use super::error::ValidationError;

/// LiqPay merchant settings.
///
/// Missing keys are not a startup error: callbacks answer `ignored` and
/// checkouts report the integration as not configured until they are set.
#[derive(Debug, Clone, Deserialize)]
pub struct LiqPayConfig {
    #[serde(default = "empty_secret")]
    pub public_key: SecretString,

    #[serde(default = "empty_secret")]
    pub private_key: SecretString,

    /// Server-to-server API endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Hosted checkout form target
    #[serde(default = "default_checkout_url")]
    pub checkout_url: String,

    /// Explicit `server_url` for checkouts; derived from the base URL when absent
    pub server_callback_url: Option<String>,

    /// Explicit `result_url` for checkouts; derived from the base URL when absent
    pub result_url: Option<String>,

    /// Page the customer returns to after checkout
    #[serde(default = "default_subscription_page_path")]
    pub subscription_page_path: String,

    /// Timeout for status and unsubscribe requests, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl LiqPayConfig {
    pub fn credentials(&self) -> LiqPayCredentials {
        LiqPayCredentials::new(self.public_key.clone(), self.private_key.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn has_keys(&self) -> bool {
        !self.public_key.expose_secret().trim().is_empty()
            && !self.private_key.expose_secret().trim().is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_http(&self.api_url, "liqpay.api_url")?;
        require_http(&self.checkout_url, "liqpay.checkout_url")?;
        if let Some(url) = non_blank(&self.server_callback_url) {
            require_http(url, "liqpay.server_callback_url")?;
        }
        if let Some(url) = non_blank(&self.result_url) {
            require_http(url, "liqpay.result_url")?;
        }
        if !self.subscription_page_path.starts_with('/') {
            return Err(ValidationError::InvalidPath("liqpay.subscription_page_path"));
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for LiqPayConfig {
    fn default() -> Self {
        Self {
            public_key: empty_secret(),
            private_key: empty_secret(),
            api_url: default_api_url(),
            checkout_url: default_checkout_url(),
            server_callback_url: None,
            result_url: None,
            subscription_page_path: default_subscription_page_path(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn require_http(url: &str, field: &'static str) -> Result<(), ValidationError> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(ValidationError::InvalidUrl(field))
    }
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

fn default_api_url() -> String {
    "https://www.liqpay.ua/api/request".to_string()
}

fn default_checkout_url() -> String {
    "https://www.liqpay.ua/api/3/checkout".to_string()
}

fn default_subscription_page_path() -> String {
    "/subscriptions".to_string()
}

fn default_request_timeout() -> u64 {
    10
}
