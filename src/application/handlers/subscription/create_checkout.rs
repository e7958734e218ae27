//! CreateCheckoutHandler - Builds a signed LiqPay subscribe checkout.
//!
//! The session carries the base64 `data`/`signature` pair and a ready-made
//! HTML form posting them to the hosted checkout page. The order id embeds
//! the user and plan so the callback can be traced back without state.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::config::{LiqPayConfig, ServerConfig};
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::liqpay::{format_provider_date, LiqPayCredentials, OrderReference};
use crate::domain::subscription::{Plan, SubscriptionError};
use crate::ports::{
    PaymentFlowEvent, PaymentFlowLog, PlanCatalog, SubscriptionRepository, UserAccount,
    UserDirectory,
};

pub const CALLBACK_PATH: &str = "/subscriptions/liqpay/callback";

/// URLs that shape a checkout request.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub checkout_url: String,
    pub server_callback_url: Option<String>,
    pub result_url: Option<String>,
    pub subscription_page_path: String,
    /// Configured public base URL; may be empty or point at localhost.
    pub base_url: String,
}

impl CheckoutSettings {
    pub fn from_config(liqpay: &LiqPayConfig, server: &ServerConfig) -> Self {
        Self {
            checkout_url: liqpay.checkout_url.clone(),
            server_callback_url: liqpay.server_callback_url.clone(),
            result_url: liqpay.result_url.clone(),
            subscription_page_path: liqpay.subscription_page_path.clone(),
            base_url: server.base_url.clone(),
        }
    }

    /// Configured base unless it is missing or local, then the request origin.
    fn base_url(&self, request_base_url: Option<&str>) -> Option<String> {
        let configured = non_blank(Some(&self.base_url));
        let runtime = non_blank(request_base_url);
        match (configured, runtime) {
            (Some(configured), Some(runtime)) if is_localhost(configured) => Some(runtime),
            (Some(configured), _) => Some(configured),
            (None, runtime) => runtime,
        }
        .map(|base| base.trim_end_matches('/').to_string())
    }

    fn server_url(&self, request_base_url: Option<&str>) -> Option<String> {
        if let Some(explicit) = non_blank(self.server_callback_url.as_deref()) {
            return Some(explicit.to_string());
        }
        self.base_url(request_base_url)
            .map(|base| format!("{}{}", base, CALLBACK_PATH))
    }

    fn result_url(&self, request_base_url: Option<&str>) -> Option<String> {
        if let Some(explicit) = non_blank(self.result_url.as_deref()) {
            return Some(explicit.to_string());
        }
        let path = non_blank(Some(&self.subscription_page_path)).unwrap_or("/subscriptions");
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        self.base_url(request_base_url)
            .map(|base| format!("{}{}", base, path))
    }
}

/// Command to start a checkout for a paid plan.
#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub user_id: UserId,
    pub plan_code: String,
    /// Origin of the incoming request, e.g. `https://billing.example.com`.
    pub request_base_url: Option<String>,
}

/// Everything a client needs to open the LiqPay checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
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

/// Handler for creating checkout sessions.
pub struct CreateCheckoutHandler {
    credentials: LiqPayCredentials,
    plans: Arc<dyn PlanCatalog>,
    users: Arc<dyn UserDirectory>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    flow_log: Arc<dyn PaymentFlowLog>,
    settings: CheckoutSettings,
}

impl CreateCheckoutHandler {
    pub fn new(
        credentials: LiqPayCredentials,
        plans: Arc<dyn PlanCatalog>,
        users: Arc<dyn UserDirectory>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        flow_log: Arc<dyn PaymentFlowLog>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            credentials,
            plans,
            users,
            subscriptions,
            flow_log,
            settings,
        }
    }

    /// # Errors
    ///
    /// - `IntegrationNotConfigured` without both merchant keys
    /// - `PlanNotFound` / `UserNotFound` for unknown references
    /// - `ValidationFailed` for trial or inactive plans, or a plan already active
    pub async fn handle(&self, cmd: CreateCheckoutCommand) -> Result<CheckoutSession, SubscriptionError> {
        if !self.credentials.is_configured() {
            return Err(SubscriptionError::integration_not_configured());
        }

        let user = self
            .users
            .find_by_id(&cmd.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::user_not_found(cmd.user_id))?;
        let plan = self
            .plans
            .find_by_code(&cmd.plan_code)
            .await?
            .ok_or_else(|| SubscriptionError::plan_not_found(cmd.plan_code.trim()))?;

        if plan.is_trial() {
            return Err(SubscriptionError::validation(
                "plan_code",
                "Trial plans cannot be purchased",
            ));
        }
        if !plan.active {
            return Err(SubscriptionError::validation(
                "plan_code",
                format!("Plan {} is not available", plan.code),
            ));
        }
        if let Some(current) = self.subscriptions.find_current_by_user(&cmd.user_id).await? {
            if current.is_active_on(&plan.id) {
                return Err(SubscriptionError::validation(
                    "plan_code",
                    format!("{} subscription is already active", plan.display_name()),
                ));
            }
        }

        let order_id = OrderReference::compose(&user.id, &plan.code);
        let language = checkout_language(user.language.as_deref());
        let base = cmd.request_base_url.as_deref();
        let server_url = self.settings.server_url(base);
        let result_url = self.settings.result_url(base);

        let params = request_params(
            &user,
            &plan,
            &order_id,
            &language,
            server_url.as_deref(),
            result_url.as_deref(),
            Timestamp::now(),
        );
        let envelope = self.credentials.seal(&params);
        let checkout_form_html = checkout_form(
            &self.settings.checkout_url,
            &envelope.data,
            &envelope.signature,
        );

        tracing::info!(
            user_id = %user.id,
            plan = %plan.code,
            order_id = %order_id,
            "Prepared LiqPay checkout session"
        );
        self.flow_log.log(
            PaymentFlowEvent::new("CHECKOUT_SESSION_CREATED", "Prepared LiqPay checkout session")
                .user(Some(user.id))
                .order(Some(&order_id))
                .with("plan", &plan.code)
                .with("amount", plan.formatted_price())
                .with("currency", &plan.currency)
                .with_opt("server_url", server_url.as_deref())
                .with_opt("result_url", result_url.as_deref()),
        );

        Ok(CheckoutSession {
            checkout_url: self.settings.checkout_url.clone(),
            data: envelope.data,
            signature: envelope.signature,
            checkout_form_html,
            language,
            order_id,
            order_description: order_description(&plan),
            amount: plan.price_minor,
            currency: plan.currency.clone(),
        })
    }
}

fn request_params(
    user: &UserAccount,
    plan: &Plan,
    order_id: &str,
    language: &str,
    server_url: Option<&str>,
    result_url: Option<&str>,
    now: Timestamp,
) -> Map<String, Value> {
    let amount = plan.formatted_price();
    let starts_at = plan
        .offered_trial_days()
        .map_or(now, |days| now.add_days(i64::from(days)));

    let mut params = Map::new();
    let mut put = |key: &str, value: Value| {
        params.insert(key.to_string(), value);
    };
    put("action", json!("subscribe"));
    put("amount", json!(amount));
    put("currency", json!(plan.currency));
    put("description", json!(order_description(plan)));
    put("order_id", json!(order_id));
    put("language", json!(language));
    put("subscribe", json!("1"));
    put("subscribe_date_start", json!(format_provider_date(&starts_at)));
    put("subscribe_periodicity", json!(plan.billing_period.periodicity()));
    put("subscribe_amount", json!(amount));
    put("subscribe_currency", json!(plan.currency));
    put("info", json!(plan.code));
    if let Some(url) = server_url {
        put("server_url", json!(url));
    }
    if let Some(url) = result_url {
        put("result_url", json!(url));
    }
    if let Some(email) = non_blank(user.email.as_deref()) {
        put(
            "customer",
            json!(json!({"email": email, "id": user.id.to_string()}).to_string()),
        );
    }
    params
}

fn order_description(plan: &Plan) -> String {
    format!("{} subscription", plan.display_name())
}

/// LiqPay accepts uk, en and ru.
fn checkout_language(preferred: Option<&str>) -> String {
    let normalized = preferred.map(|l| l.trim().to_lowercase()).unwrap_or_default();
    match normalized.as_str() {
        "ua" => "uk".to_string(),
        "uk" | "en" | "ru" => normalized,
        _ => "en".to_string(),
    }
}

fn checkout_form(checkout_url: &str, data: &str, signature: &str) -> String {
    format!(
        concat!(
            "<form method=\"POST\" action=\"{}\" accept-charset=\"utf-8\">\n",
            "<input type=\"hidden\" name=\"data\" value=\"{}\" />\n",
            "<input type=\"hidden\" name=\"signature\" value=\"{}\" />\n",
            "<button type=\"submit\">Pay with LiqPay</button>\n",
            "</form>"
        ),
        checkout_url, data, signature
    )
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_localhost(url: &str) -> bool {
    let url = url.to_lowercase();
    url.contains("localhost") || url.contains("127.0.0.1")
}
