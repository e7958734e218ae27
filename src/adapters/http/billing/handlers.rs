//! HTTP handlers for billing endpoints.
//!
//! The LiqPay callback endpoint answers with plain-text bodies; the user
//! endpoints speak JSON and map `SubscriptionError` to status codes.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Form, Json, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::application::{
    CallbackCommand, CancelSubscriptionCommand, CancelSubscriptionHandler, CheckAccessHandler,
    CheckAccessQuery, CreateCheckoutCommand, CreateCheckoutHandler, ProcessCallbackHandler,
    SubscriptionLifecycleService,
};
use crate::domain::foundation::UserId;
use crate::domain::subscription::SubscriptionError;
use crate::ports::{PaymentFlowEvent, PaymentFlowLog};

use super::dto::{
    AccessCheckResponse, CallbackForm, CancelSubscriptionRequest, CancelSubscriptionResponse,
    CheckoutResponse, CreateCheckoutRequest, ErrorResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the billing routes.
///
/// Cloned per request; every dependency is behind an `Arc`.
#[derive(Clone)]
pub struct BillingAppState {
    pub callback_handler: Arc<ProcessCallbackHandler>,
    pub checkout_handler: Arc<CreateCheckoutHandler>,
    pub lifecycle: Arc<SubscriptionLifecycleService>,
    pub flow_log: Arc<dyn PaymentFlowLog>,
}

impl BillingAppState {
    pub fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(self.lifecycle.clone())
    }

    pub fn check_access_handler(&self) -> CheckAccessHandler {
        CheckAccessHandler::new(self.lifecycle.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user taken from the `X-User-Id` header set by the gateway
/// in front of this service.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user_id = parts
                .headers
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| UserId::from_str(s).ok())
                .ok_or(AuthenticationRequired)?;

            Ok(AuthenticatedUser { user_id })
        })
    }
}

/// Scheme and host the client used, honouring a fronting proxy.
fn request_base_url(headers: &HeaderMap) -> Option<String> {
    let host = headers
        .get("X-Forwarded-Host")
        .or_else(|| headers.get(axum::http::header::HOST))
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())?;
    let scheme = headers
        .get("X-Forwarded-Proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("http");
    Some(format!("{}://{}", scheme, host))
}

// ════════════════════════════════════════════════════════════════════════════════
// LiqPay Server Callback
// ════════════════════════════════════════════════════════════════════════════════

/// GET|HEAD /subscriptions/liqpay/callback - Reachability probe
pub async fn probe_callback(State(state): State<BillingAppState>) -> impl IntoResponse {
    state.flow_log.log(PaymentFlowEvent::new(
        "SERVER_CALLBACK_PROBED",
        "LiqPay callback endpoint probed",
    ));
    (StatusCode::OK, "ok")
}

/// POST /subscriptions/liqpay/callback - LiqPay server-to-server notification
///
/// Always answers in plain text. Only internal faults return 500 so LiqPay
/// retries; validation failures and business rejections are acknowledged.
pub async fn receive_callback(
    State(state): State<BillingAppState>,
    form: Option<Form<CallbackForm>>,
) -> impl IntoResponse {
    let form = form.map(|Form(form)| form).unwrap_or_default();

    state.flow_log.log(
        PaymentFlowEvent::new("SERVER_CALLBACK_RECEIVED", "LiqPay callback received")
            .with("data_length", form.data.len())
            .with("signature_length", form.signature.len()),
    );

    let command = CallbackCommand {
        data: form.data,
        signature: form.signature,
    };

    match state.callback_handler.handle(command).await {
        Ok(result) => {
            state.flow_log.log(
                PaymentFlowEvent::new("SERVER_CALLBACK_PROCESSED", "LiqPay callback processed")
                    .user(Some(result.user_id))
                    .order(Some(&result.order_id))
                    .with("plan", &result.plan_code)
                    .with_opt("status", result.provider_status.as_deref()),
            );
            (StatusCode::OK, "ok")
        }
        Err(err) => {
            let status = err.status_code();
            let body = err.response_body();
            state.flow_log.log(
                PaymentFlowEvent::new(err.audit_step(), err.to_string())
                    .with("response", body)
                    .with("status_code", status.as_u16()),
            );
            if status.is_server_error() {
                tracing::error!(error = %err, "LiqPay callback failed");
            } else {
                tracing::warn!(error = %err, response = body, "LiqPay callback not applied");
            }
            (status, body)
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/subscriptions/checkout - Build a signed LiqPay checkout
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreateCheckoutCommand {
        user_id: user.user_id,
        plan_code: request.plan_code,
        request_base_url: request_base_url(&headers),
    };

    let session = state.checkout_handler.handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(session))))
}

/// POST /api/subscriptions/cancel - Cancel the current subscription
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CancelSubscriptionRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.cancel_subscription_handler();
    let cmd = CancelSubscriptionCommand {
        user_id: user.user_id,
        reason: request.reason,
        details: request.details,
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(CancelSubscriptionResponse::from(result)))
}

/// GET /api/subscriptions/access - Entitlement check
pub async fn check_access(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.check_access_handler();
    let query = CheckAccessQuery {
        user_id: user.user_id,
    };

    let result = handler.handle(query).await?;

    Ok(Json(AccessCheckResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts lifecycle errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(SubscriptionError);

impl From<SubscriptionError> for BillingApiError {
    fn from(err: SubscriptionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code) = match &self.0 {
            SubscriptionError::NotFoundForUser(_) => (StatusCode::NOT_FOUND, "SUBSCRIPTION_NOT_FOUND"),
            SubscriptionError::PlanNotFound(_) => (StatusCode::NOT_FOUND, "PLAN_NOT_FOUND"),
            SubscriptionError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            SubscriptionError::NoCancellableSubscription => {
                (StatusCode::CONFLICT, "NO_CANCELLABLE_SUBSCRIPTION")
            }
            SubscriptionError::InvalidState { .. } => {
                (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION")
            }
            SubscriptionError::ConcurrencyConflict(_) => (StatusCode::CONFLICT, "CONCURRENCY_CONFLICT"),
            SubscriptionError::CancellationFailed { .. } => {
                (StatusCode::BAD_GATEWAY, "CANCELLATION_FAILED")
            }
            SubscriptionError::IntegrationNotConfigured => {
                (StatusCode::SERVICE_UNAVAILABLE, "INTEGRATION_NOT_CONFIGURED")
            }
            SubscriptionError::ValidationFailed { field, message } => {
                let error = ErrorResponse::with_details(
                    "VALIDATION_FAILED",
                    message.clone(),
                    serde_json::json!({ "field": field }),
                );
                return (StatusCode::BAD_REQUEST, Json(error)).into_response();
            }
            SubscriptionError::Infrastructure(_) => {
                tracing::error!(error = %self.0, "Billing request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let error = ErrorResponse::new(error_code, self.0.message());
        (status, Json(error)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn status_of(err: SubscriptionError) -> StatusCode {
        BillingApiError::from(err).into_response().status()
    }

    #[test]
    fn lifecycle_errors_map_to_status_codes() {
        assert_eq!(status_of(SubscriptionError::plan_not_found("gold")), StatusCode::NOT_FOUND);
        assert_eq!(status_of(SubscriptionError::user_not_found(UserId::new())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(SubscriptionError::no_cancellable_subscription()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(SubscriptionError::cancellation_failed("declined")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(SubscriptionError::integration_not_configured()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(SubscriptionError::validation("plan_code", "trial plan")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(SubscriptionError::infrastructure("db down")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn request_base_prefers_forwarded_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("10.0.0.5:8080"));
        headers.insert("X-Forwarded-Host", HeaderValue::from_static("pay.example.com"));
        headers.insert("X-Forwarded-Proto", HeaderValue::from_static("https, http"));

        assert_eq!(
            request_base_url(&headers).as_deref(),
            Some("https://pay.example.com")
        );
    }

    #[test]
    fn request_base_defaults_to_http() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("localhost:8080"));

        assert_eq!(
            request_base_url(&headers).as_deref(),
            Some("http://localhost:8080")
        );
    }

    #[test]
    fn request_base_absent_without_host() {
        assert_eq!(request_base_url(&HeaderMap::new()), None);
    }
}
