//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use crate::application::handlers::subscription::CALLBACK_PATH;

use super::handlers::{
    cancel_subscription, check_access, create_checkout, probe_callback, receive_callback,
    BillingAppState,
};

/// User-facing subscription routes, mounted under `/api/subscriptions`.
///
/// # Routes
/// - `POST /checkout` - Signed LiqPay checkout for a plan
/// - `POST /cancel` - Cancel the current subscription
/// - `GET /access` - Entitlement check
pub fn subscription_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/cancel", post(cancel_subscription))
        .route("/access", get(check_access))
}

/// LiqPay server callback route.
///
/// No user authentication; the payload signature is verified instead.
/// `get` also answers HEAD.
pub fn callback_routes() -> Router<BillingAppState> {
    Router::new().route(CALLBACK_PATH, get(probe_callback).post(receive_callback))
}

/// Complete billing router.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/api/subscriptions", subscription_routes())
        .merge(callback_routes())
}
