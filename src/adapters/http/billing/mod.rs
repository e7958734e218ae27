//! HTTP adapter for billing endpoints.
//!
//! Exposes the LiqPay server callback plus the authenticated checkout,
//! cancellation and access endpoints.

mod dto;
mod handlers;
mod routes;

pub use dto::{
    AccessCheckResponse, CallbackForm, CancelSubscriptionRequest, CancelSubscriptionResponse,
    CheckoutResponse, CreateCheckoutRequest, ErrorResponse,
};
pub use handlers::{AuthenticatedUser, AuthenticationRequired, BillingApiError, BillingAppState};
pub use routes::{billing_router, callback_routes, subscription_routes};
