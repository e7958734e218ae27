//! Subscription handlers.
//!
//! Command and query handlers for the LiqPay subscription lifecycle:
//!
//! ## Commands
//! - Creating checkout sessions
//! - Processing LiqPay server callbacks
//! - Cancelling subscriptions on behalf of the user
//! - Scheduled trial reminders and expiry
//!
//! ## Queries
//! - Check user access
//!
//! ## Services
//! - `SubscriptionLifecycleService` - persists every transition with retry
//! - `CancellationCoordinator` - LiqPay `unsubscribe` with identifier fallback
//! - `PaymentReconciler` - status API confirmation after subscribe callbacks

mod cancel_subscription;
mod cancellation;
mod check_access;
mod create_checkout;
mod lifecycle;
mod process_callback;
mod reconciliation;
mod trial_jobs;

#[cfg(test)]
pub(crate) mod test_support;

// Commands
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use create_checkout::{
    CheckoutSession, CheckoutSettings, CreateCheckoutCommand, CreateCheckoutHandler,
    CALLBACK_PATH,
};
pub use process_callback::{CallbackCommand, CallbackResult, ProcessCallbackHandler};
pub use trial_jobs::{TrialJobsReport, TrialLifecycleJobs};

// Queries
pub use check_access::{CheckAccessHandler, CheckAccessQuery, CheckAccessResult};

// Services
pub use cancellation::CancellationCoordinator;
pub use lifecycle::{SubscriptionLifecycleService, TransitionOutcome, UserCancellation};
pub use reconciliation::{PaymentReconciler, PendingSubscription, ReconciliationDecision};
