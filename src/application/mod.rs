//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).

pub mod handlers;

pub use handlers::subscription::{
    // Commands
    CallbackCommand, CallbackResult, CancelSubscriptionCommand, CancelSubscriptionHandler,
    CancelSubscriptionResult, CheckoutSession, CheckoutSettings, CreateCheckoutCommand,
    CreateCheckoutHandler, ProcessCallbackHandler, TrialJobsReport, TrialLifecycleJobs,
    // Queries
    CheckAccessHandler, CheckAccessQuery, CheckAccessResult,
    // Services
    CancellationCoordinator, PaymentReconciler, SubscriptionLifecycleService,
};
