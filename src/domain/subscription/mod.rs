//! Subscription domain module.
//!
//! Plans, the subscription aggregate and its lifecycle state machine,
//! user cancellation records and the side-effect intents produced by
//! transitions.
//!
//! # Module Structure
//!
//! - `aggregate` - Subscription aggregate and transition inputs
//! - `status` - SubscriptionStatus state machine
//! - `plan` - Plan reference data
//! - `events` - Audit rows, notifications, TransitionEffects
//! - `cancellation` - User cancellation records
//! - `errors` - SubscriptionError

mod aggregate;
mod cancellation;
mod errors;
mod events;
pub(crate) mod plan;
mod status;

pub use aggregate::{Activation, PaymentFailure, PendingPayment, ProviderCancellation, Subscription};
pub use cancellation::{CancellationReason, CancellationRecord};
pub use errors::SubscriptionError;
pub use events::{Notification, SubscriptionEvent, SubscriptionEventType, TransitionEffects};
pub use plan::{BillingPeriod, Plan, PlanKind};
pub use status::SubscriptionStatus;
