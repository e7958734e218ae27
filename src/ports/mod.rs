//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing core and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `SubscriptionRepository` - Subscription aggregate with optimistic locking
//! - `PlanCatalog` - Read-only plan reference data
//! - `UserDirectory` - Read-only user lookup
//! - `CancellationRecordRepository` - User cancellation records
//! - `SubscriptionEventLog` - Subscription audit rows
//!
//! ## Outbound Ports
//!
//! - `PaymentGateway` - LiqPay status and unsubscribe requests
//! - `SubscriptionNotifier` - Customer notifications
//! - `PaymentFlowLog` - Best-effort protocol audit trail

mod cancellation_record_repository;
mod payment_flow_log;
mod payment_gateway;
mod plan_catalog;
mod subscription_event_log;
mod subscription_notifier;
mod subscription_repository;
mod user_directory;

pub use cancellation_record_repository::CancellationRecordRepository;
pub use payment_flow_log::{PaymentFlowEvent, PaymentFlowLog};
pub use payment_gateway::{
    GatewayError, GatewayErrorCode, IdentifierField, PaymentGateway, PaymentStatus,
    UnsubscribeRequest, UnsubscribeResponse,
};
pub use plan_catalog::PlanCatalog;
pub use subscription_event_log::SubscriptionEventLog;
pub use subscription_notifier::SubscriptionNotifier;
pub use subscription_repository::SubscriptionRepository;
pub use user_directory::{UserAccount, UserDirectory};
