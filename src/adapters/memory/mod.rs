//! In-memory adapters.
//!
//! Implement the persistence and notification ports without external
//! services. Used by tests and by local runs without a database.

mod audit_stores;
mod notifier;
mod reference_data;
mod subscription_repository;

pub use audit_stores::{InMemoryCancellationRecords, InMemorySubscriptionEventLog};
pub use notifier::{LoggingNotifier, RecordingNotifier};
pub use reference_data::{InMemoryPlanCatalog, InMemoryUserDirectory};
pub use subscription_repository::InMemorySubscriptionRepository;
