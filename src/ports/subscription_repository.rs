//! Subscription repository port.
//!
//! Defines the contract for persisting the Subscription aggregate.
//!
//! # Design
//!
//! - **One per user**: `user_id` is unique; the stored row is the current subscription
//! - **Optimistic locking**: `update` only succeeds against the version it read
//! - **Job queries**: time-window scans backing the scheduled trial jobs

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::domain::subscription::Subscription;

/// Repository port for Subscription aggregate persistence.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Current subscription of a user, if any.
    async fn find_current_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Insert a new subscription.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if the user already has a subscription
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Update a subscription read at `subscription.version`.
    ///
    /// The stored version becomes `subscription.version + 1`.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if the stored version moved on or the row vanished
    /// - `DatabaseError` on persistence failure
    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Trials ending in `(now, until]` whose ending reminder was not sent.
    async fn find_trial_reminder_candidates(
        &self,
        now: Timestamp,
        until: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError>;

    /// Trials that ended before `now` and were not yet expired.
    async fn find_trials_to_expire(&self, now: Timestamp) -> Result<Vec<Subscription>, DomainError>;

    /// Expired trials that ended before `before` without a follow-up reminder.
    async fn find_expired_reminder_candidates(
        &self,
        before: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn SubscriptionRepository) {}
    }
}
