//! In-memory subscription repository.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::subscription::{Subscription, SubscriptionStatus};
use crate::ports::SubscriptionRepository;

/// One subscription per user, version-checked like the SQL adapter.
///
/// # Panics
///
/// Methods panic if the internal lock is poisoned.
#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: RwLock<HashMap<UserId, Subscription>>,
    injected_conflicts: AtomicUsize,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(subscription: Subscription) -> Self {
        let repo = Self::new();
        repo.put(subscription);
        repo
    }

    // === Test Helpers ===

    /// Stores a subscription as-is, bypassing version checks.
    pub fn put(&self, subscription: Subscription) {
        self.subscriptions
            .write()
            .expect("InMemorySubscriptionRepository: lock poisoned")
            .insert(subscription.user_id, subscription);
    }

    pub fn get(&self, user_id: &UserId) -> Option<Subscription> {
        self.subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: lock poisoned")
            .get(user_id)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: lock poisoned")
            .len()
    }

    /// The next `count` updates fail with a concurrency conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn matching<F>(&self, predicate: F) -> Vec<Subscription>
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut found: Vec<Subscription> = self
            .subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: lock poisoned")
            .values()
            .filter(|s| predicate(s))
            .cloned()
            .collect();
        found.sort_by_key(|s| s.trial_ends_at);
        found
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn find_current_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self.get(user_id))
    }

    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut guard = self
            .subscriptions
            .write()
            .expect("InMemorySubscriptionRepository: lock poisoned");
        if guard.contains_key(&subscription.user_id) {
            return Err(DomainError::new(
                ErrorCode::ConcurrencyConflict,
                "User already has a subscription",
            ));
        }
        guard.insert(subscription.user_id, subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        if self.take_injected_conflict() {
            return Err(DomainError::new(
                ErrorCode::ConcurrencyConflict,
                "Subscription was modified concurrently",
            ));
        }

        let mut guard = self
            .subscriptions
            .write()
            .expect("InMemorySubscriptionRepository: lock poisoned");
        let stored = guard.get_mut(&subscription.user_id).ok_or_else(|| {
            DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
        })?;
        if stored.id != subscription.id || stored.version != subscription.version {
            return Err(DomainError::new(
                ErrorCode::ConcurrencyConflict,
                "Subscription was modified concurrently",
            ));
        }

        *stored = Subscription {
            version: subscription.version + 1,
            ..subscription.clone()
        };
        Ok(())
    }

    async fn find_trial_reminder_candidates(
        &self,
        now: Timestamp,
        until: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError> {
        Ok(self.matching(|s| {
            s.status == SubscriptionStatus::Trial
                && s.trial_reminder_sent_at.is_none()
                && s.trial_ends_at
                    .map_or(false, |t| t.is_after(&now) && !t.is_after(&until))
        }))
    }

    async fn find_trials_to_expire(&self, now: Timestamp) -> Result<Vec<Subscription>, DomainError> {
        Ok(self.matching(|s| {
            s.status == SubscriptionStatus::Trial
                && s.trial_expired_notified_at.is_none()
                && s.trial_ends_at.map_or(false, |t| t.is_before(&now))
        }))
    }

    async fn find_expired_reminder_candidates(
        &self,
        before: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError> {
        Ok(self.matching(|s| {
            s.status == SubscriptionStatus::Expired
                && s.trial_expired_reminder_sent_at.is_none()
                && s.trial_ends_at.map_or(false, |t| t.is_before(&before))
        }))
    }
}
