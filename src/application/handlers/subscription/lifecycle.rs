//! SubscriptionLifecycleService - Persists subscription transitions.
//!
//! Every transition runs as one read-modify-write against the repository:
//! load the current record (or a shell for first-time callbacks), apply the
//! pure domain transition, then insert or version-checked update. A lost
//! race re-reads and re-applies, so the Purchase/Renewal decision is always
//! taken from the state that actually gets overwritten. Audit rows and
//! notifications are dispatched only after the write commits.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::domain::subscription::{
    Activation, CancellationReason, CancellationRecord, PaymentFailure, PendingPayment, Plan,
    ProviderCancellation, Subscription, SubscriptionError, TransitionEffects,
};
use crate::ports::{
    CancellationRecordRepository, PlanCatalog, SubscriptionEventLog, SubscriptionNotifier,
    SubscriptionRepository,
};

use super::cancellation::CancellationCoordinator;

/// Attempts per transition before a concurrency conflict is surfaced.
const MAX_ATTEMPTS: usize = 3;

/// Persisted state after a transition.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub subscription: Subscription,
    /// Active on the same plan before the transition (renewal, not purchase).
    pub already_active: bool,
    /// The transition produced no audit rows or notifications.
    pub unchanged: bool,
}

/// Result of a user-initiated cancellation.
#[derive(Debug, Clone)]
pub struct UserCancellation {
    pub subscription: Subscription,
    pub record: CancellationRecord,
    /// The provider agreement was cancelled before the local change.
    pub remote_cancelled: bool,
}

/// Applies lifecycle transitions with optimistic concurrency.
pub struct SubscriptionLifecycleService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanCatalog>,
    events: Arc<dyn SubscriptionEventLog>,
    notifier: Arc<dyn SubscriptionNotifier>,
    cancellations: Arc<dyn CancellationRecordRepository>,
    coordinator: Arc<CancellationCoordinator>,
    default_trial_days: u32,
}

impl SubscriptionLifecycleService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanCatalog>,
        events: Arc<dyn SubscriptionEventLog>,
        notifier: Arc<dyn SubscriptionNotifier>,
        cancellations: Arc<dyn CancellationRecordRepository>,
        coordinator: Arc<CancellationCoordinator>,
        default_trial_days: u32,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            events,
            notifier,
            cancellations,
            coordinator,
            default_trial_days,
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Queries
    // ════════════════════════════════════════════════════════════════════════

    pub async fn current_subscription(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        Ok(self.subscriptions.find_current_by_user(user_id).await?)
    }

    /// Entitlement predicate; users without a subscription have no access.
    pub async fn has_active_access(
        &self,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<bool, SubscriptionError> {
        Ok(self
            .current_subscription(user_id)
            .await?
            .map_or(false, |subscription| subscription.has_active_access(now)))
    }

    // ════════════════════════════════════════════════════════════════════════
    // Trial provisioning
    // ════════════════════════════════════════════════════════════════════════

    /// Starts a trial for a new user, or returns the existing subscription.
    ///
    /// # Errors
    ///
    /// - `PlanNotFound` if the catalogue has no active trial plan
    pub async fn provision_trial(&self, user_id: &UserId) -> Result<Subscription, SubscriptionError> {
        if let Some(existing) = self.subscriptions.find_current_by_user(user_id).await? {
            tracing::debug!(user_id = %user_id, subscription_id = %existing.id, "User already has a subscription");
            return Ok(existing);
        }

        let plan = self
            .plans
            .find_trial_plan()
            .await?
            .ok_or_else(|| SubscriptionError::plan_not_found("trial"))?;
        let trial_days = plan
            .trial_period_days
            .filter(|days| *days > 0)
            .unwrap_or(self.default_trial_days);

        let (subscription, effects) =
            Subscription::start_trial(*user_id, &plan, trial_days, Timestamp::now());

        match self.subscriptions.insert(&subscription).await {
            Ok(()) => {}
            Err(err) if err.is_conflict() => {
                // Provisioned by a concurrent request
                return self
                    .subscriptions
                    .find_current_by_user(user_id)
                    .await?
                    .ok_or_else(|| SubscriptionError::not_found_for_user(*user_id));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            trial_ends_at = ?subscription.trial_ends_at,
            "Provisioned trial subscription"
        );
        self.dispatch(&subscription, effects).await;
        Ok(subscription)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Provider-driven transitions
    // ════════════════════════════════════════════════════════════════════════

    /// Applies a confirmed payment, creating a shell record when needed.
    pub async fn activate(
        &self,
        user_id: &UserId,
        plan: &Plan,
        activation: &Activation,
    ) -> Result<TransitionOutcome, SubscriptionError> {
        let outcome = self
            .mutate(user_id, Some(plan), |subscription, now| {
                subscription.activate(plan, activation, now)
            })
            .await?;
        tracing::info!(
            user_id = %user_id,
            plan = %plan.code,
            order_id = ?activation.order_id,
            already_active = outcome.already_active,
            "Activated subscription"
        );
        Ok(outcome)
    }

    pub async fn mark_pending(
        &self,
        user_id: &UserId,
        plan: &Plan,
        pending: &PendingPayment,
    ) -> Result<TransitionOutcome, SubscriptionError> {
        self.mutate(user_id, Some(plan), |subscription, now| {
            subscription.mark_payment_pending(plan, pending, now)
        })
        .await
    }

    /// Pending step of a subscribe callback; leaves an Active agreement as is.
    pub async fn mark_subscribe_pending(
        &self,
        user_id: &UserId,
        plan: &Plan,
        pending: &PendingPayment,
    ) -> Result<TransitionOutcome, SubscriptionError> {
        self.mutate(user_id, Some(plan), |subscription, now| {
            subscription.mark_subscribe_pending(plan, pending, now)
        })
        .await
    }

    pub async fn mark_failed(
        &self,
        user_id: &UserId,
        plan: &Plan,
        failure: &PaymentFailure,
    ) -> Result<TransitionOutcome, SubscriptionError> {
        let outcome = self
            .mutate(user_id, Some(plan), |subscription, now| {
                subscription.mark_payment_failed(plan, failure, now)
            })
            .await?;
        tracing::warn!(
            user_id = %user_id,
            plan = %plan.code,
            reason = ?failure.failure_reason,
            "Subscription payment failed"
        );
        Ok(outcome)
    }

    pub async fn cancel_by_provider(
        &self,
        user_id: &UserId,
        plan: &Plan,
        cancellation: &ProviderCancellation,
    ) -> Result<TransitionOutcome, SubscriptionError> {
        self.mutate(user_id, Some(plan), |subscription, now| {
            subscription.mark_cancelled_by_provider(plan, cancellation, now)
        })
        .await
    }

    // ════════════════════════════════════════════════════════════════════════
    // User cancellation
    // ════════════════════════════════════════════════════════════════════════

    /// Cancels the user's subscription at the end of the paid period.
    ///
    /// Active and PastDue subscriptions are cancelled at LiqPay first; if that
    /// fails nothing is changed locally.
    ///
    /// # Errors
    ///
    /// - `NoCancellableSubscription` if there is no Active, Trial or PastDue subscription
    /// - `CancellationFailed` / `IntegrationNotConfigured` from the remote call
    pub async fn cancel_by_user(
        &self,
        user_id: &UserId,
        reason: CancellationReason,
        details: Option<&str>,
    ) -> Result<UserCancellation, SubscriptionError> {
        let subscription = self
            .subscriptions
            .find_current_by_user(user_id)
            .await?
            .filter(|s| s.status.is_user_cancellable())
            .ok_or_else(SubscriptionError::no_cancellable_subscription)?;

        let remote_cancelled = subscription.status.requires_remote_cancellation();
        if remote_cancelled {
            self.coordinator.cancel(&subscription).await?;
        }

        let outcome = self
            .mutate(user_id, None, |subscription, now| {
                subscription.cancel_by_user(reason, details, now)
            })
            .await?;

        let record = CancellationRecord::new(
            outcome.subscription.id,
            *user_id,
            reason,
            details,
            outcome.subscription.updated_at,
        );
        if let Err(err) = self.cancellations.save(&record).await {
            tracing::error!(
                user_id = %user_id,
                subscription_id = %record.subscription_id,
                error = %err,
                "Failed to store cancellation record"
            );
        }

        tracing::info!(
            user_id = %user_id,
            subscription_id = %outcome.subscription.id,
            reason = reason.as_str(),
            remote_cancelled,
            "Cancelled subscription"
        );
        Ok(UserCancellation {
            subscription: outcome.subscription,
            record,
            remote_cancelled,
        })
    }

    // ════════════════════════════════════════════════════════════════════════
    // Scheduled job transitions
    // ════════════════════════════════════════════════════════════════════════

    /// Sends the trial-ending reminder once. Returns whether it was sent.
    pub async fn send_trial_reminder(&self, user_id: &UserId) -> Result<bool, SubscriptionError> {
        let outcome = self
            .mutate(user_id, None, |subscription, now| {
                Ok(subscription.mark_trial_reminder_sent(now))
            })
            .await?;
        Ok(!outcome.unchanged)
    }

    /// Expires a lapsed trial once. Returns whether it was expired.
    pub async fn expire_trial(&self, user_id: &UserId) -> Result<bool, SubscriptionError> {
        let outcome = self
            .mutate(user_id, None, |subscription, now| subscription.expire_trial(now))
            .await?;
        Ok(!outcome.unchanged)
    }

    /// Sends the expired-trial follow-up once. Returns whether it was sent.
    pub async fn send_expired_reminder(&self, user_id: &UserId) -> Result<bool, SubscriptionError> {
        let outcome = self
            .mutate(user_id, None, |subscription, now| {
                Ok(subscription.mark_expired_reminder_sent(now))
            })
            .await?;
        Ok(!outcome.unchanged)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Internals
    // ════════════════════════════════════════════════════════════════════════

    /// Read-modify-write with bounded retry on version conflicts.
    ///
    /// `shell_plan` allows creating a bare Trial record when the user has no
    /// subscription yet; without it a missing record is `NotFoundForUser`.
    async fn mutate<F>(
        &self,
        user_id: &UserId,
        shell_plan: Option<&Plan>,
        transition: F,
    ) -> Result<TransitionOutcome, SubscriptionError>
    where
        F: Fn(&mut Subscription, Timestamp) -> Result<TransitionEffects, DomainError> + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = Timestamp::now();

            let (mut subscription, is_new) =
                match self.subscriptions.find_current_by_user(user_id).await? {
                    Some(existing) => (existing, false),
                    None => match shell_plan {
                        Some(plan) => (Subscription::shell(*user_id, plan, now), true),
                        None => return Err(SubscriptionError::not_found_for_user(*user_id)),
                    },
                };

            let before = subscription.clone();
            let effects = transition(&mut subscription, now)?;

            let persisted = if is_new {
                self.subscriptions.insert(&subscription).await
            } else if subscription == before {
                Ok(())
            } else {
                match self.subscriptions.update(&subscription).await {
                    Ok(()) => {
                        subscription.version += 1;
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            };

            match persisted {
                Ok(()) => {
                    let outcome = TransitionOutcome {
                        already_active: effects.already_active,
                        unchanged: effects.is_empty(),
                        subscription,
                    };
                    self.dispatch(&outcome.subscription, effects).await;
                    return Ok(outcome);
                }
                Err(err) if err.is_conflict() && attempt < MAX_ATTEMPTS => {
                    tracing::debug!(
                        user_id = %user_id,
                        attempt,
                        "Subscription changed concurrently, retrying transition"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Records audit rows and sends notifications; failures are logged only.
    async fn dispatch(&self, subscription: &Subscription, effects: TransitionEffects) {
        for event in &effects.events {
            if let Err(err) = self.events.record(event).await {
                tracing::warn!(
                    user_id = %subscription.user_id,
                    event_type = %event.event_type,
                    error = %err,
                    "Failed to record subscription event"
                );
            }
        }
        for notification in &effects.notifications {
            if let Err(err) = self.notifier.notify(&subscription.user_id, notification).await {
                tracing::warn!(
                    user_id = %subscription.user_id,
                    template = notification.kind(),
                    error = %err,
                    "Failed to send subscription notification"
                );
            }
        }
    }
}
