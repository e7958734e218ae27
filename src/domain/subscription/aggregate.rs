//! Subscription aggregate entity.
//!
//! A user has exactly one current Subscription. Every mutation goes through
//! one of the transition methods below; each is pure (the caller supplies
//! `now`) and returns the [`TransitionEffects`] to dispatch once the new
//! state has been persisted.
//!
//! # Design Decisions
//!
//! - **One per user**: unique constraint on `user_id` at the database level
//! - **Optimistic concurrency**: `version` is bumped by the repository on every update
//! - **Idempotent transitions**: repeating a transition never repeats a
//!   purchase row or an activation email

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    DomainError, ErrorCode, PlanId, StateMachine, SubscriptionId, Timestamp, UserId,
};

use super::{
    CancellationReason, Notification, Plan, SubscriptionEvent, SubscriptionEventType,
    SubscriptionStatus, TransitionEffects,
};

/// Provider-confirmed payment for a billing period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub customer_token: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub current_period_ends_at: Timestamp,
    pub next_billing_at: Timestamp,
    pub order_id: Option<String>,
}

/// Subscription accepted by the provider, funds not yet captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPayment {
    pub customer_token: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub next_billing_at: Option<Timestamp>,
    pub order_id: Option<String>,
    pub provider_status: Option<String>,
}

/// Charge declined or reversed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentFailure {
    pub provider_subscription_id: Option<String>,
    pub failure_status: Option<String>,
    pub failure_reason: Option<String>,
    pub order_id: Option<String>,
}

/// Recurring agreement terminated on the provider side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCancellation {
    pub provider_subscription_id: Option<String>,
    pub effective_at: Option<Timestamp>,
    pub provider_status: Option<String>,
}

/// Subscription aggregate.
///
/// # Invariants
///
/// - `user_id` is unique (one current subscription per user)
/// - Status transitions follow [`SubscriptionStatus`] state machine rules
/// - `cancelled_at`/`cancellation_effective_at` are set only while Cancelled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub plan_code: String,
    pub status: SubscriptionStatus,

    pub trial_started_at: Option<Timestamp>,
    pub trial_ends_at: Option<Timestamp>,
    pub current_period_started_at: Option<Timestamp>,
    pub current_period_ends_at: Option<Timestamp>,
    pub next_billing_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub cancellation_effective_at: Option<Timestamp>,

    /// Provider's id for the recurring agreement; needed to cancel it remotely.
    pub provider_subscription_id: Option<String>,
    pub provider_customer_token: Option<String>,
    pub auto_renew: bool,

    // Stamps that keep the scheduled jobs idempotent.
    pub trial_reminder_sent_at: Option<Timestamp>,
    pub trial_expired_notified_at: Option<Timestamp>,
    pub trial_expired_reminder_sent_at: Option<Timestamp>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,

    /// Optimistic concurrency token, managed by the repository.
    pub version: i64,
}

impl Subscription {
    /// Starts a free trial of `trial_days` days.
    pub fn start_trial(
        user_id: UserId,
        plan: &Plan,
        trial_days: u32,
        now: Timestamp,
    ) -> (Self, TransitionEffects) {
        let trial_ends_at = now.add_days(i64::from(trial_days));
        let subscription = Self {
            trial_started_at: Some(now),
            trial_ends_at: Some(trial_ends_at),
            ..Self::shell(user_id, plan, now)
        };
        let effects = TransitionEffects {
            notifications: vec![Notification::TrialStarted { trial_ends_at }],
            ..TransitionEffects::none()
        };
        (subscription, effects)
    }

    /// Bare Trial record with no trial window, created when a provider
    /// callback arrives for a user who has never had a subscription.
    pub fn shell(user_id: UserId, plan: &Plan, now: Timestamp) -> Self {
        Self {
            id: SubscriptionId::new(),
            user_id,
            plan_id: plan.id,
            plan_code: plan.code.clone(),
            status: SubscriptionStatus::Trial,
            trial_started_at: None,
            trial_ends_at: None,
            current_period_started_at: None,
            current_period_ends_at: None,
            next_billing_at: None,
            cancelled_at: None,
            cancellation_effective_at: None,
            provider_subscription_id: None,
            provider_customer_token: None,
            auto_renew: false,
            trial_reminder_sent_at: None,
            trial_expired_notified_at: None,
            trial_expired_reminder_sent_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Entitlement predicate used by all access gating.
    pub fn has_active_access(&self, now: Timestamp) -> bool {
        match self.status {
            SubscriptionStatus::Trial => self.trial_ends_at.map_or(false, |t| t.is_after(&now)),
            SubscriptionStatus::Active => true,
            SubscriptionStatus::Cancelled => self
                .cancellation_effective_at
                .map_or(false, |t| t.is_after(&now)),
            SubscriptionStatus::PastDue | SubscriptionStatus::Expired => false,
        }
    }

    pub fn is_active_on(&self, plan_id: &PlanId) -> bool {
        self.status == SubscriptionStatus::Active && &self.plan_id == plan_id
    }

    /// A blank or missing incoming id never names a different agreement.
    fn is_same_agreement(&self, incoming: Option<&str>) -> bool {
        match incoming.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self.provider_subscription_id.as_deref() == Some(id),
            None => true,
        }
    }

    /// Applies a confirmed payment.
    ///
    /// A repeat for the same plan while Active is a renewal: the audit row is
    /// a Renewal and no activation email is sent.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` for trial plans.
    pub fn activate(
        &mut self,
        plan: &Plan,
        activation: &Activation,
        now: Timestamp,
    ) -> Result<TransitionEffects, DomainError> {
        if plan.is_trial() {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                format!("Plan {} cannot be activated through payment", plan.code),
            ));
        }
        let already_active = self.is_active_on(&plan.id);

        self.transition_to(SubscriptionStatus::Active)?;
        self.assign_plan(plan);
        self.assign_provider_refs(
            activation.customer_token.as_deref(),
            activation.provider_subscription_id.as_deref(),
        );
        self.clear_cancellation();
        self.current_period_started_at = Some(now);
        self.current_period_ends_at = Some(activation.current_period_ends_at);
        self.next_billing_at = Some(activation.next_billing_at);
        self.auto_renew = true;
        self.updated_at = now;

        let event_type = if already_active {
            SubscriptionEventType::Renewal
        } else {
            SubscriptionEventType::Purchase
        };
        let event = self
            .event(event_type, activation.order_id.as_deref(), now)
            .with_context(
                "provider_subscription_id",
                self.provider_subscription_id.as_deref(),
            )
            .with_context(
                "payment_customer_token_present",
                Some(self.provider_customer_token.is_some().to_string()),
            );

        let mut notifications = Vec::new();
        if !already_active {
            notifications.push(Notification::SubscriptionActivated {
                plan_code: self.plan_code.clone(),
                current_period_ends_at: activation.current_period_ends_at,
            });
        }

        Ok(TransitionEffects {
            already_active,
            events: vec![event],
            notifications,
        })
    }

    /// Moves to PastDue while the provider has not confirmed capture.
    ///
    /// A repeat for the same plan and provider agreement does not add another
    /// pending row.
    pub fn mark_payment_pending(
        &mut self,
        plan: &Plan,
        pending: &PendingPayment,
        now: Timestamp,
    ) -> Result<TransitionEffects, DomainError> {
        let was_pending = self.status == SubscriptionStatus::PastDue
            && self.plan_id == plan.id
            && self.next_billing_at.is_some();
        let previous_provider_id = self.provider_subscription_id.clone();

        self.apply_past_due(
            plan,
            pending.customer_token.as_deref(),
            pending.provider_subscription_id.as_deref(),
            pending.next_billing_at,
            now,
        )?;

        if was_pending && previous_provider_id == self.provider_subscription_id {
            return Ok(TransitionEffects::none());
        }

        let event = self
            .event(
                SubscriptionEventType::PaymentPending,
                pending.order_id.as_deref(),
                now,
            )
            .with_context("provider_status", pending.provider_status.as_deref())
            .with_context(
                "provider_subscription_id",
                self.provider_subscription_id.as_deref(),
            );

        Ok(TransitionEffects {
            events: vec![event],
            ..TransitionEffects::none()
        })
    }

    /// Holds a subscribe callback until its payment is confirmed.
    ///
    /// A redelivered subscribe for an agreement that is already Active on the
    /// plan leaves the record alone, so confirmation counts it as a renewal.
    pub fn mark_subscribe_pending(
        &mut self,
        plan: &Plan,
        pending: &PendingPayment,
        now: Timestamp,
    ) -> Result<TransitionEffects, DomainError> {
        if self.is_active_on(&plan.id)
            && self.is_same_agreement(pending.provider_subscription_id.as_deref())
        {
            return Ok(TransitionEffects::none());
        }
        self.mark_payment_pending(plan, pending, now)
    }

    /// Moves to PastDue after a declined charge and asks for a failure email.
    ///
    /// A failure already recorded for the same plan and agreement is not
    /// recorded again.
    pub fn mark_payment_failed(
        &mut self,
        plan: &Plan,
        failure: &PaymentFailure,
        now: Timestamp,
    ) -> Result<TransitionEffects, DomainError> {
        let already_failed = self.status == SubscriptionStatus::PastDue
            && self.plan_id == plan.id
            && self.next_billing_at.is_none();
        if already_failed && self.is_same_agreement(failure.provider_subscription_id.as_deref()) {
            return Ok(TransitionEffects::none());
        }

        self.apply_past_due(
            plan,
            None,
            failure.provider_subscription_id.as_deref(),
            None,
            now,
        )?;

        let reason = failure
            .failure_reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let event = self
            .event(
                SubscriptionEventType::PaymentFailure,
                failure.order_id.as_deref(),
                now,
            )
            .with_context("failure_status", failure.failure_status.as_deref())
            .with_context("failure_message", reason.as_deref())
            .with_context(
                "provider_subscription_id",
                self.provider_subscription_id.as_deref(),
            );

        Ok(TransitionEffects {
            events: vec![event],
            notifications: vec![Notification::PaymentFailed {
                plan_code: self.plan_code.clone(),
                reason,
            }],
            ..TransitionEffects::none()
        })
    }

    /// Records a cancellation reported by the provider.
    ///
    /// Already Cancelled or Expired subscriptions are left untouched.
    pub fn mark_cancelled_by_provider(
        &mut self,
        plan: &Plan,
        cancellation: &ProviderCancellation,
        now: Timestamp,
    ) -> Result<TransitionEffects, DomainError> {
        if matches!(
            self.status,
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired
        ) {
            return Ok(TransitionEffects::none());
        }

        self.assign_plan(plan);
        self.assign_provider_refs(None, cancellation.provider_subscription_id.as_deref());
        let effective_at = self.apply_cancellation(cancellation.effective_at, now)?;

        let event = self
            .event(SubscriptionEventType::Cancellation, None, now)
            .with_context("provider_status", cancellation.provider_status.as_deref())
            .with_context(
                "provider_subscription_id",
                self.provider_subscription_id.as_deref(),
            );

        Ok(TransitionEffects {
            events: vec![event],
            notifications: vec![Notification::CancellationConfirmed {
                plan_code: self.plan_code.clone(),
                effective_at,
            }],
            ..TransitionEffects::none()
        })
    }

    /// Local half of a user-initiated cancellation.
    ///
    /// Callers must cancel the provider agreement first when
    /// [`SubscriptionStatus::requires_remote_cancellation`] holds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the status is Active, Trial or PastDue.
    pub fn cancel_by_user(
        &mut self,
        reason: CancellationReason,
        details: Option<&str>,
        now: Timestamp,
    ) -> Result<TransitionEffects, DomainError> {
        if !self.status.is_user_cancellable() {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Subscription in {} state cannot be cancelled", self.status),
            ));
        }
        let effective_at = self.apply_cancellation(None, now)?;

        let event = self
            .event(SubscriptionEventType::Cancellation, None, now)
            .with_context("reason", Some(reason.as_str()))
            .with_context("details", details);

        Ok(TransitionEffects {
            events: vec![event],
            notifications: vec![Notification::CancellationConfirmed {
                plan_code: self.plan_code.clone(),
                effective_at,
            }],
            ..TransitionEffects::none()
        })
    }

    /// Stamps the trial-ending reminder. No-op once sent or outside a trial.
    pub fn mark_trial_reminder_sent(&mut self, now: Timestamp) -> TransitionEffects {
        let trial_ends_at = match self.trial_ends_at {
            Some(ends) if self.status == SubscriptionStatus::Trial => ends,
            _ => return TransitionEffects::none(),
        };
        if self.trial_reminder_sent_at.is_some() {
            return TransitionEffects::none();
        }
        self.trial_reminder_sent_at = Some(now);
        self.updated_at = now;
        TransitionEffects {
            notifications: vec![Notification::TrialEndingSoon { trial_ends_at }],
            ..TransitionEffects::none()
        }
    }

    /// Expires a trial whose window has closed. No-op if already notified.
    pub fn expire_trial(&mut self, now: Timestamp) -> Result<TransitionEffects, DomainError> {
        let ended = self.trial_ends_at.map_or(false, |t| t.is_before(&now));
        if self.status != SubscriptionStatus::Trial
            || !ended
            || self.trial_expired_notified_at.is_some()
        {
            return Ok(TransitionEffects::none());
        }
        self.transition_to(SubscriptionStatus::Expired)?;
        self.trial_expired_notified_at = Some(now);
        self.updated_at = now;
        Ok(TransitionEffects {
            notifications: vec![Notification::TrialExpired],
            ..TransitionEffects::none()
        })
    }

    /// Stamps the follow-up reminder for an expired trial. No-op once sent.
    pub fn mark_expired_reminder_sent(&mut self, now: Timestamp) -> TransitionEffects {
        if self.status != SubscriptionStatus::Expired
            || self.trial_expired_reminder_sent_at.is_some()
        {
            return TransitionEffects::none();
        }
        self.trial_expired_reminder_sent_at = Some(now);
        self.updated_at = now;
        TransitionEffects {
            notifications: vec![Notification::TrialExpiredReminder],
            ..TransitionEffects::none()
        }
    }

    fn apply_past_due(
        &mut self,
        plan: &Plan,
        customer_token: Option<&str>,
        provider_subscription_id: Option<&str>,
        next_billing_at: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::PastDue)?;
        self.assign_plan(plan);
        self.assign_provider_refs(customer_token, provider_subscription_id);
        self.current_period_started_at = None;
        self.current_period_ends_at = None;
        self.next_billing_at = next_billing_at;
        self.clear_cancellation();
        self.auto_renew = true;
        self.updated_at = now;
        Ok(())
    }

    fn apply_cancellation(
        &mut self,
        requested: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<Timestamp, DomainError> {
        self.transition_to(SubscriptionStatus::Cancelled)?;
        let effective_at = self.resolve_effective_at(requested, now);
        self.auto_renew = false;
        self.cancelled_at = Some(now);
        self.cancellation_effective_at = Some(effective_at);
        self.updated_at = now;
        Ok(effective_at)
    }

    /// Requested future date, else the paid period end, else the trial end, else now.
    fn resolve_effective_at(&self, requested: Option<Timestamp>, now: Timestamp) -> Timestamp {
        [requested, self.current_period_ends_at, self.trial_ends_at]
            .into_iter()
            .flatten()
            .find(|candidate| candidate.is_after(&now))
            .unwrap_or(now)
    }

    fn assign_plan(&mut self, plan: &Plan) {
        self.plan_id = plan.id;
        self.plan_code = plan.code.clone();
    }

    /// Only non-blank values overwrite what is stored.
    fn assign_provider_refs(
        &mut self,
        customer_token: Option<&str>,
        provider_subscription_id: Option<&str>,
    ) {
        if let Some(token) = non_blank(customer_token) {
            self.provider_customer_token = Some(token);
        }
        if let Some(id) = non_blank(provider_subscription_id) {
            self.provider_subscription_id = Some(id);
        }
    }

    fn clear_cancellation(&mut self) {
        self.cancelled_at = None;
        self.cancellation_effective_at = None;
    }

    /// Audit row pre-filled with the post-transition snapshot.
    fn event(
        &self,
        event_type: SubscriptionEventType,
        order_id: Option<&str>,
        now: Timestamp,
    ) -> SubscriptionEvent {
        SubscriptionEvent::new(self.user_id, self.id, event_type, now)
            .with_order_id(order_id)
            .with_context("plan_code", Some(&self.plan_code))
            .with_context("status", Some(self.status.to_string()))
            .with_context(
                "current_period_ends_at",
                self.current_period_ends_at.map(|t| t.to_string()),
            )
            .with_context(
                "next_billing_at",
                self.next_billing_at.map(|t| t.to_string()),
            )
    }

    fn transition_to(&mut self, target: SubscriptionStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition subscription from {:?} to {:?}",
                    self.status, target
                ),
            )
        })?;
        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
