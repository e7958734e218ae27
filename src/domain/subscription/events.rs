//! Side-effect intents produced by subscription transitions.
//!
//! Transitions never perform I/O. They return the audit rows to record and
//! the notifications to send; the application layer dispatches them after
//! the state change has been committed.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};

const MAX_CONTEXT_VALUE_CHARS: usize = 1000;

/// Kind of subscription audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionEventType {
    Purchase,
    Renewal,
    Cancellation,
    PaymentPending,
    PaymentFailure,
}

impl SubscriptionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionEventType::Purchase => "PURCHASE",
            SubscriptionEventType::Renewal => "RENEWAL",
            SubscriptionEventType::Cancellation => "CANCELLATION",
            SubscriptionEventType::PaymentPending => "PAYMENT_PENDING",
            SubscriptionEventType::PaymentFailure => "PAYMENT_FAILURE",
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            SubscriptionEventType::Purchase => "Subscription purchased",
            SubscriptionEventType::Renewal => "Subscription renewed",
            SubscriptionEventType::Cancellation => "Subscription cancelled",
            SubscriptionEventType::PaymentPending => "Subscription payment pending",
            SubscriptionEventType::PaymentFailure => "Subscription payment failed",
        }
    }
}

impl fmt::Display for SubscriptionEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit row describing a subscription state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub user_id: UserId,
    pub subscription_id: SubscriptionId,
    pub event_type: SubscriptionEventType,
    pub order_id: Option<String>,
    pub message: String,
    pub context: BTreeMap<String, String>,
    pub occurred_at: Timestamp,
}

impl SubscriptionEvent {
    pub fn new(
        user_id: UserId,
        subscription_id: SubscriptionId,
        event_type: SubscriptionEventType,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            user_id,
            subscription_id,
            event_type,
            order_id: None,
            message: event_type.default_message().to_string(),
            context: BTreeMap::new(),
            occurred_at,
        }
    }

    pub fn with_order_id(mut self, order_id: Option<&str>) -> Self {
        self.order_id = order_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        self
    }

    /// Adds a context entry; blank keys or values are dropped, newlines flattened
    /// and long values cut.
    pub fn with_context(mut self, key: &str, value: Option<impl AsRef<str>>) -> Self {
        let key = key.trim();
        if let Some(value) = value {
            let value = value.as_ref().trim();
            if !key.is_empty() && !value.is_empty() {
                let flattened: String = value
                    .replace(&['\r', '\n'][..], " ")
                    .chars()
                    .take(MAX_CONTEXT_VALUE_CHARS)
                    .collect();
                self.context.insert(key.to_string(), flattened);
            }
        }
        self
    }
}

/// Customer notification to deliver after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    TrialStarted {
        trial_ends_at: Timestamp,
    },
    TrialEndingSoon {
        trial_ends_at: Timestamp,
    },
    TrialExpired,
    TrialExpiredReminder,
    SubscriptionActivated {
        plan_code: String,
        current_period_ends_at: Timestamp,
    },
    PaymentFailed {
        plan_code: String,
        reason: Option<String>,
    },
    CancellationConfirmed {
        plan_code: String,
        effective_at: Timestamp,
    },
}

impl Notification {
    /// Template key, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::TrialStarted { .. } => "trial_welcome",
            Notification::TrialEndingSoon { .. } => "trial_ending_soon",
            Notification::TrialExpired => "trial_expired",
            Notification::TrialExpiredReminder => "trial_expired_reminder",
            Notification::SubscriptionActivated { .. } => "subscription_activated",
            Notification::PaymentFailed { .. } => "payment_failed",
            Notification::CancellationConfirmed { .. } => "cancellation_confirmed",
        }
    }
}

/// Everything a transition asks the caller to do once it is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionEffects {
    /// The subscription was already Active on the same plan before the transition.
    pub already_active: bool,
    pub events: Vec<SubscriptionEvent>,
    pub notifications: Vec<Notification>,
}

impl TransitionEffects {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.notifications.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> SubscriptionEvent {
        SubscriptionEvent::new(
            UserId::new(),
            SubscriptionId::new(),
            SubscriptionEventType::PaymentFailure,
            Timestamp::now(),
        )
    }

    #[test]
    fn new_event_uses_type_message() {
        assert_eq!(event().message, "Subscription payment failed");
    }

    #[test]
    fn context_drops_blank_entries_and_flattens_newlines() {
        let e = event()
            .with_context("failure_message", Some(" card\ndeclined "))
            .with_context("empty", Some("  "))
            .with_context(" ", Some("value"))
            .with_context("missing", None::<&str>);

        assert_eq!(e.context.len(), 1);
        assert_eq!(e.context["failure_message"], "card declined");
    }

    #[test]
    fn blank_order_id_is_not_recorded() {
        assert_eq!(event().with_order_id(Some("  ")).order_id, None);
        assert_eq!(
            event().with_order_id(Some(" o-1 ")).order_id.as_deref(),
            Some("o-1")
        );
    }

    #[test]
    fn event_type_names_are_upper_snake() {
        assert_eq!(SubscriptionEventType::PaymentPending.to_string(), "PAYMENT_PENDING");
    }
}
