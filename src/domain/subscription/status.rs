//! Subscription status state machine.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a user's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Free trial; entitled until `trial_ends_at`.
    Trial,

    /// Paid and confirmed by the provider.
    Active,

    /// Payment cycle unresolved: pending capture or last charge failed.
    PastDue,

    /// Auto-renew stopped; entitled until `cancellation_effective_at`.
    Cancelled,

    /// Trial ran out without a purchase.
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trial" => Some(SubscriptionStatus::Trial),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            "expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }

    /// Statuses a user may cancel from.
    pub fn is_user_cancellable(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trial | SubscriptionStatus::PastDue
        )
    }

    /// Statuses backed by a live provider agreement that must be cancelled remotely.
    pub fn requires_remote_cancellation(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::PastDue)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Trial => vec![Active, PastDue, Cancelled, Expired],
            // Active -> Active is a renewal
            Active => vec![Active, PastDue, Cancelled],
            PastDue => vec![Active, PastDue, Cancelled],
            Cancelled => vec![Active, PastDue],
            Expired => vec![Active, PastDue],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubscriptionStatus::*;

    const ALL: [SubscriptionStatus; 5] = [Trial, Active, PastDue, Cancelled, Expired];

    #[test]
    fn trial_can_be_activated_expired_or_cancelled() {
        assert!(Trial.can_transition_to(&Active));
        assert!(Trial.can_transition_to(&Expired));
        assert!(Trial.can_transition_to(&Cancelled));
    }

    #[test]
    fn active_and_past_due_alternate() {
        assert!(Active.can_transition_to(&PastDue));
        assert!(PastDue.can_transition_to(&Active));
    }

    #[test]
    fn only_trial_expires() {
        for status in ALL {
            assert_eq!(status.can_transition_to(&Expired), status == Trial, "{:?}", status);
        }
    }

    #[test]
    fn nothing_returns_to_trial() {
        for status in ALL {
            assert!(!status.can_transition_to(&Trial), "{:?}", status);
        }
    }

    #[test]
    fn expired_cannot_be_cancelled() {
        assert!(Expired.transition_to(Cancelled).is_err());
    }

    #[test]
    fn no_status_is_terminal() {
        for status in ALL {
            assert!(!status.is_terminal());
        }
    }

    #[test]
    fn user_cancellable_statuses() {
        assert!(Trial.is_user_cancellable());
        assert!(Active.is_user_cancellable());
        assert!(PastDue.is_user_cancellable());
        assert!(!Cancelled.is_user_cancellable());
        assert!(!Expired.is_user_cancellable());
    }

    #[test]
    fn string_round_trip() {
        for status in ALL {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SubscriptionStatus::parse("PAST_DUE"), Some(PastDue));
        assert_eq!(SubscriptionStatus::parse("paused"), None);
    }
}
