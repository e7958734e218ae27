//! CheckAccessHandler - Query handler for checking user access.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{SubscriptionError, SubscriptionStatus};

use super::lifecycle::SubscriptionLifecycleService;

/// Query to check if a user has access.
#[derive(Debug, Clone)]
pub struct CheckAccessQuery {
    pub user_id: UserId,
}

/// Result of access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckAccessResult {
    pub has_access: bool,
    pub status: Option<SubscriptionStatus>,
    pub plan_code: Option<String>,
    /// Trial end, paid period end or cancellation date, whichever applies.
    pub access_ends_at: Option<Timestamp>,
}

/// Handler for checking user access.
///
/// Called on every gated request; reads the current subscription only.
pub struct CheckAccessHandler {
    lifecycle: Arc<SubscriptionLifecycleService>,
}

impl CheckAccessHandler {
    pub fn new(lifecycle: Arc<SubscriptionLifecycleService>) -> Self {
        Self { lifecycle }
    }

    pub async fn handle(&self, query: CheckAccessQuery) -> Result<CheckAccessResult, SubscriptionError> {
        let now = Timestamp::now();
        let Some(subscription) = self.lifecycle.current_subscription(&query.user_id).await? else {
            return Ok(CheckAccessResult {
                has_access: false,
                status: None,
                plan_code: None,
                access_ends_at: None,
            });
        };

        let access_ends_at = match subscription.status {
            SubscriptionStatus::Trial => subscription.trial_ends_at,
            SubscriptionStatus::Cancelled => subscription.cancellation_effective_at,
            SubscriptionStatus::Expired => None,
            SubscriptionStatus::Active | SubscriptionStatus::PastDue => {
                subscription.current_period_ends_at
            }
        };

        Ok(CheckAccessResult {
            has_access: subscription.has_active_access(now),
            status: Some(subscription.status),
            plan_code: Some(subscription.plan_code.clone()),
            access_ends_at,
        })
    }
}
