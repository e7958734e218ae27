//! CancelSubscriptionHandler - Command handler for user cancellations.

use std::sync::Arc;

use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{CancellationReason, SubscriptionError, SubscriptionStatus};

use super::lifecycle::SubscriptionLifecycleService;

/// Command to cancel the current user's subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
    pub reason: CancellationReason,
    pub details: Option<String>,
}

/// Result of a successful cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelSubscriptionResult {
    pub subscription_id: SubscriptionId,
    pub status: SubscriptionStatus,
    /// Access continues until this instant.
    pub effective_at: Option<Timestamp>,
    pub remote_cancelled: bool,
}

/// Handler for cancelling subscriptions.
pub struct CancelSubscriptionHandler {
    lifecycle: Arc<SubscriptionLifecycleService>,
}

impl CancelSubscriptionHandler {
    pub fn new(lifecycle: Arc<SubscriptionLifecycleService>) -> Self {
        Self { lifecycle }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, SubscriptionError> {
        let cancellation = self
            .lifecycle
            .cancel_by_user(&cmd.user_id, cmd.reason, cmd.details.as_deref())
            .await?;

        Ok(CancelSubscriptionResult {
            subscription_id: cancellation.subscription.id,
            status: cancellation.subscription.status,
            effective_at: cancellation.subscription.cancellation_effective_at,
            remote_cancelled: cancellation.remote_cancelled,
        })
    }
}
