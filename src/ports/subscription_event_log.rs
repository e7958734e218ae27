//! Subscription audit row port.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::subscription::SubscriptionEvent;

/// Append-only store of subscription audit rows.
#[async_trait]
pub trait SubscriptionEventLog: Send + Sync {
    async fn record(&self, event: &SubscriptionEvent) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_event_log_is_object_safe() {
        fn _accepts_dyn(_log: &dyn SubscriptionEventLog) {}
    }
}
