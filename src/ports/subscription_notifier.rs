//! Customer notification port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};
use crate::domain::subscription::Notification;

/// Delivers subscription notifications (email, push, ...).
///
/// Delivery failures are reported but never roll back the transition that
/// produced the notification.
#[async_trait]
pub trait SubscriptionNotifier: Send + Sync {
    async fn notify(&self, user_id: &UserId, notification: &Notification) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_notifier_is_object_safe() {
        fn _accepts_dyn(_notifier: &dyn SubscriptionNotifier) {}
    }
}
