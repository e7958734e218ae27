//! Notification adapters.
//!
//! - `LoggingNotifier` - Resolves the recipient and hands the notification to tracing
//! - `RecordingNotifier` - Captures notifications for assertions

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::domain::subscription::Notification;
use crate::ports::{SubscriptionNotifier, UserDirectory};

/// Notifier for deployments without a mail relay.
///
/// Looks up the recipient so that unknown users surface as errors the same
/// way a mail-backed notifier would, then logs the template key.
pub struct LoggingNotifier {
    users: Arc<dyn UserDirectory>,
}

impl LoggingNotifier {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl SubscriptionNotifier for LoggingNotifier {
    async fn notify(&self, user_id: &UserId, notification: &Notification) -> Result<(), DomainError> {
        let user = self.users.find_by_id(user_id).await?.ok_or_else(|| {
            DomainError::new(ErrorCode::UserNotFound, format!("User {} not found", user_id))
        })?;

        match user.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            Some(email) => tracing::info!(
                user_id = %user_id,
                email = %email,
                template = notification.kind(),
                "Subscription notification dispatched"
            ),
            None => tracing::warn!(
                user_id = %user_id,
                template = notification.kind(),
                "Subscription notification skipped: user has no email"
            ),
        }
        Ok(())
    }
}

/// Captures every notification; can be switched to fail.
///
/// # Panics
///
/// Methods panic if the internal lock is poisoned.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, Notification)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(UserId, Notification)> {
        self.sent
            .lock()
            .expect("RecordingNotifier: lock poisoned")
            .clone()
    }

    /// Number of notifications with the given template key.
    pub fn count_of(&self, kind: &str) -> usize {
        self.sent().iter().filter(|(_, n)| n.kind() == kind).count()
    }
}

#[async_trait]
impl SubscriptionNotifier for RecordingNotifier {
    async fn notify(&self, user_id: &UserId, notification: &Notification) -> Result<(), DomainError> {
        if self.fail {
            return Err(DomainError::new(ErrorCode::InternalError, "mail relay unavailable"));
        }
        self.sent
            .lock()
            .expect("RecordingNotifier: lock poisoned")
            .push((*user_id, notification.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryUserDirectory;
    use crate::ports::UserAccount;

    #[tokio::test]
    async fn logging_notifier_requires_known_user() {
        let known = UserAccount::new(UserId::new()).with_email("user@example.com");
        let directory = Arc::new(InMemoryUserDirectory::with_users([known.clone()]));
        let notifier = LoggingNotifier::new(directory);

        notifier
            .notify(&known.id, &Notification::TrialExpired)
            .await
            .unwrap();

        let err = notifier
            .notify(&UserId::new(), &Notification::TrialExpired)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UserNotFound);
    }

    #[tokio::test]
    async fn recording_notifier_counts_by_kind() {
        let notifier = RecordingNotifier::new();
        let user = UserId::new();
        notifier.notify(&user, &Notification::TrialExpired).await.unwrap();
        notifier
            .notify(&user, &Notification::TrialExpiredReminder)
            .await
            .unwrap();

        assert_eq!(notifier.count_of("trial_expired"), 1);
        assert_eq!(notifier.sent().len(), 2);
        assert!(RecordingNotifier::failing()
            .notify(&user, &Notification::TrialExpired)
            .await
            .is_err());
    }
}
