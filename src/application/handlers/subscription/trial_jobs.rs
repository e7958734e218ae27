//! TrialLifecycleJobs - Scheduled trial reminders and expiry.
//!
//! Each job scans a time window, applies one idempotent transition per
//! candidate and reports how many records actually changed. A failing item
//! is logged and skipped; the rest of the batch still runs.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::config::SubscriptionConfig;
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::SubscriptionRepository;

use super::lifecycle::SubscriptionLifecycleService;

/// Counts from one pass of every job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrialJobsReport {
    pub reminders_sent: usize,
    pub trials_expired: usize,
    pub expired_reminders_sent: usize,
}

pub struct TrialLifecycleJobs {
    subscriptions: Arc<dyn SubscriptionRepository>,
    lifecycle: Arc<SubscriptionLifecycleService>,
    reminder_days_before: u32,
    expired_reminder_days_after: u32,
}

impl TrialLifecycleJobs {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        lifecycle: Arc<SubscriptionLifecycleService>,
        config: &SubscriptionConfig,
    ) -> Self {
        Self {
            subscriptions,
            lifecycle,
            reminder_days_before: config.reminder_days_before,
            expired_reminder_days_after: config.expired_reminder_days_after,
        }
    }

    /// Runs all three jobs in order. A job whose scan fails counts zero.
    pub async fn run_all(&self) -> TrialJobsReport {
        let now = Timestamp::now();
        TrialJobsReport {
            reminders_sent: self.send_trial_ending_reminders(now).await.unwrap_or(0),
            trials_expired: self.expire_trials(now).await.unwrap_or(0),
            expired_reminders_sent: self.send_trial_expired_reminders(now).await.unwrap_or(0),
        }
    }

    /// Reminds trials ending within the reminder window.
    pub async fn send_trial_ending_reminders(&self, now: Timestamp) -> Result<usize, SubscriptionError> {
        let until = now.add_days(i64::from(self.reminder_days_before));
        self.run(
            "trial_ending_reminders",
            || async move {
                self.subscriptions
                    .find_trial_reminder_candidates(now, until)
                    .await
                    .map_err(SubscriptionError::from)
            },
            |user_id| async move { self.lifecycle.send_trial_reminder(&user_id).await },
        )
        .await
    }

    /// Expires trials whose end has passed.
    pub async fn expire_trials(&self, now: Timestamp) -> Result<usize, SubscriptionError> {
        self.run(
            "trial_expiry",
            || async move {
                self.subscriptions
                    .find_trials_to_expire(now)
                    .await
                    .map_err(SubscriptionError::from)
            },
            |user_id| async move { self.lifecycle.expire_trial(&user_id).await },
        )
        .await
    }

    /// Follows up on trials that expired a while ago.
    pub async fn send_trial_expired_reminders(&self, now: Timestamp) -> Result<usize, SubscriptionError> {
        let before = now.minus_days(i64::from(self.expired_reminder_days_after));
        self.run(
            "trial_expired_reminders",
            || async move {
                self.subscriptions
                    .find_expired_reminder_candidates(before)
                    .await
                    .map_err(SubscriptionError::from)
            },
            |user_id| async move { self.lifecycle.send_expired_reminder(&user_id).await },
        )
        .await
    }

    async fn run<S, SFut, A, AFut>(
        &self,
        job: &'static str,
        scan: S,
        apply: A,
    ) -> Result<usize, SubscriptionError>
    where
        S: FnOnce() -> SFut,
        SFut: Future<Output = Result<Vec<Subscription>, SubscriptionError>>,
        A: Fn(UserId) -> AFut,
        AFut: Future<Output = Result<bool, SubscriptionError>>,
    {
        let started = Instant::now();
        tracing::info!(job, "Starting subscription job");

        let candidates = scan().await.map_err(|err| {
            tracing::error!(job, error = %err, "Subscription job scan failed");
            err
        })?;

        let mut changed = 0;
        for subscription in candidates {
            match apply(subscription.user_id).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(
                        job,
                        user_id = %subscription.user_id,
                        subscription_id = %subscription.id,
                        error = %err,
                        "Subscription job item failed"
                    );
                }
            }
        }

        tracing::info!(
            job,
            count = changed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Completed subscription job"
        );
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use crate::domain::subscription::{SubscriptionEventType, SubscriptionStatus};

    fn jobs(harness: &Harness) -> TrialLifecycleJobs {
        TrialLifecycleJobs::new(
            harness.subscriptions.clone(),
            harness.lifecycle(),
            &SubscriptionConfig::default(),
        )
    }

    /// Provisions a trial and moves its end to `now + days_from_now`.
    async fn trial_ending_in(harness: &Harness, days_from_now: i64) -> UserId {
        let user = harness.add_user();
        let mut trial = harness.lifecycle().provision_trial(&user).await.unwrap();
        trial.trial_ends_at = Some(Timestamp::now().add_days(days_from_now));
        harness.subscriptions.put(trial);
        user
    }

    #[tokio::test]
    async fn reminder_goes_out_once_inside_window() {
        let harness = Harness::new();
        let due = trial_ending_in(&harness, 3).await;
        let _later = trial_ending_in(&harness, 10).await;
        let jobs = jobs(&harness);

        assert_eq!(jobs.send_trial_ending_reminders(Timestamp::now()).await.unwrap(), 1);
        assert_eq!(jobs.send_trial_ending_reminders(Timestamp::now()).await.unwrap(), 0);

        assert_eq!(harness.notifier.count_of("trial_ending_soon"), 1);
        assert!(harness
            .subscriptions
            .get(&due)
            .unwrap()
            .trial_reminder_sent_at
            .is_some());
    }

    #[tokio::test]
    async fn lapsed_trials_expire_and_notify() {
        let harness = Harness::new();
        let lapsed = trial_ending_in(&harness, -1).await;
        let running = trial_ending_in(&harness, 5).await;
        let jobs = jobs(&harness);

        assert_eq!(jobs.expire_trials(Timestamp::now()).await.unwrap(), 1);
        assert_eq!(jobs.expire_trials(Timestamp::now()).await.unwrap(), 0);

        assert_eq!(
            harness.subscriptions.get(&lapsed).unwrap().status,
            SubscriptionStatus::Expired
        );
        assert_eq!(
            harness.subscriptions.get(&running).unwrap().status,
            SubscriptionStatus::Trial
        );
        assert_eq!(harness.notifier.count_of("trial_expired"), 1);
        assert!(harness.events.events().iter().all(|e| e.event_type != SubscriptionEventType::Purchase));
    }

    #[tokio::test]
    async fn expired_follow_up_waits_for_grace_days() {
        let harness = Harness::new();
        let old = trial_ending_in(&harness, -5).await;
        let recent = trial_ending_in(&harness, -1).await;
        let jobs = jobs(&harness);
        let now = Timestamp::now();

        assert_eq!(jobs.expire_trials(now).await.unwrap(), 2);
        assert_eq!(jobs.send_trial_expired_reminders(now).await.unwrap(), 1);
        assert_eq!(jobs.send_trial_expired_reminders(now).await.unwrap(), 0);

        assert!(harness
            .subscriptions
            .get(&old)
            .unwrap()
            .trial_expired_reminder_sent_at
            .is_some());
        assert!(harness
            .subscriptions
            .get(&recent)
            .unwrap()
            .trial_expired_reminder_sent_at
            .is_none());
        assert_eq!(harness.notifier.count_of("trial_expired_reminder"), 1);
    }

    #[tokio::test]
    async fn failing_item_does_not_abort_batch() {
        let harness = Harness::new();
        let _first = trial_ending_in(&harness, -1).await;
        let _second = trial_ending_in(&harness, -2).await;
        harness.subscriptions.inject_conflicts(3);

        let expired = jobs(&harness).expire_trials(Timestamp::now()).await.unwrap();

        // The first item exhausts its retries; the second goes through
        assert_eq!(expired, 1);
    }

    #[tokio::test]
    async fn run_all_reports_every_job() {
        let harness = Harness::new();
        trial_ending_in(&harness, 2).await;
        trial_ending_in(&harness, -1).await;

        let report = jobs(&harness).run_all().await;

        assert_eq!(
            report,
            TrialJobsReport {
                reminders_sent: 1,
                trials_expired: 1,
                expired_reminders_sent: 0,
            }
        );
    }
}
