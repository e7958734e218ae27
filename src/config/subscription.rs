//! Subscription lifecycle and audit configuration

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ValidationError;

/// Trial lengths and scheduled job windows
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    /// Used when the trial plan does not define its own length
    #[serde(default = "default_trial_length")]
    pub trial_length_days: u32,

    /// How long before trial end the reminder goes out
    #[serde(default = "default_reminder_days_before")]
    pub reminder_days_before: u32,

    /// How long after expiry the follow-up goes out
    #[serde(default = "default_expired_reminder_days_after")]
    pub expired_reminder_days_after: u32,

    /// Period of the scheduled job loop, in seconds
    #[serde(default = "default_job_interval")]
    pub job_interval_secs: u64,
}

impl SubscriptionConfig {
    pub fn job_interval(&self) -> Duration {
        Duration::from_secs(self.job_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.trial_length_days == 0 {
            return Err(ValidationError::MustBePositive("subscription.trial_length_days"));
        }
        if self.reminder_days_before == 0 {
            return Err(ValidationError::MustBePositive(
                "subscription.reminder_days_before",
            ));
        }
        if self.job_interval_secs < 60 {
            return Err(ValidationError::JobIntervalTooShort);
        }
        Ok(())
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            trial_length_days: default_trial_length(),
            reminder_days_before: default_reminder_days_before(),
            expired_reminder_days_after: default_expired_reminder_days_after(),
            job_interval_secs: default_job_interval(),
        }
    }
}

fn default_trial_length() -> u32 {
    14
}

fn default_reminder_days_before() -> u32 {
    5
}

fn default_expired_reminder_days_after() -> u32 {
    2
}

fn default_job_interval() -> u64 {
    3600
}

/// Payment flow audit trail
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_payment_flow_log_path")]
    pub payment_flow_log_path: PathBuf,
}

impl AuditConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.payment_flow_log_path.as_os_str().is_empty() {
            return Err(ValidationError::MissingRequired("AUDIT__PAYMENT_FLOW_LOG_PATH"));
        }
        Ok(())
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            payment_flow_log_path: default_payment_flow_log_path(),
        }
    }
}

fn default_payment_flow_log_path() -> PathBuf {
    PathBuf::from("logs/subscription-payments.log")
}
