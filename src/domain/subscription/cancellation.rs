//! User-initiated cancellation records.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CancellationId, SubscriptionId, Timestamp, UserId};

/// Reason a user gave when cancelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    TooExpensive,
    MissingFeatures,
    NotUsing,
    SwitchingService,
    TechnicalIssues,
    Other,
}

impl CancellationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationReason::TooExpensive => "too_expensive",
            CancellationReason::MissingFeatures => "missing_features",
            CancellationReason::NotUsing => "not_using",
            CancellationReason::SwitchingService => "switching_service",
            CancellationReason::TechnicalIssues => "technical_issues",
            CancellationReason::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "too_expensive" => Some(CancellationReason::TooExpensive),
            "missing_features" => Some(CancellationReason::MissingFeatures),
            "not_using" => Some(CancellationReason::NotUsing),
            "switching_service" => Some(CancellationReason::SwitchingService),
            "technical_issues" => Some(CancellationReason::TechnicalIssues),
            "other" => Some(CancellationReason::Other),
            _ => None,
        }
    }
}

/// Append-only record of a user cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub id: CancellationId,
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
    pub reason: CancellationReason,
    pub details: Option<String>,
    pub created_at: Timestamp,
}

impl CancellationRecord {
    pub fn new(
        subscription_id: SubscriptionId,
        user_id: UserId,
        reason: CancellationReason,
        details: Option<&str>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: CancellationId::new(),
            subscription_id,
            user_id,
            reason,
            details: details
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            created_at,
        }
    }
}
