//! Subscription-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NotFoundForUser | 404 |
//! | PlanNotFound | 404 |
//! | UserNotFound | 404 |
//! | NoCancellableSubscription | 409 |
//! | InvalidState | 409 |
//! | ConcurrencyConflict | 409 |
//! | CancellationFailed | 502 |
//! | IntegrationNotConfigured | 503 |
//! | ValidationFailed | 400 |
//! | Infrastructure | 500 |

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, UserId};

/// Errors raised by subscription lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("No subscription found for user: {0}")]
    NotFoundForUser(UserId),

    #[error("Subscription plan not found: {0}")]
    PlanNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("No cancellable subscription found")]
    NoCancellableSubscription,

    /// Provider refused or could not be reached; carries the provider's message.
    #[error("{reason}")]
    CancellationFailed { reason: String },

    #[error("LiqPay integration is not configured")]
    IntegrationNotConfigured,

    #[error("Cannot {attempted} subscription in {current} state")]
    InvalidState { current: String, attempted: String },

    #[error("Validation failed for '{field}': {message}")]
    ValidationFailed { field: String, message: String },

    #[error("Subscription was modified concurrently: {0}")]
    ConcurrencyConflict(String),

    #[error("Error: {0}")]
    Infrastructure(String),
}

impl SubscriptionError {
    pub fn not_found_for_user(user_id: UserId) -> Self {
        SubscriptionError::NotFoundForUser(user_id)
    }

    pub fn plan_not_found(code: impl Into<String>) -> Self {
        SubscriptionError::PlanNotFound(code.into())
    }

    pub fn user_not_found(user_id: UserId) -> Self {
        SubscriptionError::UserNotFound(user_id)
    }

    pub fn no_cancellable_subscription() -> Self {
        SubscriptionError::NoCancellableSubscription
    }

    pub fn cancellation_failed(reason: impl Into<String>) -> Self {
        SubscriptionError::CancellationFailed {
            reason: reason.into(),
        }
    }

    pub fn integration_not_configured() -> Self {
        SubscriptionError::IntegrationNotConfigured
    }

    pub fn invalid_state(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        SubscriptionError::InvalidState {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::NotFoundForUser(_) | SubscriptionError::NoCancellableSubscription => {
                ErrorCode::SubscriptionNotFound
            }
            SubscriptionError::PlanNotFound(_) => ErrorCode::PlanNotFound,
            SubscriptionError::UserNotFound(_) => ErrorCode::UserNotFound,
            SubscriptionError::CancellationFailed { .. } => ErrorCode::CancellationFailed,
            SubscriptionError::IntegrationNotConfigured => ErrorCode::IntegrationNotConfigured,
            SubscriptionError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            SubscriptionError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::ConcurrencyConflict(_) => ErrorCode::ConcurrencyConflict,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-facing error message.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns true if repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubscriptionError::Infrastructure(_) | SubscriptionError::ConcurrencyConflict(_)
        )
    }
}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed | ErrorCode::EmptyField | ErrorCode::InvalidFormat => {
                SubscriptionError::ValidationFailed {
                    field: err
                        .details
                        .get("field")
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string()),
                    message: err.message,
                }
            }
            ErrorCode::PlanNotFound => SubscriptionError::PlanNotFound(err.message),
            ErrorCode::SubscriptionNotFound => SubscriptionError::NoCancellableSubscription,
            ErrorCode::InvalidStateTransition => SubscriptionError::InvalidState {
                current: err
                    .details
                    .get("current")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                attempted: err.message,
            },
            ErrorCode::ConcurrencyConflict => SubscriptionError::ConcurrencyConflict(err.message),
            ErrorCode::IntegrationNotConfigured => SubscriptionError::IntegrationNotConfigured,
            ErrorCode::CancellationFailed => SubscriptionError::CancellationFailed {
                reason: err.message,
            },
            ErrorCode::UserNotFound | ErrorCode::DatabaseError | ErrorCode::InternalError => {
                SubscriptionError::Infrastructure(err.to_string())
            }
        }
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}
