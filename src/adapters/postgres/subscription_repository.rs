//! PostgreSQL implementation of SubscriptionRepository.
//!
//! Updates are guarded by the `version` column: a write only lands when the
//! stored version still matches the one the caller read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    DomainError, ErrorCode, PlanId, SubscriptionId, Timestamp, UserId,
};
use crate::domain::subscription::{Subscription, SubscriptionStatus};
use crate::ports::SubscriptionRepository;

const SELECT_SUBSCRIPTION: &str = r#"
    SELECT s.id, s.user_id, s.plan_id, p.code AS plan_code, s.status,
           s.trial_started_at, s.trial_ends_at,
           s.current_period_started_at, s.current_period_ends_at, s.next_billing_at,
           s.cancelled_at, s.cancellation_effective_at,
           s.provider_subscription_id, s.provider_customer_token, s.auto_renew,
           s.trial_reminder_sent_at, s.trial_expired_notified_at,
           s.trial_expired_reminder_sent_at,
           s.created_at, s.updated_at, s.version
    FROM subscriptions s
    JOIN subscription_plans p ON p.id = s.plan_id
"#;

/// PostgreSQL implementation of the SubscriptionRepository port.
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(
        &self,
        predicate: &str,
        bound: DateTime<Utc>,
        upper: Option<DateTime<Utc>>,
    ) -> Result<Vec<Subscription>, DomainError> {
        let sql = format!("{} WHERE {} ORDER BY s.trial_ends_at ASC", SELECT_SUBSCRIPTION, predicate);
        let mut query = sqlx::query_as::<_, SubscriptionRow>(&sql).bind(bound);
        if let Some(upper) = upper {
            query = query.bind(upper);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to scan subscriptions", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    plan_id: Uuid,
    plan_code: String,
    status: String,
    trial_started_at: Option<DateTime<Utc>>,
    trial_ends_at: Option<DateTime<Utc>>,
    current_period_started_at: Option<DateTime<Utc>>,
    current_period_ends_at: Option<DateTime<Utc>>,
    next_billing_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_effective_at: Option<DateTime<Utc>>,
    provider_subscription_id: Option<String>,
    provider_customer_token: Option<String>,
    auto_renew: bool,
    trial_reminder_sent_at: Option<DateTime<Utc>>,
    trial_expired_notified_at: Option<DateTime<Utc>>,
    trial_expired_reminder_sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = parse_status(&row.status)?;
        let ts = |value: Option<DateTime<Utc>>| value.map(Timestamp::from_datetime);

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            plan_id: PlanId::from_uuid(row.plan_id),
            plan_code: row.plan_code,
            status,
            trial_started_at: ts(row.trial_started_at),
            trial_ends_at: ts(row.trial_ends_at),
            current_period_started_at: ts(row.current_period_started_at),
            current_period_ends_at: ts(row.current_period_ends_at),
            next_billing_at: ts(row.next_billing_at),
            cancelled_at: ts(row.cancelled_at),
            cancellation_effective_at: ts(row.cancellation_effective_at),
            provider_subscription_id: row.provider_subscription_id,
            provider_customer_token: row.provider_customer_token,
            auto_renew: row.auto_renew,
            trial_reminder_sent_at: ts(row.trial_reminder_sent_at),
            trial_expired_notified_at: ts(row.trial_expired_notified_at),
            trial_expired_reminder_sent_at: ts(row.trial_expired_reminder_sent_at),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            version: row.version,
        })
    }
}

fn parse_status(s: &str) -> Result<SubscriptionStatus, DomainError> {
    SubscriptionStatus::parse(s).ok_or_else(|| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid subscription status value: {}", s),
        )
    })
}

fn as_dt(value: &Option<Timestamp>) -> Option<DateTime<Utc>> {
    value.map(|t| *t.as_datetime())
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn find_current_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            "{} WHERE s.user_id = $1 ORDER BY s.created_at DESC LIMIT 1",
            SELECT_SUBSCRIPTION
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_id, status, trial_started_at, trial_ends_at,
                current_period_started_at, current_period_ends_at, next_billing_at,
                cancelled_at, cancellation_effective_at,
                provider_subscription_id, provider_customer_token, auto_renew,
                trial_reminder_sent_at, trial_expired_notified_at, trial_expired_reminder_sent_at,
                created_at, updated_at, version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_uuid())
        .bind(subscription.plan_id.as_uuid())
        .bind(subscription.status.as_str())
        .bind(as_dt(&subscription.trial_started_at))
        .bind(as_dt(&subscription.trial_ends_at))
        .bind(as_dt(&subscription.current_period_started_at))
        .bind(as_dt(&subscription.current_period_ends_at))
        .bind(as_dt(&subscription.next_billing_at))
        .bind(as_dt(&subscription.cancelled_at))
        .bind(as_dt(&subscription.cancellation_effective_at))
        .bind(&subscription.provider_subscription_id)
        .bind(&subscription.provider_customer_token)
        .bind(subscription.auto_renew)
        .bind(as_dt(&subscription.trial_reminder_sent_at))
        .bind(as_dt(&subscription.trial_expired_notified_at))
        .bind(as_dt(&subscription.trial_expired_reminder_sent_at))
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.version)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("subscriptions_user_id_key") {
                    return DomainError::new(
                        ErrorCode::ConcurrencyConflict,
                        "User already has a subscription",
                    );
                }
            }
            DomainError::database("Failed to save subscription", e)
        })?;

        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                plan_id = $3,
                status = $4,
                trial_started_at = $5,
                trial_ends_at = $6,
                current_period_started_at = $7,
                current_period_ends_at = $8,
                next_billing_at = $9,
                cancelled_at = $10,
                cancellation_effective_at = $11,
                provider_subscription_id = $12,
                provider_customer_token = $13,
                auto_renew = $14,
                trial_reminder_sent_at = $15,
                trial_expired_notified_at = $16,
                trial_expired_reminder_sent_at = $17,
                updated_at = $18,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.version)
        .bind(subscription.plan_id.as_uuid())
        .bind(subscription.status.as_str())
        .bind(as_dt(&subscription.trial_started_at))
        .bind(as_dt(&subscription.trial_ends_at))
        .bind(as_dt(&subscription.current_period_started_at))
        .bind(as_dt(&subscription.current_period_ends_at))
        .bind(as_dt(&subscription.next_billing_at))
        .bind(as_dt(&subscription.cancelled_at))
        .bind(as_dt(&subscription.cancellation_effective_at))
        .bind(&subscription.provider_subscription_id)
        .bind(&subscription.provider_customer_token)
        .bind(subscription.auto_renew)
        .bind(as_dt(&subscription.trial_reminder_sent_at))
        .bind(as_dt(&subscription.trial_expired_notified_at))
        .bind(as_dt(&subscription.trial_expired_reminder_sent_at))
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to update subscription", e))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM subscriptions WHERE id = $1)")
            .bind(subscription.id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to update subscription", e))?;

        if exists {
            Err(DomainError::new(
                ErrorCode::ConcurrencyConflict,
                "Subscription was modified concurrently",
            )
            .with_detail("subscription_id", subscription.id.to_string()))
        } else {
            Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                "Subscription not found",
            ))
        }
    }

    async fn find_trial_reminder_candidates(
        &self,
        now: Timestamp,
        until: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError> {
        self.fetch_where(
            "s.status = 'trial' AND s.trial_reminder_sent_at IS NULL \
             AND s.trial_ends_at > $1 AND s.trial_ends_at <= $2",
            *now.as_datetime(),
            Some(*until.as_datetime()),
        )
        .await
    }

    async fn find_trials_to_expire(&self, now: Timestamp) -> Result<Vec<Subscription>, DomainError> {
        self.fetch_where(
            "s.status = 'trial' AND s.trial_expired_notified_at IS NULL AND s.trial_ends_at < $1",
            *now.as_datetime(),
            None,
        )
        .await
    }

    async fn find_expired_reminder_candidates(
        &self,
        before: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError> {
        self.fetch_where(
            "s.status = 'expired' AND s.trial_expired_reminder_sent_at IS NULL \
             AND s.trial_ends_at < $1",
            *before.as_datetime(),
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> SubscriptionRow {
        let now = Utc::now();
        SubscriptionRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            plan_code: "std_monthly".to_string(),
            status: status.to_string(),
            trial_started_at: None,
            trial_ends_at: Some(now),
            current_period_started_at: None,
            current_period_ends_at: None,
            next_billing_at: None,
            cancelled_at: None,
            cancellation_effective_at: None,
            provider_subscription_id: Some("sub-1".to_string()),
            provider_customer_token: None,
            auto_renew: true,
            trial_reminder_sent_at: None,
            trial_expired_notified_at: None,
            trial_expired_reminder_sent_at: None,
            created_at: now,
            updated_at: now,
            version: 3,
        }
    }

    #[test]
    fn row_converts_to_subscription() {
        let source = row("past_due");
        let user = source.user_id;
        let subscription = Subscription::try_from(source).unwrap();

        assert_eq!(subscription.status, SubscriptionStatus::PastDue);
        assert_eq!(subscription.user_id.as_uuid(), &user);
        assert_eq!(subscription.version, 3);
        assert_eq!(subscription.provider_subscription_id.as_deref(), Some("sub-1"));
        assert!(subscription.trial_ends_at.is_some());
    }

    #[test]
    fn unknown_status_is_a_database_error() {
        let err = Subscription::try_from(row("paused")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn status_round_trips_through_storage_strings() {
        for status in [
            SubscriptionStatus::Trial,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Expired,
        ] {
            assert_eq!(parse_status(status.as_str()).unwrap(), status);
        }
    }
}
