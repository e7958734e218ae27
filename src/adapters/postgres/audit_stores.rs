//! PostgreSQL subscription event log and cancellation record store.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::DomainError;
use crate::domain::subscription::{CancellationRecord, SubscriptionEvent};
use crate::ports::{CancellationRecordRepository, SubscriptionEventLog};

pub struct PostgresSubscriptionEventLog {
    pool: PgPool,
}

impl PostgresSubscriptionEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionEventLog for PostgresSubscriptionEventLog {
    async fn record(&self, event: &SubscriptionEvent) -> Result<(), DomainError> {
        let context = serde_json::to_string(&event.context)
            .map_err(|e| DomainError::database("Failed to encode event context", e))?;

        sqlx::query(
            r#"
            INSERT INTO subscription_events (
                subscription_id, user_id, event_type, order_id, message, context, occurred_at
            ) VALUES ($1, $2, $3, $4, $5, $6::jsonb, $7)
            "#,
        )
        .bind(event.subscription_id.as_uuid())
        .bind(event.user_id.as_uuid())
        .bind(event.event_type.as_str())
        .bind(&event.order_id)
        .bind(&event.message)
        .bind(context)
        .bind(event.occurred_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to record subscription event", e))?;

        Ok(())
    }
}

pub struct PostgresCancellationRecords {
    pool: PgPool,
}

impl PostgresCancellationRecords {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CancellationRecordRepository for PostgresCancellationRecords {
    async fn save(&self, record: &CancellationRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscription_cancellations (
                id, subscription_id, user_id, reason, details, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.subscription_id.as_uuid())
        .bind(record.user_id.as_uuid())
        .bind(record.reason.as_str())
        .bind(&record.details)
        .bind(record.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to save cancellation record", e))?;

        Ok(())
    }
}
