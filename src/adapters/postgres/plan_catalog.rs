//! PostgreSQL plan catalogue and user directory (read-only).

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, PlanId, UserId};
use crate::domain::subscription::{BillingPeriod, Plan, PlanKind};
use crate::ports::{PlanCatalog, UserAccount, UserDirectory};

pub struct PostgresPlanCatalog {
    pool: PgPool,
}

impl PostgresPlanCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    code: String,
    kind: String,
    billing_period: String,
    price_minor: i64,
    old_price_minor: i64,
    currency: String,
    trial_available: bool,
    trial_period_days: Option<i32>,
    active: bool,
    market: Option<String>,
}

impl TryFrom<PlanRow> for Plan {
    type Error = DomainError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let kind = PlanKind::parse(&row.kind).ok_or_else(|| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid plan kind: {}", row.kind))
        })?;
        let billing_period = BillingPeriod::parse(&row.billing_period).ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid billing period: {}", row.billing_period),
            )
        })?;

        Ok(Plan {
            id: PlanId::from_uuid(row.id),
            code: row.code,
            kind,
            billing_period,
            price_minor: row.price_minor,
            old_price_minor: row.old_price_minor,
            currency: row.currency,
            trial_available: row.trial_available,
            // Negative lengths are treated as "no trial".
            trial_period_days: row.trial_period_days.and_then(|d| u32::try_from(d).ok()),
            active: row.active,
            market: row.market,
        })
    }
}

const SELECT_PLAN: &str = r#"
    SELECT id, code, kind, billing_period, price_minor, old_price_minor, currency,
           trial_available, trial_period_days, active, market
    FROM subscription_plans
"#;

#[async_trait]
impl PlanCatalog for PostgresPlanCatalog {
    async fn find_by_code(&self, code: &str) -> Result<Option<Plan>, DomainError> {
        let sql = format!("{} WHERE code = $1", SELECT_PLAN);
        let row: Option<PlanRow> = sqlx::query_as(&sql)
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to find plan", e))?;

        row.map(Plan::try_from).transpose()
    }

    async fn find_trial_plan(&self) -> Result<Option<Plan>, DomainError> {
        let sql = format!(
            "{} WHERE kind = 'trial' AND active = TRUE ORDER BY created_at ASC LIMIT 1",
            SELECT_PLAN
        );
        let row: Option<PlanRow> = sqlx::query_as(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to find trial plan", e))?;

        row.map(Plan::try_from).transpose()
    }
}

pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: Option<String>,
    display_name: Option<String>,
    language: Option<String>,
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        UserAccount {
            id: UserId::from_uuid(row.id),
            email: row.email,
            display_name: row.display_name,
            language: row.language,
        }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, DomainError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, email, display_name, language FROM users WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database("Failed to find user", e))?;

        Ok(row.map(UserAccount::from))
    }
}
