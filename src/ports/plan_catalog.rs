//! Plan catalogue port (read-only).

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::subscription::Plan;

/// Read access to subscription plans.
#[async_trait]
pub trait PlanCatalog: Send + Sync {
    /// Plan by its stable code, active or not.
    async fn find_by_code(&self, code: &str) -> Result<Option<Plan>, DomainError>;

    /// The active trial plan used when provisioning new users.
    async fn find_trial_plan(&self) -> Result<Option<Plan>, DomainError>;
}
