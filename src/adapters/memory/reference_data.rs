//! In-memory plan catalogue and user directory.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};
use crate::domain::subscription::Plan;
use crate::ports::{PlanCatalog, UserAccount, UserDirectory};

/// Fixed plan list, looked up by exact code.
pub struct InMemoryPlanCatalog {
    plans: Vec<Plan>,
}

impl InMemoryPlanCatalog {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }
}

#[async_trait]
impl PlanCatalog for InMemoryPlanCatalog {
    async fn find_by_code(&self, code: &str) -> Result<Option<Plan>, DomainError> {
        let code = code.trim();
        Ok(self.plans.iter().find(|p| p.code == code).cloned())
    }

    async fn find_trial_plan(&self) -> Result<Option<Plan>, DomainError> {
        Ok(self
            .plans
            .iter()
            .find(|p| p.is_trial() && p.active)
            .cloned())
    }
}

/// Users keyed by id.
///
/// # Panics
///
/// Methods panic if the internal lock is poisoned.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, UserAccount>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserAccount>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.add(user);
        }
        directory
    }

    pub fn add(&self, user: UserAccount) {
        self.users
            .write()
            .expect("InMemoryUserDirectory: lock poisoned")
            .insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, DomainError> {
        Ok(self
            .users
            .read()
            .expect("InMemoryUserDirectory: lock poisoned")
            .get(id)
            .cloned())
    }
}
