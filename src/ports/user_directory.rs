//! User directory port.
//!
//! Accounts are owned elsewhere; billing only needs to confirm a user exists
//! and know where to send notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, UserId};

/// The slice of a user account billing cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Preferred interface language, e.g. `uk` or `en`.
    pub language: Option<String>,
}

impl UserAccount {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            email: None,
            display_name: None,
            language: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Read access to user accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_directory_is_object_safe() {
        fn _accepts_dyn(_directory: &dyn UserDirectory) {}
    }
}
