//! Cancellation record port.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::subscription::CancellationRecord;

/// Append-only store of user cancellation records.
#[async_trait]
pub trait CancellationRecordRepository: Send + Sync {
    async fn save(&self, record: &CancellationRecord) -> Result<(), DomainError>;
}
