//! In-memory subscription event log and cancellation record store.
//!
//! # Security Note
//!
//! For tests and local runs only; lock poisoning panics.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::subscription::{CancellationRecord, SubscriptionEvent, SubscriptionEventType};
use crate::ports::{CancellationRecordRepository, SubscriptionEventLog};

#[derive(Default)]
pub struct InMemorySubscriptionEventLog {
    events: Mutex<Vec<SubscriptionEvent>>,
}

impl InMemorySubscriptionEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SubscriptionEvent> {
        self.events
            .lock()
            .expect("InMemorySubscriptionEventLog: lock poisoned")
            .clone()
    }

    pub fn count_of(&self, event_type: SubscriptionEventType) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl SubscriptionEventLog for InMemorySubscriptionEventLog {
    async fn record(&self, event: &SubscriptionEvent) -> Result<(), DomainError> {
        self.events
            .lock()
            .expect("InMemorySubscriptionEventLog: lock poisoned")
            .push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCancellationRecords {
    records: Mutex<Vec<CancellationRecord>>,
}

impl InMemoryCancellationRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CancellationRecord> {
        self.records
            .lock()
            .expect("InMemoryCancellationRecords: lock poisoned")
            .clone()
    }
}

#[async_trait]
impl CancellationRecordRepository for InMemoryCancellationRecords {
    async fn save(&self, record: &CancellationRecord) -> Result<(), DomainError> {
        self.records
            .lock()
            .expect("InMemoryCancellationRecords: lock poisoned")
            .push(record.clone());
        Ok(())
    }
}
