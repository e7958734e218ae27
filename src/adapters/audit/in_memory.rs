//! In-memory payment flow log for tests.
//!
//! # Security Note
//!
//! Lock poisoning panics here; this sink is not meant for production.

use std::sync::Mutex;

use crate::ports::{PaymentFlowEvent, PaymentFlowLog};

/// Records every event for later assertions.
#[derive(Default)]
pub struct InMemoryPaymentFlowLog {
    events: Mutex<Vec<PaymentFlowEvent>>,
}

impl InMemoryPaymentFlowLog {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    pub fn events(&self) -> Vec<PaymentFlowEvent> {
        self.events
            .lock()
            .expect("InMemoryPaymentFlowLog: lock poisoned")
            .clone()
    }

    /// Steps in the order they were logged.
    pub fn steps(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.step).collect()
    }

    pub fn has_step(&self, step: &str) -> bool {
        self.events().iter().any(|e| e.step == step)
    }

    /// Last event with the given step.
    pub fn find(&self, step: &str) -> Option<PaymentFlowEvent> {
        self.events().into_iter().rev().find(|e| e.step == step)
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .expect("InMemoryPaymentFlowLog: lock poisoned")
            .clear();
    }
}

impl PaymentFlowLog for InMemoryPaymentFlowLog {
    fn log(&self, event: PaymentFlowEvent) {
        self.events
            .lock()
            .expect("InMemoryPaymentFlowLog: lock poisoned")
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_events_in_order() {
        let log = InMemoryPaymentFlowLog::new();
        log.log(PaymentFlowEvent::new("A", "first"));
        log.log(PaymentFlowEvent::new("B", "second").with("k", "v"));

        assert_eq!(log.steps(), vec!["A", "B"]);
        assert_eq!(log.find("B").unwrap().context_value("k"), Some("v"));
        assert!(!log.has_step("C"));

        log.clear();
        assert!(log.events().is_empty());
    }
}
