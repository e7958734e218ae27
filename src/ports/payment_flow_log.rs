//! Payment flow audit port.
//!
//! Every protocol step (callback received, signature checked, order
//! identified, transition applied, provider called, ...) is written as one
//! line. Writes are best-effort and synchronous; they never fail the caller.

use std::fmt;

use crate::domain::foundation::{Timestamp, UserId};

/// One audit line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentFlowEvent {
    pub timestamp: Timestamp,
    pub step: String,
    pub user_id: Option<UserId>,
    pub order_id: Option<String>,
    pub message: String,
    /// Insertion-ordered key/value pairs.
    pub context: Vec<(String, String)>,
}

impl PaymentFlowEvent {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Timestamp::now(),
            step: step.into(),
            user_id: None,
            order_id: None,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn order(mut self, order_id: Option<&str>) -> Self {
        self.order_id = order_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        self
    }

    /// Adds a context entry; blank keys are skipped, newlines flattened.
    pub fn with(mut self, key: &str, value: impl fmt::Display) -> Self {
        let key = key.trim();
        if !key.is_empty() {
            let value = value.to_string().replace(&['\r', '\n'][..], " ");
            self.context.push((key.to_string(), value.trim().to_string()));
        }
        self
    }

    /// Adds a context entry only when a value is present.
    pub fn with_opt(self, key: &str, value: Option<impl fmt::Display>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    pub fn with_all<K, V>(self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: fmt::Display,
    {
        entries
            .into_iter()
            .fold(self, |event, (key, value)| event.with(key.as_ref(), value))
    }

    /// Records the error kind and message as context.
    pub fn error(self, kind: &str, error: &dyn fmt::Display) -> Self {
        self.with("error", kind).with("error_message", error)
    }

    /// `timestamp | step=X | user=U | order=O | message | context=k=v;...`
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} | step={}",
            self.timestamp.as_datetime().format("%Y-%m-%d %H:%M:%S%.3f"),
            self.step
        );
        if let Some(user_id) = &self.user_id {
            line.push_str(&format!(" | user={}", user_id));
        }
        if let Some(order_id) = &self.order_id {
            line.push_str(&format!(" | order={}", order_id));
        }
        let message = self.message.trim();
        if !message.is_empty() {
            line.push_str(" | ");
            line.push_str(&message.replace(&['\r', '\n'][..], " "));
        }
        if !self.context.is_empty() {
            line.push_str(" | context=");
            for (key, value) in &self.context {
                line.push_str(key);
                line.push('=');
                line.push_str(value);
                line.push(';');
            }
        }
        line
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Append-only sink for payment flow audit lines.
pub trait PaymentFlowLog: Send + Sync {
    fn log(&self, event: PaymentFlowEvent);
}
