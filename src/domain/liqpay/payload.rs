//! Loosely-typed callback payload.
//!
//! LiqPay callbacks vary in shape between API versions and between the
//! subscribe/pay/unsubscribe channels, so the decoded document is kept as a
//! JSON tree and fields are read through tolerant accessors.

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::domain::foundation::Timestamp;

/// Date format used by LiqPay for `*_date_*` and `*_time` fields.
pub const PROVIDER_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const KEY_SUMMARY_LIMIT: usize = 10;
const SNAPSHOT_LIMIT: usize = 700;

/// Decoded callback document (always a JSON object at the top level).
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackPayload {
    root: Map<String, Value>,
}

impl CallbackPayload {
    pub fn new(root: Map<String, Value>) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Trimmed, non-blank text of a top-level field.
    ///
    /// Numbers and booleans are rendered as text; objects and arrays are not.
    pub fn text(&self, field: &str) -> Option<String> {
        self.root.get(field).and_then(scalar_text)
    }

    /// First non-blank text among the given top-level fields.
    pub fn first_text(&self, fields: &[&str]) -> Option<String> {
        fields.iter().find_map(|field| self.text(field))
    }

    /// Text of a field one level inside a nested object.
    pub fn nested_text(&self, container: &str, field: &str) -> Option<String> {
        self.root
            .get(container)
            .and_then(Value::as_object)
            .and_then(|object| object.get(field))
            .and_then(scalar_text)
    }

    /// Text of a top-level field matched ignoring ASCII case.
    pub fn text_ignore_case(&self, field: &str) -> Option<String> {
        self.root
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(field))
            .and_then(|(_, value)| scalar_text(value))
    }

    /// Lower-cased `action` field.
    pub fn action(&self) -> Option<String> {
        self.text("action").map(|action| action.to_lowercase())
    }

    /// Raw provider `status` token (trimmed, original case).
    pub fn status(&self) -> Option<String> {
        self.text("status")
    }

    /// First parseable date among the given fields, in field order.
    pub fn date(&self, fields: &[&str]) -> Option<Timestamp> {
        fields.iter().find_map(|field| {
            let value = self.root.get(*field)?;
            let parsed = match value {
                Value::Number(number) => number.as_i64().and_then(epoch_to_timestamp),
                Value::String(text) => parse_provider_date(text),
                _ => None,
            };
            if parsed.is_none() && !value.is_null() {
                tracing::debug!(field = *field, value = %value, "Unable to parse LiqPay date field");
            }
            parsed
        })
    }

    /// Comma separated first keys of the document, `,...` when truncated.
    pub fn key_summary(&self) -> String {
        let mut summary = self
            .root
            .keys()
            .take(KEY_SUMMARY_LIMIT)
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        if self.root.len() > KEY_SUMMARY_LIMIT {
            summary.push_str(",...");
        }
        summary
    }

    /// Compact JSON rendering, truncated for log lines.
    pub fn snapshot(&self) -> String {
        let json = Value::Object(self.root.clone()).to_string();
        match json.char_indices().nth(SNAPSHOT_LIMIT) {
            Some((cut, _)) => format!("{}...", &json[..cut]),
            None => json,
        }
    }
}

/// Trimmed, non-blank text of a scalar JSON value.
pub fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Returns the first non-blank candidate, trimmed.
pub fn first_non_blank<I, S>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    candidates
        .into_iter()
        .flatten()
        .map(|value| value.as_ref().trim().to_string())
        .find(|value| !value.is_empty())
}

/// Parses a LiqPay date: `yyyy-MM-dd HH:mm:ss` (UTC) or a numeric epoch.
///
/// Epoch values longer than ten digits are milliseconds.
pub fn parse_provider_date(raw: &str) -> Option<Timestamp> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, PROVIDER_DATE_FORMAT) {
        return Some(Timestamp::from_datetime(naive.and_utc()));
    }
    text.parse::<i64>().ok().and_then(epoch_to_timestamp)
}

/// Formats a timestamp the way LiqPay expects in request parameters.
pub fn format_provider_date(timestamp: &Timestamp) -> String {
    timestamp.as_datetime().format(PROVIDER_DATE_FORMAT).to_string()
}

fn epoch_to_timestamp(value: i64) -> Option<Timestamp> {
    if value.unsigned_abs().to_string().len() > 10 {
        Timestamp::from_unix_millis(value)
    } else {
        Timestamp::from_unix_secs(value)
    }
}
