//! Provider subscription identifier extraction.
//!
//! The identifier LiqPay uses for a recurring agreement shows up under many
//! names depending on API version and channel. Strategies run in priority
//! order and the first hit wins:
//!
//! 1. exact top-level fields
//! 2. known one-level containers (`subscribe`, `subscription`, `data`, ...)
//! 3. recursive walk matching field names or key paths that read as
//!    "subscription" + "id"
//! 4. string values that hold a JSON document, parsed and walked
//! 5. inline `token: value` fragments inside string values

use serde_json::Value;

use super::payload::{scalar_text, CallbackPayload};

/// Where the identifier was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderIdSource {
    Payload,
    Existing,
}

impl ProviderIdSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderIdSource::Payload => "payload",
            ProviderIdSource::Existing => "existing",
        }
    }
}

const MAX_DEPTH: usize = 16;

const PRIMARY_FIELDS: &[&str] = &["payment_id", "liqpay_order_id"];

const DIRECT_FIELDS: &[&str] = &[
    "subscribe_id",
    "subscription_id",
    "order_sub_id",
    "order_subscribe_id",
    "liqpay_subscription_id",
    "liqpay_subscribe_id",
    "subscribeId",
    "subscriptionId",
    "subId",
    "sub_id",
];

const CASE_INSENSITIVE_FIELDS: &[&str] = &[
    "subscribe_id",
    "subscription_id",
    "subscribeId",
    "subscriptionId",
    "subId",
    "sub_id",
    "payment_id",
    "liqpay_order_id",
];

const NESTED_FIELDS: &[(&str, &str)] = &[
    ("subscribe", "id"),
    ("subscribe", "subscribe_id"),
    ("subscribe", "subscription_id"),
    ("subscription", "id"),
    ("subscription", "subscribe_id"),
    ("subscription", "subscription_id"),
    ("data", "subscribe_id"),
    ("data", "subscription_id"),
    ("data", "sub_id"),
    ("payment", "subscribe_id"),
    ("payment", "subscription_id"),
    ("response", "subscribe_id"),
    ("response", "subscription_id"),
];

const TEXT_TOKENS: &[&str] = &[
    "subscribe_id",
    "subscription_id",
    "order_sub_id",
    "order_subscribe_id",
    "liqpay_subscription_id",
    "liqpay_subscribe_id",
    "sub_id",
    "payment_id",
    "liqpay_order_id",
];

/// Extracts the provider identifier from a callback payload.
pub fn extract(payload: &CallbackPayload) -> Option<String> {
    if let Some(found) = payload.first_text(PRIMARY_FIELDS) {
        return Some(found);
    }
    if let Some(found) = payload.first_text(DIRECT_FIELDS) {
        return Some(found);
    }
    if let Some(found) = CASE_INSENSITIVE_FIELDS
        .iter()
        .find_map(|field| payload.text_ignore_case(field))
    {
        return Some(found);
    }
    if let Some(found) = NESTED_FIELDS
        .iter()
        .find_map(|(container, field)| payload.nested_text(container, field))
    {
        return Some(found);
    }

    let root = Value::Object(payload.root().clone());
    search_structure(&root, "", 0)
        .or_else(|| search_embedded_json(&root, "", 0))
        .or_else(|| search_text_tokens(&root, 0))
}

/// Payload identifier, else the one already stored, tagged with its origin.
pub fn resolve(
    payload: &CallbackPayload,
    existing: Option<&str>,
) -> Option<(String, ProviderIdSource)> {
    if let Some(found) = extract(payload) {
        return Some((found, ProviderIdSource::Payload));
    }
    existing
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| (id.to_string(), ProviderIdSource::Existing))
}

fn search_structure(node: &Value, context: &str, depth: usize) -> Option<String> {
    if depth > MAX_DEPTH {
        return None;
    }
    match node {
        Value::Array(items) => items
            .iter()
            .find_map(|item| search_structure(item, context, depth + 1)),
        Value::Object(map) => map.iter().find_map(|(key, value)| {
            candidate(context, key, value)
                .or_else(|| search_structure(value, &join_context(context, key), depth + 1))
        }),
        _ => None,
    }
}

fn search_embedded_json(node: &Value, context: &str, depth: usize) -> Option<String> {
    if depth > MAX_DEPTH {
        return None;
    }
    match node {
        Value::String(text) => parse_embedded_json(text).and_then(|parsed| {
            search_structure(&parsed, context, depth + 1)
                .or_else(|| search_embedded_json(&parsed, context, depth + 1))
        }),
        Value::Array(items) => items
            .iter()
            .find_map(|item| search_embedded_json(item, context, depth + 1)),
        Value::Object(map) => map
            .iter()
            .find_map(|(key, value)| {
                search_embedded_json(value, &join_context(context, key), depth + 1)
            }),
        _ => None,
    }
}

fn search_text_tokens(node: &Value, depth: usize) -> Option<String> {
    if depth > MAX_DEPTH {
        return None;
    }
    match node {
        Value::String(text) => scan_text_tokens(text),
        Value::Array(items) => items
            .iter()
            .find_map(|item| search_text_tokens(item, depth + 1)),
        Value::Object(map) => map
            .values()
            .find_map(|value| search_text_tokens(value, depth + 1)),
        _ => None,
    }
}

fn candidate(context: &str, field: &str, value: &Value) -> Option<String> {
    if value.is_array() || value.is_object() {
        return None;
    }
    let field_looks_like_id = indicates_id(field);
    let matches = (indicates_subscription(field) && field_looks_like_id)
        || (indicates_subscription(context) && field_looks_like_id)
        || (normalize_name(context).contains("subscribe") && normalize_name(field).contains("id"));
    if matches {
        scalar_text(value)
    } else {
        None
    }
}

fn join_context(context: &str, key: &str) -> String {
    if context.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", context, key)
    }
}

fn indicates_subscription(name: &str) -> bool {
    if name.trim().is_empty() {
        return false;
    }
    let lower = name.to_lowercase();
    lower.contains("subscr") || normalize_name(name).starts_with("sub")
}

fn indicates_id(name: &str) -> bool {
    normalize_name(name).contains("id")
}

fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

fn parse_embedded_json(text: &str) -> Option<Value> {
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Scans free text for `token: value` / `token=value` fragments.
fn scan_text_tokens(text: &str) -> Option<String> {
    let value = text.trim();
    if value.is_empty() {
        return None;
    }
    // ASCII folding keeps byte offsets valid for slicing `value`.
    let lower = value.to_ascii_lowercase();
    TEXT_TOKENS.iter().find_map(|token| {
        let idx = lower.find(token)?;
        let rest = &value[idx + token.len()..];
        let rest = rest.trim_start_matches(|c: char| {
            c.is_whitespace() || matches!(c, ':' | '=' | '"' | '\'')
        });
        if rest.starts_with('{') || rest.starts_with('[') {
            return None;
        }
        let end = rest
            .find(|c: char| {
                c.is_whitespace() || matches!(c, '"' | '\'' | ',' | ';' | '}' | ']' | ')')
            })
            .unwrap_or(rest.len());
        let found = rest[..end].trim();
        if found.is_empty() {
            None
        } else {
            Some(found.to_string())
        }
    })
}
