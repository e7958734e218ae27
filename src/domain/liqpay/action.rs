//! Callback actions and the per-action status vocabularies.

use std::fmt;

/// Callback action reported in the `action` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackAction {
    Subscribe,
    Pay,
    Unsubscribe,
}

impl CallbackAction {
    /// Parses a lower-cased action token.
    pub fn parse(action: &str) -> Option<Self> {
        match action.trim().to_lowercase().as_str() {
            "subscribe" => Some(CallbackAction::Subscribe),
            "pay" => Some(CallbackAction::Pay),
            "unsubscribe" => Some(CallbackAction::Unsubscribe),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackAction::Subscribe => "subscribe",
            CallbackAction::Pay => "pay",
            CallbackAction::Unsubscribe => "unsubscribe",
        }
    }

    /// Classifies a raw provider status for this action.
    pub fn classify(&self, status: Option<&str>) -> StatusClass {
        let Some(raw) = status.map(str::trim).filter(|s| !s.is_empty()) else {
            return StatusClass::Unknown;
        };
        let token = raw.to_lowercase();
        let (success, failure): (&[&str], &[&str]) = match self {
            CallbackAction::Subscribe => (SUBSCRIBE_SUCCESS, &[]),
            CallbackAction::Pay => (PAY_SUCCESS, PAY_FAILURE),
            CallbackAction::Unsubscribe => (UNSUBSCRIBE_SUCCESS, &[]),
        };
        if success.contains(&token.as_str()) {
            StatusClass::Success
        } else if failure.contains(&token.as_str()) {
            StatusClass::Failure
        } else if PENDING.contains(&token.as_str()) {
            StatusClass::Pending
        } else {
            StatusClass::Unknown
        }
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed outcome of a raw provider status token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Failure,
    Pending,
    Unknown,
}

impl StatusClass {
    pub fn is_success(&self) -> bool {
        matches!(self, StatusClass::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StatusClass::Failure)
    }
}

const SUBSCRIBE_SUCCESS: &[&str] = &["success", "sandbox", "subscribed"];

const PAY_SUCCESS: &[&str] = &["success", "sandbox", "payok", "subscribed"];

const PAY_FAILURE: &[&str] = &[
    "failure",
    "fail",
    "error",
    "reversed",
    "refund",
    "refunded",
    "chargeback",
    "canceled",
    "cancelled",
    "expired",
    "unsubscribed",
];

const UNSUBSCRIBE_SUCCESS: &[&str] = &[
    "success",
    "sandbox",
    "ok",
    "unsubscribed",
    "unsubscribesuccess",
    "subscribecanceled",
    "canceled",
    "cancelled",
];

// LiqPay intermediate states; informational only.
const PENDING: &[&str] = &[
    "processing",
    "prepared",
    "wait_accept",
    "wait_secure",
    "wait_card",
    "wait_compensation",
    "wait_reserve",
    "hold_wait",
    "3ds_verify",
    "otp_verify",
    "cvv_verify",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognises_known_actions_case_insensitively() {
        assert_eq!(CallbackAction::parse("SUBSCRIBE"), Some(CallbackAction::Subscribe));
        assert_eq!(CallbackAction::parse(" pay "), Some(CallbackAction::Pay));
        assert_eq!(CallbackAction::parse("unsubscribe"), Some(CallbackAction::Unsubscribe));
        assert_eq!(CallbackAction::parse("hold"), None);
    }

    #[test]
    fn subscribe_vocabulary() {
        let action = CallbackAction::Subscribe;
        assert!(action.classify(Some("Subscribed")).is_success());
        assert!(action.classify(Some("sandbox")).is_success());
        assert!(!action.classify(Some("payok")).is_success());
        assert_eq!(action.classify(Some("failure")), StatusClass::Unknown);
    }

    #[test]
    fn pay_vocabulary() {
        let action = CallbackAction::Pay;
        for status in ["success", "sandbox", "PAYOK", "subscribed"] {
            assert!(action.classify(Some(status)).is_success(), "{}", status);
        }
        for status in [
            "failure", "fail", "error", "reversed", "refund", "refunded", "chargeback",
            "canceled", "cancelled", "expired", "unsubscribed",
        ] {
            assert!(action.classify(Some(status)).is_failure(), "{}", status);
        }
        assert_eq!(action.classify(Some("processing")), StatusClass::Pending);
    }

    #[test]
    fn unsubscribe_vocabulary() {
        let action = CallbackAction::Unsubscribe;
        for status in [
            "success", "sandbox", "ok", "unsubscribed", "UnsubscribeSuccess",
            "subscribecanceled", "canceled", "cancelled",
        ] {
            assert!(action.classify(Some(status)).is_success(), "{}", status);
        }
        assert!(!action.classify(Some("error")).is_success());
    }

    #[test]
    fn missing_status_is_unknown() {
        assert_eq!(CallbackAction::Pay.classify(None), StatusClass::Unknown);
        assert_eq!(CallbackAction::Pay.classify(Some("  ")), StatusClass::Unknown);
    }
}
