//! Order reference recovery.
//!
//! Checkout embeds `<user uuid>--<plan code>--<random uuid>` as the LiqPay
//! `order_id`. Older orders used `<user uuid>-<suffix>` and carried the plan
//! code in `info` or `product_id`.

use std::fmt;

use uuid::Uuid;

use crate::domain::foundation::UserId;

use super::payload::{first_non_blank, CallbackPayload};

/// Delimiter between composite order id segments.
pub const ORDER_ID_DELIMITER: &str = "--";

/// The (order, user, plan) triple recovered from a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReference {
    pub order_id: String,
    pub user_id: UserId,
    pub plan_code: String,
}

/// Why an order reference could not be recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderReferenceError {
    MissingOrderId,
    InvalidUserId(String),
    UnknownPlan,
    UnknownUser(String),
}

impl fmt::Display for OrderReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderReferenceError::MissingOrderId => write!(f, "LiqPay callback missing order_id"),
            OrderReferenceError::InvalidUserId(value) => {
                write!(f, "Invalid UUID in LiqPay callback: {}", value)
            }
            OrderReferenceError::UnknownPlan => {
                write!(f, "Unable to determine plan from LiqPay callback")
            }
            OrderReferenceError::UnknownUser(order_id) => {
                write!(f, "Unable to determine user from order {}", order_id)
            }
        }
    }
}

impl std::error::Error for OrderReferenceError {}

impl OrderReference {
    /// Builds a fresh composite order id for a checkout.
    pub fn compose(user_id: &UserId, plan_code: &str) -> String {
        format!(
            "{}{}{}{}{}",
            user_id,
            ORDER_ID_DELIMITER,
            plan_code,
            ORDER_ID_DELIMITER,
            Uuid::new_v4()
        )
    }

    /// Recovers the reference from a decoded callback payload.
    pub fn resolve(payload: &CallbackPayload) -> Result<Self, OrderReferenceError> {
        let order_id = payload
            .text("order_id")
            .ok_or(OrderReferenceError::MissingOrderId)?;

        if order_id.contains(ORDER_ID_DELIMITER) {
            let parts: Vec<&str> = order_id.split(ORDER_ID_DELIMITER).collect();
            if parts.len() >= 3 {
                let user_id = parts[0]
                    .parse::<UserId>()
                    .map_err(|_| OrderReferenceError::InvalidUserId(parts[0].to_string()))?;
                return Ok(Self {
                    plan_code: parts[1].to_string(),
                    user_id,
                    order_id,
                });
            }
        }

        let plan_code = first_non_blank([payload.text("info"), payload.text("product_id")])
            .ok_or(OrderReferenceError::UnknownPlan)?;
        let user_id = legacy_user_id(&order_id)
            .ok_or_else(|| OrderReferenceError::UnknownUser(order_id.clone()))?;

        Ok(Self {
            order_id,
            user_id,
            plan_code,
        })
    }
}

fn legacy_user_id(order_id: &str) -> Option<UserId> {
    let separator = order_id.rfind('-')?;
    if separator == 0 {
        return None;
    }
    order_id[..separator].parse().ok()
}
