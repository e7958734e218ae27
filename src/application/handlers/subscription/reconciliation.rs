//! PaymentReconciler - Confirms pending subscriptions via the status API.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::liqpay::CallbackAction;
use crate::domain::subscription::{Activation, PaymentFailure, Plan, SubscriptionError};
use crate::ports::{PaymentFlowEvent, PaymentFlowLog, PaymentGateway, PaymentStatus};

use super::lifecycle::SubscriptionLifecycleService;

/// What a reconciliation decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationDecision {
    /// Provider confirmed capture; the subscription is Active.
    Activated {
        already_active: bool,
        provider_status: Option<String>,
    },
    /// Provider reports the charge failed; the subscription is PastDue.
    Failed { provider_status: Option<String> },
    /// No answer or an ambiguous one; the subscription stays pending.
    Inconclusive,
}

/// A subscription just marked pending from a subscribe callback.
#[derive(Debug, Clone)]
pub struct PendingSubscription<'a> {
    pub user_id: UserId,
    pub plan: &'a Plan,
    pub order_id: &'a str,
    pub payment_id: Option<&'a str>,
    pub provider_subscription_id: &'a str,
    pub customer_token: Option<&'a str>,
    pub current_period_ends_at: Timestamp,
    pub next_billing_at: Timestamp,
}

/// Queries LiqPay for the authoritative payment status and applies it.
pub struct PaymentReconciler {
    gateway: Arc<dyn PaymentGateway>,
    lifecycle: Arc<SubscriptionLifecycleService>,
    flow_log: Arc<dyn PaymentFlowLog>,
}

impl PaymentReconciler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        lifecycle: Arc<SubscriptionLifecycleService>,
        flow_log: Arc<dyn PaymentFlowLog>,
    ) -> Self {
        Self {
            gateway,
            lifecycle,
            flow_log,
        }
    }

    /// Unreachable or ambiguous status is `Inconclusive`, never an error.
    ///
    /// # Errors
    ///
    /// Only persistence failures while applying a definite answer.
    pub async fn reconcile(
        &self,
        pending: &PendingSubscription<'_>,
    ) -> Result<ReconciliationDecision, SubscriptionError> {
        let Some(status) = self.fetch_status(pending).await else {
            return Ok(ReconciliationDecision::Inconclusive);
        };
        let provider_status = status.status.clone();
        let plan = pending.plan;
        let user_id = Some(pending.user_id);

        match CallbackAction::Pay.classify(provider_status.as_deref()) {
            class if class.is_success() => {
                self.flow_log.log(
                    PaymentFlowEvent::new(
                        "SUBSCRIPTION_ACTIVATION_ATTEMPT",
                        "Confirming subscription activation via status API",
                    )
                    .user(user_id)
                    .order(Some(pending.order_id))
                    .with("plan", &plan.code)
                    .with_opt("status", provider_status.as_deref())
                    .with("provider_subscription_id", pending.provider_subscription_id)
                    .with("confirmation_source", "status_api"),
                );

                let activation = Activation {
                    customer_token: pending.customer_token.map(str::to_string),
                    provider_subscription_id: Some(pending.provider_subscription_id.to_string()),
                    current_period_ends_at: pending.current_period_ends_at,
                    next_billing_at: pending.next_billing_at,
                    order_id: Some(pending.order_id.to_string()),
                };
                let outcome = self
                    .lifecycle
                    .activate(&pending.user_id, plan, &activation)
                    .await?;

                let (step, message) = if outcome.already_active {
                    ("SUBSCRIPTION_ALREADY_ACTIVE", "Subscription was already active for plan")
                } else {
                    (
                        "SUBSCRIPTION_ACTIVATED",
                        "Subscription activated after confirming payment via status API",
                    )
                };
                self.flow_log.log(
                    PaymentFlowEvent::new(step, message)
                        .user(user_id)
                        .order(Some(pending.order_id))
                        .with("plan", &plan.code),
                );

                Ok(ReconciliationDecision::Activated {
                    already_active: outcome.already_active,
                    provider_status,
                })
            }
            class if class.is_failure() => {
                self.flow_log.log(
                    PaymentFlowEvent::new(
                        "SUBSCRIPTION_PAYMENT_FAILED",
                        "LiqPay status API reported failed payment",
                    )
                    .user(user_id)
                    .order(Some(pending.order_id))
                    .with_all(status.log_context())
                    .with("plan", &plan.code),
                );

                let failure = PaymentFailure {
                    provider_subscription_id: Some(pending.provider_subscription_id.to_string()),
                    failure_status: provider_status.clone(),
                    failure_reason: status.failure_reason(),
                    order_id: Some(pending.order_id.to_string()),
                };
                self.lifecycle
                    .mark_failed(&pending.user_id, plan, &failure)
                    .await?;

                Ok(ReconciliationDecision::Failed { provider_status })
            }
            _ => {
                tracing::debug!(
                    user_id = %pending.user_id,
                    order_id = pending.order_id,
                    status = ?provider_status,
                    "Payment status inconclusive, subscription stays pending"
                );
                Ok(ReconciliationDecision::Inconclusive)
            }
        }
    }

    async fn fetch_status(&self, pending: &PendingSubscription<'_>) -> Option<PaymentStatus> {
        if !self.gateway.is_configured() || pending.order_id.trim().is_empty() {
            return None;
        }
        let user_id = Some(pending.user_id);

        self.flow_log.log(
            PaymentFlowEvent::new("PAYMENT_STATUS_REQUESTED", "Requesting LiqPay payment status")
                .user(user_id)
                .order(Some(pending.order_id))
                .with_opt("payment_id", pending.payment_id),
        );

        match self
            .gateway
            .query_status(pending.order_id, pending.payment_id)
            .await
        {
            Ok(status) => {
                self.flow_log.log(
                    PaymentFlowEvent::new("PAYMENT_STATUS_RECEIVED", "Received LiqPay payment status")
                        .user(user_id)
                        .order(Some(pending.order_id))
                        .with_all(status.log_context()),
                );
                Some(status)
            }
            Err(err) => {
                tracing::warn!(
                    order_id = pending.order_id,
                    error = %err,
                    "Unable to fetch LiqPay payment status"
                );
                self.flow_log.log(
                    PaymentFlowEvent::new("PAYMENT_STATUS_FAILED", "Failed to fetch LiqPay payment status")
                        .user(user_id)
                        .order(Some(pending.order_id))
                        .error(&err.code.to_string(), &err),
                );
                None
            }
        }
    }
}
