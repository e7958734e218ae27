//! CancellationCoordinator - Cancels the recurring agreement at LiqPay.

use std::sync::Arc;

use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::{
    IdentifierField, PaymentFlowEvent, PaymentFlowLog, PaymentGateway, UnsubscribeRequest,
    UnsubscribeResponse,
};

const GENERIC_FAILURE: &str = "Failed to cancel subscription in LiqPay";

/// Sends `unsubscribe` keyed by `payment_id`, retrying once with
/// `subscribe_id` when LiqPay reports the first identifier as unknown.
pub struct CancellationCoordinator {
    gateway: Arc<dyn PaymentGateway>,
    flow_log: Arc<dyn PaymentFlowLog>,
}

impl CancellationCoordinator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, flow_log: Arc<dyn PaymentFlowLog>) -> Self {
        Self { gateway, flow_log }
    }

    /// Returns the identifier field LiqPay accepted.
    ///
    /// # Errors
    ///
    /// - `IntegrationNotConfigured` when keys are missing
    /// - `CancellationFailed` on refusal, transport failure or a missing provider id
    pub async fn cancel(
        &self,
        subscription: &Subscription,
    ) -> Result<IdentifierField, SubscriptionError> {
        let user_id = Some(subscription.user_id);
        let order_id = subscription.id.to_string();

        if !self.gateway.is_configured() {
            self.flow_log.log(
                PaymentFlowEvent::new(
                    "LIQPAY_UNSUBSCRIBE_CONFIGURATION_MISSING",
                    "LiqPay credentials are not configured",
                )
                .user(user_id)
                .order(Some(&order_id)),
            );
            return Err(SubscriptionError::integration_not_configured());
        }

        let Some(provider_id) = subscription
            .provider_subscription_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            self.flow_log.log(
                PaymentFlowEvent::new(
                    "LIQPAY_UNSUBSCRIBE_IDENTIFIER_MISSING",
                    "Subscription does not contain provider subscription id",
                )
                .user(user_id)
                .order(Some(&order_id)),
            );
            return Err(SubscriptionError::cancellation_failed(
                "Subscription does not contain provider subscription id",
            ));
        };

        let mut request = UnsubscribeRequest {
            identifier_field: IdentifierField::PaymentId,
            provider_subscription_id: provider_id.to_string(),
            order_id,
            card_token: subscription.provider_customer_token.clone(),
        };

        let first = self.attempt(subscription, &request).await?;
        if first.is_success() {
            return Ok(request.identifier_field);
        }

        let refusal = if first.is_not_found() {
            tracing::info!(
                user_id = %subscription.user_id,
                "LiqPay did not find payment_id, retrying unsubscribe with subscribe_id"
            );
            request.identifier_field = IdentifierField::SubscribeId;
            let second = self.attempt(subscription, &request).await?;
            if second.is_success() {
                return Ok(request.identifier_field);
            }
            second
        } else {
            first
        };

        Err(SubscriptionError::cancellation_failed(
            refusal
                .error_message()
                .unwrap_or_else(|| GENERIC_FAILURE.to_string()),
        ))
    }

    /// One logged request; transport failures become `CancellationFailed`.
    async fn attempt(
        &self,
        subscription: &Subscription,
        request: &UnsubscribeRequest,
    ) -> Result<UnsubscribeResponse, SubscriptionError> {
        let field = request.identifier_field.field_name();
        let step = |name: &str, message: &str| {
            PaymentFlowEvent::new(name, message)
                .user(Some(subscription.user_id))
                .order(Some(&request.order_id))
                .with("identifier_type", field)
                .with(field, &request.provider_subscription_id)
                .with("order_id", &request.order_id)
        };

        self.flow_log.log(step(
            "LIQPAY_UNSUBSCRIBE_REQUEST",
            "Sending unsubscribe request to LiqPay",
        ));

        match self.gateway.send_unsubscribe(request).await {
            Ok(response) => {
                let (name, message) = if response.is_success() {
                    ("LIQPAY_UNSUBSCRIBE_SUCCESS", "Cancelled subscription in LiqPay")
                } else {
                    (
                        "LIQPAY_UNSUBSCRIBE_FAILED",
                        "LiqPay returned non-success response for unsubscribe",
                    )
                };
                self.flow_log
                    .log(step(name, message).with_all(response.log_context()));
                Ok(response)
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %subscription.user_id,
                    identifier_type = field,
                    error = %err,
                    "LiqPay unsubscribe request failed"
                );
                self.flow_log.log(
                    step("LIQPAY_UNSUBSCRIBE_ERROR", GENERIC_FAILURE)
                        .error(&err.code.to_string(), &err),
                );
                Err(SubscriptionError::cancellation_failed(GENERIC_FAILURE))
            }
        }
    }
}
