//! ProcessCallbackHandler - Applies a LiqPay server callback.
//!
//! Pipeline: authenticate, decode, classify the action, recover the order
//! reference, resolve user/plan/provider id, then route to the subscribe,
//! pay or unsubscribe path. Every exit writes a payment flow step.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::liqpay::{
    codec, provider_id, CallbackAction, CallbackError, CallbackPayload, LiqPayCredentials,
    OrderReference, ProviderIdSource, StatusClass,
};
use crate::domain::subscription::{
    Activation, PaymentFailure, PendingPayment, Plan, ProviderCancellation, SubscriptionError,
};
use crate::ports::{PaymentFlowEvent, PaymentFlowLog, PlanCatalog, UserDirectory};

use super::lifecycle::SubscriptionLifecycleService;
use super::reconciliation::{PaymentReconciler, PendingSubscription, ReconciliationDecision};

const PERIOD_END_FIELDS: &[&str] = &["subscribe_date_end", "next_pay_time", "end_time", "date_end"];
const NEXT_BILLING_FIELDS: &[&str] = &["next_pay_time", "next_payment_date", "next_bill_date"];
const PENDING_BILLING_FIELDS: &[&str] = &["subscribe_date_start", "next_pay_time", "next_payment_date"];
const CUSTOMER_TOKEN_FIELDS: &[&str] = &["card_token", "token", "cardToken"];
const FAILURE_REASON_FIELDS: &[&str] = &[
    "err_description",
    "failure_reason",
    "errormsg",
    "description",
    "status",
];

/// Tolerance for a pending start date that is already slightly in the past.
const PENDING_START_GRACE_MINUTES: i64 = 5;

/// Raw form fields posted by LiqPay.
#[derive(Debug, Clone, Default)]
pub struct CallbackCommand {
    pub data: String,
    pub signature: String,
}

/// Outcome of one applied callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResult {
    pub order_id: String,
    pub user_id: UserId,
    pub plan_code: String,
    pub provider_status: Option<String>,
    pub activated: bool,
    pub already_active: bool,
    pub activation_pending: bool,
    pub payment_failed: bool,
}

impl CallbackResult {
    fn for_context(ctx: &CallbackContext<'_>) -> Self {
        Self {
            order_id: ctx.reference.order_id.clone(),
            user_id: ctx.reference.user_id,
            plan_code: ctx.plan.code.clone(),
            provider_status: ctx.status.clone(),
            activated: false,
            already_active: false,
            activation_pending: false,
            payment_failed: false,
        }
    }
}

/// What is known so far, for the processing-error step.
#[derive(Debug, Default)]
struct CallbackTrace {
    user_id: Option<UserId>,
    order_id: Option<String>,
    plan_code: Option<String>,
    status: Option<String>,
}

impl CallbackTrace {
    fn failure_message(&self) -> String {
        let mut message = String::from("Failed to process LiqPay callback");
        if let Some(plan) = &self.plan_code {
            message.push_str(&format!(" for plan {}", plan));
        }
        if let Some(status) = &self.status {
            message.push_str(&format!(" (status={})", status));
        }
        message
    }
}

/// Everything resolved before routing on the action.
struct CallbackContext<'a> {
    payload: &'a CallbackPayload,
    reference: &'a OrderReference,
    plan: &'a Plan,
    status: Option<String>,
    customer_token: Option<String>,
    provider_id: String,
    provider_id_source: ProviderIdSource,
    now: Timestamp,
}

impl CallbackContext<'_> {
    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    fn event(&self, step: &str, message: &str) -> PaymentFlowEvent {
        PaymentFlowEvent::new(step, message)
            .user(Some(self.reference.user_id))
            .order(Some(&self.reference.order_id))
    }
}

/// Handler for inbound LiqPay callbacks.
pub struct ProcessCallbackHandler {
    credentials: LiqPayCredentials,
    users: Arc<dyn UserDirectory>,
    plans: Arc<dyn PlanCatalog>,
    lifecycle: Arc<SubscriptionLifecycleService>,
    reconciler: Arc<PaymentReconciler>,
    flow_log: Arc<dyn PaymentFlowLog>,
}

impl ProcessCallbackHandler {
    pub fn new(
        credentials: LiqPayCredentials,
        users: Arc<dyn UserDirectory>,
        plans: Arc<dyn PlanCatalog>,
        lifecycle: Arc<SubscriptionLifecycleService>,
        reconciler: Arc<PaymentReconciler>,
        flow_log: Arc<dyn PaymentFlowLog>,
    ) -> Self {
        Self {
            credentials,
            users,
            plans,
            lifecycle,
            reconciler,
            flow_log,
        }
    }

    pub async fn handle(&self, cmd: CallbackCommand) -> Result<CallbackResult, CallbackError> {
        let mut trace = CallbackTrace::default();
        let result = self.process(&cmd, &mut trace).await;

        if let Err(err) = &result {
            tracing::warn!(
                order_id = ?trace.order_id,
                plan = ?trace.plan_code,
                status = ?trace.status,
                error = %err,
                "LiqPay callback not applied"
            );
            self.flow_log.log(
                PaymentFlowEvent::new("CALLBACK_PROCESSING_ERROR", trace.failure_message())
                    .user(trace.user_id)
                    .order(trace.order_id.as_deref())
                    .error(error_kind(err), err),
            );
        }
        result
    }

    async fn process(
        &self,
        cmd: &CallbackCommand,
        trace: &mut CallbackTrace,
    ) -> Result<CallbackResult, CallbackError> {
        let data = cmd.data.trim();
        let signature = cmd.signature.trim();

        // 1. Authenticate
        if data.is_empty() || signature.is_empty() {
            self.flow_log.log(
                PaymentFlowEvent::new("CALLBACK_REJECTED", "Missing LiqPay data or signature")
                    .with("has_data", !data.is_empty())
                    .with("has_signature", !signature.is_empty()),
            );
            return Err(CallbackError::validation("Missing LiqPay callback payload"));
        }
        if !self.credentials.has_private_key() {
            self.flow_log.log(PaymentFlowEvent::new(
                "CALLBACK_CONFIGURATION_ERROR",
                "LiqPay private key is not configured",
            ));
            return Err(CallbackError::Configuration);
        }
        if !self.credentials.verify(data, signature) {
            self.flow_log.log(
                PaymentFlowEvent::new(
                    "CALLBACK_SIGNATURE_INVALID",
                    "LiqPay callback signature mismatch",
                )
                .with("signature_length", signature.len()),
            );
            return Err(CallbackError::SignatureMismatch);
        }
        self.flow_log.log(
            PaymentFlowEvent::new("CALLBACK_SIGNATURE_VALID", "LiqPay callback signature verified")
                .with("data_length", data.len()),
        );

        // 2. Decode and classify
        let payload = codec::decode(data).map_err(|e| {
            tracing::debug!(error = %e, "Unable to decode LiqPay payload");
            CallbackError::validation("Unable to decode LiqPay payload")
        })?;
        let action = self.resolve_action(&payload)?;
        let status = payload.status();
        trace.status = status.clone();

        self.flow_log.log(
            PaymentFlowEvent::new(received_step(action), "Received LiqPay callback")
                .with("action", action)
                .with_opt("status", status.as_deref()),
        );

        // 3. Order reference
        let reference =
            OrderReference::resolve(&payload).map_err(|e| CallbackError::validation(e.to_string()))?;
        trace.user_id = Some(reference.user_id);
        trace.order_id = Some(reference.order_id.clone());
        trace.plan_code = Some(reference.plan_code.clone());
        self.flow_log.log(
            PaymentFlowEvent::new(
                "CALLBACK_ORDER_IDENTIFIED",
                "Identified order reference from LiqPay callback",
            )
            .user(Some(reference.user_id))
            .order(Some(&reference.order_id))
            .with("plan", &reference.plan_code)
            .with_opt("status", status.as_deref()),
        );

        // 4. User, plan, existing subscription
        let user = self
            .users
            .find_by_id(&reference.user_id)
            .await
            .map_err(|e| CallbackError::internal(e.to_string()))?;
        if user.is_none() {
            self.flow_log.log(
                PaymentFlowEvent::new("CALLBACK_USER_NOT_FOUND", "User not found for LiqPay callback")
                    .user(Some(reference.user_id))
                    .order(Some(&reference.order_id)),
            );
            return Err(CallbackError::rejected(format!(
                "User not found for LiqPay order {}",
                reference.order_id
            )));
        }

        let plan = self
            .plans
            .find_by_code(&reference.plan_code)
            .await
            .map_err(|e| CallbackError::internal(e.to_string()))?
            .ok_or_else(|| {
                self.flow_log.log(
                    PaymentFlowEvent::new(
                        "CALLBACK_PLAN_NOT_FOUND",
                        "Subscription plan not found for LiqPay callback",
                    )
                    .user(Some(reference.user_id))
                    .order(Some(&reference.order_id))
                    .with("plan", &reference.plan_code),
                );
                CallbackError::validation(format!(
                    "Subscription plan not found: {}",
                    reference.plan_code
                ))
            })?;
        if plan.is_trial() {
            self.flow_log.log(
                PaymentFlowEvent::new(
                    "CALLBACK_TRIAL_PLAN_REJECTED",
                    "Attempt to activate trial plan via LiqPay",
                )
                .user(Some(reference.user_id))
                .order(Some(&reference.order_id))
                .with("plan", &plan.code),
            );
            return Err(CallbackError::rejected(
                "Cannot activate trial plan from LiqPay callback",
            ));
        }

        let existing = self
            .lifecycle
            .current_subscription(&reference.user_id)
            .await
            .map_err(lifecycle_error)?;

        // 5. Provider identifiers
        let customer_token = payload.first_text(CUSTOMER_TOKEN_FIELDS);
        let existing_id = existing
            .as_ref()
            .and_then(|s| s.provider_subscription_id.as_deref());
        let Some((provider_id, provider_id_source)) = provider_id::resolve(&payload, existing_id)
        else {
            self.flow_log.log(
                PaymentFlowEvent::new(
                    "SUBSCRIPTION_PROVIDER_ID_MISSING",
                    "LiqPay callback did not contain subscription identifier",
                )
                .user(Some(reference.user_id))
                .order(Some(&reference.order_id))
                .with("plan", &plan.code)
                .with_opt("status", status.as_deref())
                .with("payload_keys", payload.key_summary())
                .with("payload_snapshot", payload.snapshot()),
            );
            return Err(CallbackError::validation(
                "LiqPay callback did not contain a provider subscription identifier",
            ));
        };

        let ctx = CallbackContext {
            payload: &payload,
            reference: &reference,
            plan: &plan,
            status,
            customer_token,
            provider_id,
            provider_id_source,
            now: Timestamp::now(),
        };

        // 6. Route
        match action {
            CallbackAction::Subscribe => self.handle_subscribe(&ctx).await,
            CallbackAction::Pay => self.handle_pay(&ctx).await,
            CallbackAction::Unsubscribe => self.handle_unsubscribe(&ctx).await,
        }
    }

    fn resolve_action(&self, payload: &CallbackPayload) -> Result<CallbackAction, CallbackError> {
        let Some(raw) = payload.action() else {
            self.flow_log.log(PaymentFlowEvent::new(
                "CALLBACK_ACTION_MISSING",
                "LiqPay callback did not include action",
            ));
            return Err(CallbackError::validation("LiqPay callback action is missing"));
        };
        CallbackAction::parse(&raw).ok_or_else(|| {
            self.flow_log.log(
                PaymentFlowEvent::new("CALLBACK_UNSUPPORTED_ACTION", "Unsupported LiqPay action")
                    .with("action", &raw),
            );
            CallbackError::rejected(format!("Unsupported LiqPay action: {}", raw))
        })
    }

    // ════════════════════════════════════════════════════════════════════════
    // Subscribe
    // ════════════════════════════════════════════════════════════════════════

    async fn handle_subscribe(
        &self,
        ctx: &CallbackContext<'_>,
    ) -> Result<CallbackResult, CallbackError> {
        let subscribe_class = CallbackAction::Subscribe.classify(ctx.status());

        // Cancellation tokens arriving on the subscribe channel
        if !subscribe_class.is_success()
            && CallbackAction::Unsubscribe.classify(ctx.status()).is_success()
        {
            self.flow_log.log(
                ctx.event(
                    "SUBSCRIPTION_PROVIDER_CANCELLATION_STATUS",
                    "LiqPay subscribe callback reported cancellation status",
                )
                .with("plan", &ctx.plan.code)
                .with_opt("status", ctx.status())
                .with("provider_subscription_id", &ctx.provider_id),
            );
            return self.handle_unsubscribe(ctx).await;
        }

        if !subscribe_class.is_success() {
            self.flow_log.log(
                ctx.event(
                    "SUBSCRIPTION_SUBSCRIBE_REJECTED",
                    "LiqPay subscribe callback returned a non-success status",
                )
                .with("plan", &ctx.plan.code)
                .with_opt("status", ctx.status()),
            );
            return Err(CallbackError::rejected(
                "LiqPay subscription payment was not successful",
            ));
        }

        let next_billing_at = pending_billing_date(ctx);
        let pending = PendingPayment {
            customer_token: ctx.customer_token.clone(),
            provider_subscription_id: Some(ctx.provider_id.clone()),
            next_billing_at: Some(next_billing_at),
            order_id: Some(ctx.reference.order_id.clone()),
            provider_status: ctx.status.clone(),
        };
        self.lifecycle
            .mark_subscribe_pending(&ctx.reference.user_id, ctx.plan, &pending)
            .await
            .map_err(lifecycle_error)?;
        self.flow_log.log(
            ctx.event("SUBSCRIPTION_PAYMENT_PENDING", "Marked subscription as pending payment")
                .with("plan", &ctx.plan.code)
                .with_opt("status", ctx.status())
                .with("provider_subscription_id", &ctx.provider_id)
                .with("next_billing_at", next_billing_at),
        );

        let current_period_ends_at = period_end(ctx);
        let payment_id = ctx.payload.text("payment_id");
        let decision = self
            .reconciler
            .reconcile(&PendingSubscription {
                user_id: ctx.reference.user_id,
                plan: ctx.plan,
                order_id: &ctx.reference.order_id,
                payment_id: payment_id.as_deref(),
                provider_subscription_id: &ctx.provider_id,
                customer_token: ctx.customer_token.as_deref(),
                current_period_ends_at,
                next_billing_at: next_billing(ctx, current_period_ends_at),
            })
            .await
            .map_err(lifecycle_error)?;

        let base = CallbackResult::for_context(ctx);
        Ok(match decision {
            ReconciliationDecision::Activated {
                already_active,
                provider_status,
            } => CallbackResult {
                provider_status,
                activated: !already_active,
                already_active,
                ..base
            },
            ReconciliationDecision::Failed { provider_status } => CallbackResult {
                provider_status,
                payment_failed: true,
                ..base
            },
            ReconciliationDecision::Inconclusive => CallbackResult {
                activation_pending: true,
                ..base
            },
        })
    }

    // ════════════════════════════════════════════════════════════════════════
    // Pay
    // ════════════════════════════════════════════════════════════════════════

    async fn handle_pay(&self, ctx: &CallbackContext<'_>) -> Result<CallbackResult, CallbackError> {
        match CallbackAction::Pay.classify(ctx.status()) {
            StatusClass::Success => self.activate_from_pay(ctx).await,
            StatusClass::Pending => self.pending_from_pay(ctx).await,
            StatusClass::Failure | StatusClass::Unknown => self.fail_from_pay(ctx).await,
        }
    }

    async fn activate_from_pay(
        &self,
        ctx: &CallbackContext<'_>,
    ) -> Result<CallbackResult, CallbackError> {
        let current_period_ends_at = period_end(ctx);
        let activation = Activation {
            customer_token: ctx.customer_token.clone(),
            provider_subscription_id: Some(ctx.provider_id.clone()),
            current_period_ends_at,
            next_billing_at: next_billing(ctx, current_period_ends_at),
            order_id: Some(ctx.reference.order_id.clone()),
        };

        self.flow_log.log(
            ctx.event(
                "SUBSCRIPTION_ACTIVATION_ATTEMPT",
                "Activating subscription based on LiqPay callback",
            )
            .with("plan", &ctx.plan.code)
            .with_opt("status", ctx.status())
            .with("provider_subscription_id", &ctx.provider_id)
            .with("provider_subscription_id_source", ctx.provider_id_source.as_str()),
        );

        let outcome = self
            .lifecycle
            .activate(&ctx.reference.user_id, ctx.plan, &activation)
            .await
            .map_err(lifecycle_error)?;

        let (step, message) = if outcome.already_active {
            ("SUBSCRIPTION_ALREADY_ACTIVE", "Subscription was already active for plan")
        } else {
            ("SUBSCRIPTION_ACTIVATED", "Subscription activated from LiqPay callback")
        };
        self.flow_log.log(
            ctx.event(step, message)
                .with("plan", &ctx.plan.code)
                .with_opt("status", ctx.status()),
        );

        Ok(CallbackResult {
            activated: !outcome.already_active,
            already_active: outcome.already_active,
            ..CallbackResult::for_context(ctx)
        })
    }

    async fn pending_from_pay(
        &self,
        ctx: &CallbackContext<'_>,
    ) -> Result<CallbackResult, CallbackError> {
        let next_billing_at = pending_billing_date(ctx);
        let pending = PendingPayment {
            customer_token: ctx.customer_token.clone(),
            provider_subscription_id: Some(ctx.provider_id.clone()),
            next_billing_at: Some(next_billing_at),
            order_id: Some(ctx.reference.order_id.clone()),
            provider_status: ctx.status.clone(),
        };
        self.lifecycle
            .mark_pending(&ctx.reference.user_id, ctx.plan, &pending)
            .await
            .map_err(lifecycle_error)?;
        self.flow_log.log(
            ctx.event("SUBSCRIPTION_PAYMENT_PENDING", "Marked subscription as pending payment")
                .with("plan", &ctx.plan.code)
                .with_opt("status", ctx.status())
                .with("provider_subscription_id", &ctx.provider_id)
                .with("next_billing_at", next_billing_at),
        );

        Ok(CallbackResult {
            activation_pending: true,
            ..CallbackResult::for_context(ctx)
        })
    }

    async fn fail_from_pay(
        &self,
        ctx: &CallbackContext<'_>,
    ) -> Result<CallbackResult, CallbackError> {
        let failure_reason = ctx.payload.first_text(FAILURE_REASON_FIELDS);
        self.flow_log.log(
            ctx.event("SUBSCRIPTION_PAYMENT_FAILED", "LiqPay reported payment failure")
                .with("plan", &ctx.plan.code)
                .with_opt("status", ctx.status())
                .with_opt("err_code", ctx.payload.text("err_code"))
                .with_opt("failure_reason", failure_reason.as_deref()),
        );

        let failure = PaymentFailure {
            provider_subscription_id: Some(ctx.provider_id.clone()),
            failure_status: ctx.status.clone(),
            failure_reason,
            order_id: Some(ctx.reference.order_id.clone()),
        };
        self.lifecycle
            .mark_failed(&ctx.reference.user_id, ctx.plan, &failure)
            .await
            .map_err(lifecycle_error)?;

        Ok(CallbackResult {
            payment_failed: true,
            ..CallbackResult::for_context(ctx)
        })
    }

    // ════════════════════════════════════════════════════════════════════════
    // Unsubscribe
    // ════════════════════════════════════════════════════════════════════════

    async fn handle_unsubscribe(
        &self,
        ctx: &CallbackContext<'_>,
    ) -> Result<CallbackResult, CallbackError> {
        if !CallbackAction::Unsubscribe.classify(ctx.status()).is_success() {
            self.flow_log.log(
                ctx.event(
                    "SUBSCRIPTION_PROVIDER_CANCELLATION_REJECTED",
                    "LiqPay unsubscribe callback returned a non-success status",
                )
                .with("plan", &ctx.plan.code)
                .with_opt("status", ctx.status())
                .with("provider_subscription_id", &ctx.provider_id),
            );
            return Err(CallbackError::rejected(
                "LiqPay reported that the subscription could not be cancelled",
            ));
        }

        let effective_at = future_date(ctx.payload, PERIOD_END_FIELDS, ctx.now);
        let cancellation = ProviderCancellation {
            provider_subscription_id: Some(ctx.provider_id.clone()),
            effective_at,
            provider_status: ctx.status.clone(),
        };
        let outcome = self
            .lifecycle
            .cancel_by_provider(&ctx.reference.user_id, ctx.plan, &cancellation)
            .await
            .map_err(lifecycle_error)?;

        self.flow_log.log(
            ctx.event(
                "SUBSCRIPTION_CANCELLED_BY_PROVIDER",
                "Marked subscription as cancelled based on LiqPay callback",
            )
            .with("plan", &ctx.plan.code)
            .with_opt("status", ctx.status())
            .with("provider_subscription_id", &ctx.provider_id)
            .with_opt(
                "cancellation_effective_at",
                outcome.subscription.cancellation_effective_at,
            ),
        );

        Ok(CallbackResult::for_context(ctx))
    }
}

fn received_step(action: CallbackAction) -> &'static str {
    match action {
        CallbackAction::Subscribe => "CALLBACK_SUBSCRIBE_RECEIVED",
        CallbackAction::Pay => "CALLBACK_PAY_RECEIVED",
        CallbackAction::Unsubscribe => "CALLBACK_UNSUBSCRIBE_RECEIVED",
    }
}

fn error_kind(err: &CallbackError) -> &'static str {
    match err {
        CallbackError::Configuration => "configuration",
        CallbackError::Validation(_) => "validation",
        CallbackError::SignatureMismatch => "signature_mismatch",
        CallbackError::Rejected(_) => "rejected",
        CallbackError::Internal(_) => "internal",
    }
}

fn lifecycle_error(err: SubscriptionError) -> CallbackError {
    match err {
        SubscriptionError::ValidationFailed { message, .. } => CallbackError::Validation(message),
        SubscriptionError::InvalidState { .. } => CallbackError::Rejected(err.to_string()),
        other => CallbackError::Internal(other.to_string()),
    }
}

/// First date among `fields` that lies after `now`.
fn future_date(payload: &CallbackPayload, fields: &[&str], now: Timestamp) -> Option<Timestamp> {
    fields
        .iter()
        .filter_map(|field| payload.date(&[*field]))
        .find(|date| date.is_after(&now))
}

/// End of the period a payment covers: provider date, else one plan period.
fn period_end(ctx: &CallbackContext<'_>) -> Timestamp {
    future_date(ctx.payload, PERIOD_END_FIELDS, ctx.now)
        .unwrap_or_else(|| ctx.plan.billing_period.advance(ctx.now))
}

fn next_billing(ctx: &CallbackContext<'_>, current_period_ends_at: Timestamp) -> Timestamp {
    future_date(ctx.payload, NEXT_BILLING_FIELDS, ctx.now).unwrap_or(current_period_ends_at)
}

/// Subscription start reported by the provider, tolerating small clock skew.
fn pending_billing_date(ctx: &CallbackContext<'_>) -> Timestamp {
    let earliest = ctx.now.minus_minutes(PENDING_START_GRACE_MINUTES);
    ctx.payload
        .date(PENDING_BILLING_FIELDS)
        .filter(|date| date.is_after(&earliest))
        .unwrap_or_else(|| ctx.plan.billing_period.advance(ctx.now))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use crate::domain::liqpay::{format_provider_date, signature};
    use crate::domain::subscription::{SubscriptionEventType, SubscriptionStatus};
    use crate::ports::PaymentStatus;
    use serde_json::{json, Value};

    fn order(user: &UserId, plan: &str) -> String {
        OrderReference::compose(user, plan)
    }

    async fn send(harness: &Harness, payload: Value) -> Result<CallbackResult, CallbackError> {
        let cmd = harness.sealed(payload);
        harness.callback_handler().handle(cmd).await
    }

    // ════════════════════════════════════════════════════════════════════════
    // Authentication and decoding
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn missing_fields_are_invalid() {
        let harness = Harness::new();
        let result = harness
            .callback_handler()
            .handle(CallbackCommand {
                data: "  ".to_string(),
                signature: "sig".to_string(),
            })
            .await;

        assert!(matches!(result, Err(CallbackError::Validation(_))));
        let rejected = harness.flow_log.find("CALLBACK_REJECTED").unwrap();
        assert_eq!(rejected.context_value("has_data"), Some("false"));
        assert_eq!(rejected.context_value("has_signature"), Some("true"));
        assert!(harness.flow_log.has_step("CALLBACK_PROCESSING_ERROR"));
    }

    #[tokio::test]
    async fn missing_private_key_is_configuration_error() {
        let harness = Harness::unconfigured();
        let result = harness
            .callback_handler()
            .handle(CallbackCommand {
                data: "e30=".to_string(),
                signature: "sig".to_string(),
            })
            .await;

        assert_eq!(result, Err(CallbackError::Configuration));
        assert!(harness.flow_log.has_step("CALLBACK_CONFIGURATION_ERROR"));
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_decoding() {
        let harness = Harness::new();
        let mut cmd = harness.sealed(json!({"action": "pay"}));
        cmd.signature = "AAAA".to_string();

        let result = harness.callback_handler().handle(cmd).await;

        assert_eq!(result, Err(CallbackError::SignatureMismatch));
        let invalid = harness.flow_log.find("CALLBACK_SIGNATURE_INVALID").unwrap();
        assert_eq!(invalid.context_value("signature_length"), Some("4"));
        assert!(!harness.flow_log.has_step("CALLBACK_SIGNATURE_VALID"));
    }

    #[tokio::test]
    async fn undecodable_payload_is_invalid() {
        let harness = Harness::new();
        let data = "not base64!".to_string();
        let signature = signature::sign(&data, "sandbox_priv");

        let result = harness
            .callback_handler()
            .handle(CallbackCommand { data, signature })
            .await;

        assert_eq!(
            result,
            Err(CallbackError::validation("Unable to decode LiqPay payload"))
        );
    }

    #[tokio::test]
    async fn action_is_required_and_must_be_known() {
        let harness = Harness::new();

        let missing = send(&harness, json!({"status": "success"})).await;
        assert!(matches!(missing, Err(CallbackError::Validation(_))));
        assert!(harness.flow_log.has_step("CALLBACK_ACTION_MISSING"));

        let unknown = send(&harness, json!({"action": "hold", "status": "success"})).await;
        assert!(matches!(unknown, Err(CallbackError::Rejected(_))));
        let logged = harness.flow_log.find("CALLBACK_UNSUPPORTED_ACTION").unwrap();
        assert_eq!(logged.context_value("action"), Some("hold"));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Reference resolution
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unknown_user_is_ignored() {
        let harness = Harness::new();
        let stranger = UserId::new();

        let result = send(
            &harness,
            json!({"action": "pay", "status": "success", "order_id": order(&stranger, "std_monthly"), "payment_id": "p1"}),
        )
        .await;

        assert!(matches!(result, Err(CallbackError::Rejected(_))));
        assert!(harness.flow_log.has_step("CALLBACK_USER_NOT_FOUND"));
        let error = harness.flow_log.find("CALLBACK_PROCESSING_ERROR").unwrap();
        assert_eq!(
            error.message,
            "Failed to process LiqPay callback for plan std_monthly (status=success)"
        );
    }

    #[tokio::test]
    async fn unknown_plan_is_invalid() {
        let harness = Harness::new();
        let user = harness.add_user();

        let result = send(
            &harness,
            json!({"action": "pay", "status": "success", "order_id": order(&user, "gold"), "payment_id": "p1"}),
        )
        .await;

        assert!(matches!(result, Err(CallbackError::Validation(_))));
        assert!(harness.flow_log.has_step("CALLBACK_PLAN_NOT_FOUND"));
    }

    #[tokio::test]
    async fn trial_plan_cannot_be_bought() {
        let harness = Harness::new();
        let user = harness.add_user();

        let result = send(
            &harness,
            json!({"action": "pay", "status": "success", "order_id": order(&user, "trial"), "payment_id": "p1"}),
        )
        .await;

        assert!(matches!(result, Err(CallbackError::Rejected(_))));
        assert!(harness.flow_log.has_step("CALLBACK_TRIAL_PLAN_REJECTED"));
        assert_eq!(harness.subscriptions.count(), 0);
    }

    #[tokio::test]
    async fn missing_provider_id_changes_nothing() {
        let harness = Harness::new();
        let user = harness.add_user();

        let result = send(
            &harness,
            json!({"action": "subscribe", "status": "success", "order_id": order(&user, "std_monthly")}),
        )
        .await;

        assert!(matches!(result, Err(CallbackError::Validation(_))));
        assert_eq!(harness.subscriptions.count(), 0);
        let missing = harness.flow_log.find("SUBSCRIPTION_PROVIDER_ID_MISSING").unwrap();
        assert!(missing.context_value("payload_keys").unwrap().contains("order_id"));
        assert!(missing.context_value("payload_snapshot").is_some());
    }

    // ════════════════════════════════════════════════════════════════════════
    // Pay
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn pay_success_activates_with_provider_dates() {
        let harness = Harness::new();
        let user = harness.add_user();
        let period_end = Timestamp::now().add_days(31);

        let result = send(
            &harness,
            json!({
                "action": "pay",
                "status": "success",
                "order_id": order(&user, "std_monthly"),
                "payment_id": 987654,
                "card_token": "tok-1",
                "end_time": format_provider_date(&period_end),
            }),
        )
        .await
        .unwrap();

        assert!(result.activated);
        assert!(!result.already_active);
        assert_eq!(result.plan_code, "std_monthly");

        let stored = harness.subscriptions.get(&user).unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(stored.provider_subscription_id.as_deref(), Some("987654"));
        assert_eq!(stored.provider_customer_token.as_deref(), Some("tok-1"));
        assert_eq!(
            stored.current_period_ends_at.map(|t| format_provider_date(&t)),
            Some(format_provider_date(&period_end))
        );
        let attempt = harness.flow_log.find("SUBSCRIPTION_ACTIVATION_ATTEMPT").unwrap();
        assert_eq!(attempt.context_value("provider_subscription_id_source"), Some("payload"));
    }

    #[tokio::test]
    async fn pay_without_dates_uses_one_plan_period() {
        let harness = Harness::new();
        let user = harness.add_user();

        send(
            &harness,
            json!({"action": "pay", "status": "success", "order_id": order(&user, "std_yearly"), "payment_id": "p1"}),
        )
        .await
        .unwrap();

        let stored = harness.subscriptions.get(&user).unwrap();
        let days = stored
            .current_period_ends_at
            .unwrap()
            .duration_since(&Timestamp::now())
            .num_days();
        assert!((364..=366).contains(&days), "{}", days);
        assert_eq!(stored.next_billing_at, stored.current_period_ends_at);
    }

    #[tokio::test]
    async fn pay_reuses_stored_provider_id() {
        let harness = Harness::new();
        let user = harness.add_user();
        let order_id = order(&user, "std_monthly");

        send(
            &harness,
            json!({"action": "pay", "status": "success", "order_id": order_id, "payment_id": "p1"}),
        )
        .await
        .unwrap();
        let renewal = send(
            &harness,
            json!({"action": "pay", "status": "success", "order_id": order_id}),
        )
        .await
        .unwrap();

        assert!(renewal.already_active);
        assert!(!renewal.activated);
        let attempt = harness.flow_log.find("SUBSCRIPTION_ACTIVATION_ATTEMPT").unwrap();
        assert_eq!(attempt.context_value("provider_subscription_id_source"), Some("existing"));
        assert!(harness.flow_log.has_step("SUBSCRIPTION_ALREADY_ACTIVE"));
        assert_eq!(harness.events.count_of(SubscriptionEventType::Renewal), 1);
    }

    #[tokio::test]
    async fn pay_failure_marks_past_due_with_reason() {
        let harness = Harness::new();
        let user = harness.add_user();

        let result = send(
            &harness,
            json!({
                "action": "pay",
                "status": "failure",
                "order_id": order(&user, "std_monthly"),
                "payment_id": "p1",
                "err_code": "limit",
                "err_description": "card declined",
            }),
        )
        .await
        .unwrap();

        assert!(result.payment_failed);
        assert_eq!(
            harness.subscriptions.get(&user).unwrap().status,
            SubscriptionStatus::PastDue
        );
        let logged = harness.flow_log.find("SUBSCRIPTION_PAYMENT_FAILED").unwrap();
        assert_eq!(logged.context_value("err_code"), Some("limit"));
        assert_eq!(logged.context_value("failure_reason"), Some("card declined"));
        assert_eq!(harness.notifier.count_of("payment_failed"), 1);
    }

    #[tokio::test]
    async fn redelivered_pay_failure_is_recorded_once() {
        let harness = Harness::new();
        let user = harness.add_user();
        let payload = json!({
            "action": "pay",
            "status": "failure",
            "order_id": order(&user, "std_monthly"),
            "payment_id": "p1",
            "err_description": "card declined",
        });

        send(&harness, payload.clone()).await.unwrap();
        send(&harness, payload).await.unwrap();

        assert_eq!(harness.events.count_of(SubscriptionEventType::PaymentFailure), 1);
        assert_eq!(harness.notifier.count_of("payment_failed"), 1);
        assert_eq!(
            harness.subscriptions.get(&user).unwrap().status,
            SubscriptionStatus::PastDue
        );
    }

    #[tokio::test]
    async fn pay_pending_marks_pending() {
        let harness = Harness::new();
        let user = harness.add_user();

        let result = send(
            &harness,
            json!({"action": "pay", "status": "processing", "order_id": order(&user, "std_monthly"), "payment_id": "p1"}),
        )
        .await
        .unwrap();

        assert!(result.activation_pending);
        assert!(!result.payment_failed);
        assert_eq!(harness.events.count_of(SubscriptionEventType::PaymentPending), 1);
        assert_eq!(harness.notifier.count_of("payment_failed"), 0);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Subscribe
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn subscribe_success_confirmed_by_status_api() {
        let harness = Harness::new();
        let user = harness.add_user();
        harness.gateway.push_status(Ok(PaymentStatus {
            status: Some("success".to_string()),
            ..Default::default()
        }));

        let result = send(
            &harness,
            json!({"action": "subscribe", "status": "subscribed", "order_id": order(&user, "std_monthly"), "payment_id": "p1"}),
        )
        .await
        .unwrap();

        assert!(result.activated);
        assert!(!result.activation_pending);
        assert_eq!(result.provider_status.as_deref(), Some("success"));
        assert_eq!(harness.events.count_of(SubscriptionEventType::PaymentPending), 1);
        assert_eq!(harness.events.count_of(SubscriptionEventType::Purchase), 1);
        assert!(harness.flow_log.has_step("SUBSCRIPTION_PAYMENT_PENDING"));
    }

    #[tokio::test]
    async fn redelivered_subscribe_renews_without_second_purchase() {
        let harness = Harness::new();
        let user = harness.add_user();
        for _ in 0..2 {
            harness.gateway.push_status(Ok(PaymentStatus {
                status: Some("success".to_string()),
                ..Default::default()
            }));
        }
        let payload = json!({
            "action": "subscribe",
            "status": "subscribed",
            "order_id": order(&user, "std_monthly"),
            "payment_id": "p1",
            "subscribe_id": "sub-1",
        });

        let first = send(&harness, payload.clone()).await.unwrap();
        let second = send(&harness, payload).await.unwrap();

        assert!(first.activated);
        assert!(!second.activated);
        assert!(second.already_active);
        assert_eq!(harness.events.count_of(SubscriptionEventType::Purchase), 1);
        assert_eq!(harness.events.count_of(SubscriptionEventType::Renewal), 1);
        assert_eq!(harness.events.count_of(SubscriptionEventType::PaymentPending), 1);
        assert_eq!(harness.notifier.count_of("subscription_activated"), 1);
        assert_eq!(
            harness.subscriptions.get(&user).unwrap().status,
            SubscriptionStatus::Active
        );
    }

    #[tokio::test]
    async fn subscribe_success_without_confirmation_stays_pending() {
        let harness = Harness::new();
        let user = harness.add_user();
        let start = Timestamp::now().add_days(14);
        harness.gateway.push_status(Ok(PaymentStatus {
            status: Some("wait_accept".to_string()),
            ..Default::default()
        }));

        let result = send(
            &harness,
            json!({
                "action": "subscribe",
                "status": "subscribed",
                "order_id": order(&user, "std_monthly"),
                "subscribe_id": "sub-1",
                "subscribe_date_start": format_provider_date(&start),
            }),
        )
        .await
        .unwrap();

        assert!(result.activation_pending);
        let stored = harness.subscriptions.get(&user).unwrap();
        assert_eq!(stored.status, SubscriptionStatus::PastDue);
        assert_eq!(
            stored.next_billing_at.map(|t| format_provider_date(&t)),
            Some(format_provider_date(&start))
        );
    }

    #[tokio::test]
    async fn subscribe_failure_status_is_ignored() {
        let harness = Harness::new();
        let user = harness.add_user();

        let result = send(
            &harness,
            json!({"action": "subscribe", "status": "failure", "order_id": order(&user, "std_monthly"), "payment_id": "p1"}),
        )
        .await;

        assert!(matches!(result, Err(CallbackError::Rejected(_))));
        assert!(harness.flow_log.has_step("SUBSCRIPTION_SUBSCRIBE_REJECTED"));
        assert_eq!(harness.subscriptions.count(), 0);
    }

    #[tokio::test]
    async fn subscribe_with_cancellation_status_cancels() {
        let harness = Harness::new();
        let user = harness.add_user();
        send(
            &harness,
            json!({"action": "pay", "status": "success", "order_id": order(&user, "std_monthly"), "payment_id": "p1"}),
        )
        .await
        .unwrap();

        send(
            &harness,
            json!({"action": "subscribe", "status": "unsubscribed", "order_id": order(&user, "std_monthly")}),
        )
        .await
        .unwrap();

        assert!(harness.flow_log.has_step("SUBSCRIPTION_PROVIDER_CANCELLATION_STATUS"));
        assert_eq!(
            harness.subscriptions.get(&user).unwrap().status,
            SubscriptionStatus::Cancelled
        );
    }

    // ════════════════════════════════════════════════════════════════════════
    // Unsubscribe
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unsubscribe_cancels_and_keeps_paid_period() {
        let harness = Harness::new();
        let user = harness.add_user();
        send(
            &harness,
            json!({"action": "pay", "status": "success", "order_id": order(&user, "std_monthly"), "payment_id": "p1"}),
        )
        .await
        .unwrap();

        send(
            &harness,
            json!({"action": "unsubscribe", "status": "unsubscribed", "order_id": order(&user, "std_monthly")}),
        )
        .await
        .unwrap();

        let stored = harness.subscriptions.get(&user).unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Cancelled);
        assert_eq!(stored.cancellation_effective_at, stored.current_period_ends_at);
        assert!(harness.flow_log.has_step("CALLBACK_UNSUBSCRIBE_RECEIVED"));
        assert!(harness.flow_log.has_step("SUBSCRIPTION_CANCELLED_BY_PROVIDER"));
    }

    #[tokio::test]
    async fn unsubscribe_failure_status_is_ignored() {
        let harness = Harness::new();
        let user = harness.add_user();

        let result = send(
            &harness,
            json!({"action": "unsubscribe", "status": "error", "order_id": order(&user, "std_monthly"), "payment_id": "p1"}),
        )
        .await;

        assert!(matches!(result, Err(CallbackError::Rejected(_))));
        assert!(harness.flow_log.has_step("SUBSCRIPTION_PROVIDER_CANCELLATION_REJECTED"));
        // The unsubscribe gateway is never involved in inbound cancellations
        assert!(harness.gateway.unsubscribe_requests().is_empty());
    }

    // ════════════════════════════════════════════════════════════════════════
    // Date helpers
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn future_date_skips_past_candidates() {
        let now = Timestamp::now();
        let past = now.minus_days(3);
        let future = now.add_days(3);
        let payload = match json!({
            "subscribe_date_end": format_provider_date(&past),
            "next_pay_time": format_provider_date(&future),
        }) {
            Value::Object(map) => CallbackPayload::new(map),
            _ => unreachable!(),
        };

        let found = future_date(&payload, PERIOD_END_FIELDS, now).unwrap();
        assert_eq!(format_provider_date(&found), format_provider_date(&future));
        assert!(future_date(&payload, &["subscribe_date_end"], now).is_none());
    }
}
