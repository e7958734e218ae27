//! End-to-end LiqPay callback flows.
//!
//! Drives `ProcessCallbackHandler` through the public crate API with the
//! in-memory adapters and a scripted gateway, the same wiring `main` does
//! with PostgreSQL and the real LiqPay client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use liqpay_billing::adapters::audit::InMemoryPaymentFlowLog;
use liqpay_billing::adapters::memory::{
    InMemoryCancellationRecords, InMemoryPlanCatalog, InMemorySubscriptionEventLog,
    InMemorySubscriptionRepository, InMemoryUserDirectory, RecordingNotifier,
};
use liqpay_billing::application::{
    CallbackCommand, CallbackResult, CancellationCoordinator, PaymentReconciler,
    ProcessCallbackHandler, SubscriptionLifecycleService,
};
use liqpay_billing::domain::foundation::UserId;
use liqpay_billing::domain::liqpay::{CallbackError, LiqPayCredentials};
use liqpay_billing::domain::subscription::{
    BillingPeriod, Plan, SubscriptionEventType, SubscriptionStatus,
};
use liqpay_billing::ports::{
    GatewayError, PaymentGateway, PaymentStatus, UnsubscribeRequest, UnsubscribeResponse,
    UserAccount,
};

// =============================================================================
// Test Infrastructure
// =============================================================================

const PUBLIC_KEY: &str = "sandbox_i0000000";
const PRIVATE_KEY: &str = "sandbox_secret";

/// Gateway answering status queries from a queue.
struct ScriptedGateway {
    statuses: Mutex<VecDeque<PaymentStatus>>,
    status_queries: Mutex<usize>,
}

impl ScriptedGateway {
    fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            status_queries: Mutex::new(0),
        }
    }

    fn answer_status(&self, status: &str) {
        self.statuses.lock().unwrap().push_back(PaymentStatus {
            status: Some(status.to_string()),
            ..Default::default()
        });
    }

    fn status_queries(&self) -> usize {
        *self.status_queries.lock().unwrap()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    fn is_configured(&self) -> bool {
        true
    }

    async fn query_status(
        &self,
        _order_id: &str,
        _payment_id: Option<&str>,
    ) -> Result<PaymentStatus, GatewayError> {
        *self.status_queries.lock().unwrap() += 1;
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GatewayError::network("connection refused"))
    }

    async fn send_unsubscribe(
        &self,
        _request: &UnsubscribeRequest,
    ) -> Result<UnsubscribeResponse, GatewayError> {
        Err(GatewayError::network("connection refused"))
    }
}

struct Billing {
    subscriptions: Arc<InMemorySubscriptionRepository>,
    users: Arc<InMemoryUserDirectory>,
    events: Arc<InMemorySubscriptionEventLog>,
    notifier: Arc<RecordingNotifier>,
    flow_log: Arc<InMemoryPaymentFlowLog>,
    gateway: Arc<ScriptedGateway>,
    handler: ProcessCallbackHandler,
}

impl Billing {
    fn new() -> Self {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let plans = Arc::new(InMemoryPlanCatalog::new(vec![
            Plan::trial("trial", 14),
            Plan::paid("std_monthly", BillingPeriod::Monthly, 14900, "UAH"),
            Plan::paid("std_yearly", BillingPeriod::Yearly, 149000, "UAH"),
        ]));
        let users = Arc::new(InMemoryUserDirectory::new());
        let events = Arc::new(InMemorySubscriptionEventLog::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let flow_log = Arc::new(InMemoryPaymentFlowLog::new());
        let gateway = Arc::new(ScriptedGateway::new());

        let coordinator = Arc::new(CancellationCoordinator::new(
            gateway.clone(),
            flow_log.clone(),
        ));
        let lifecycle = Arc::new(SubscriptionLifecycleService::new(
            subscriptions.clone(),
            plans.clone(),
            events.clone(),
            notifier.clone(),
            Arc::new(InMemoryCancellationRecords::new()),
            coordinator,
            14,
        ));
        let reconciler = Arc::new(PaymentReconciler::new(
            gateway.clone(),
            lifecycle.clone(),
            flow_log.clone(),
        ));
        let handler = ProcessCallbackHandler::new(
            LiqPayCredentials::from_keys(PUBLIC_KEY, PRIVATE_KEY),
            users.clone(),
            plans,
            lifecycle,
            reconciler,
            flow_log.clone(),
        );

        Self {
            subscriptions,
            users,
            events,
            notifier,
            flow_log,
            gateway,
            handler,
        }
    }

    fn user(&self) -> UserId {
        let id = UserId::new();
        self.users
            .add(UserAccount::new(id).with_email("customer@example.com"));
        id
    }

    async fn deliver(&self, payload: Value) -> Result<CallbackResult, CallbackError> {
        let Value::Object(params) = payload else {
            panic!("payload must be an object");
        };
        let envelope = LiqPayCredentials::from_keys(PUBLIC_KEY, PRIVATE_KEY).seal(&params);
        self.handler
            .handle(CallbackCommand {
                data: envelope.data,
                signature: envelope.signature,
            })
            .await
    }
}

fn pay_success(user: UserId) -> Value {
    json!({
        "action": "pay",
        "status": "success",
        "order_id": format!("{}--std_monthly--7f1c", user),
        "payment_id": 1800000001_i64,
    })
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn first_pay_success_activates_subscription() {
    let billing = Billing::new();
    let user = billing.user();

    let result = billing.deliver(pay_success(user)).await.unwrap();

    assert!(result.activated);
    assert!(!result.already_active);
    assert!(!result.payment_failed);
    assert_eq!(result.plan_code, "std_monthly");

    let subscription = billing.subscriptions.get(&user).unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Active);
    assert_eq!(
        subscription.provider_subscription_id.as_deref(),
        Some("1800000001")
    );
    assert_eq!(billing.events.count_of(SubscriptionEventType::Purchase), 1);
    assert_eq!(billing.notifier.count_of("subscription_activated"), 1);
}

#[tokio::test]
async fn redelivered_pay_is_a_renewal_without_second_email() {
    let billing = Billing::new();
    let user = billing.user();

    billing.deliver(pay_success(user)).await.unwrap();
    let second = billing.deliver(pay_success(user)).await.unwrap();

    assert!(!second.activated);
    assert!(second.already_active);
    assert_eq!(billing.events.count_of(SubscriptionEventType::Purchase), 1);
    assert_eq!(billing.events.count_of(SubscriptionEventType::Renewal), 1);
    assert_eq!(billing.notifier.count_of("subscription_activated"), 1);
    assert_eq!(billing.subscriptions.count(), 1);
}

#[tokio::test]
async fn subscribe_without_any_provider_id_changes_nothing() {
    let billing = Billing::new();
    let user = billing.user();

    let result = billing
        .deliver(json!({
            "action": "subscribe",
            "status": "subscribed",
            "order_id": format!("{}--std_monthly--7f1c", user),
        }))
        .await;

    assert!(matches!(result, Err(CallbackError::Validation(_))));
    assert!(billing.subscriptions.get(&user).is_none());
    assert!(billing.events.events().is_empty());
    assert!(billing.flow_log.has_step("SUBSCRIPTION_PROVIDER_ID_MISSING"));
}

#[tokio::test]
async fn failed_charge_moves_active_subscription_past_due() {
    let billing = Billing::new();
    let user = billing.user();
    billing.deliver(pay_success(user)).await.unwrap();

    let result = billing
        .deliver(json!({
            "action": "pay",
            "status": "failure",
            "order_id": format!("{}--std_monthly--8a2d", user),
            "payment_id": 1800000001_i64,
            "err_description": "card declined",
        }))
        .await
        .unwrap();

    assert!(result.payment_failed);
    assert_eq!(
        billing.subscriptions.get(&user).unwrap().status,
        SubscriptionStatus::PastDue
    );
    let failures: Vec<_> = billing
        .events
        .events()
        .into_iter()
        .filter(|e| e.event_type == SubscriptionEventType::PaymentFailure)
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].context["failure_message"], "card declined");
    assert_eq!(billing.notifier.count_of("payment_failed"), 1);
}

#[tokio::test]
async fn subscribe_success_is_confirmed_through_status_api() {
    let billing = Billing::new();
    let user = billing.user();
    billing.gateway.answer_status("success");

    let result = billing
        .deliver(json!({
            "action": "subscribe",
            "status": "subscribed",
            "order_id": format!("{}--std_monthly--7f1c", user),
            "subscribe": { "subscribe_id": "sub-42" },
        }))
        .await
        .unwrap();

    assert!(result.activated);
    assert!(!result.activation_pending);
    assert_eq!(billing.gateway.status_queries(), 1);
    assert_eq!(
        billing.subscriptions.get(&user).unwrap().status,
        SubscriptionStatus::Active
    );
    assert_eq!(billing.events.count_of(SubscriptionEventType::PaymentPending), 1);
    assert_eq!(billing.events.count_of(SubscriptionEventType::Purchase), 1);
}

#[tokio::test]
async fn unreachable_status_api_leaves_subscription_pending() {
    let billing = Billing::new();
    let user = billing.user();

    let result = billing
        .deliver(json!({
            "action": "subscribe",
            "status": "subscribed",
            "order_id": format!("{}--std_monthly--7f1c", user),
            "subscribe_id": "sub-42",
        }))
        .await
        .unwrap();

    assert!(!result.activated);
    assert!(result.activation_pending);
    assert_eq!(
        billing.subscriptions.get(&user).unwrap().status,
        SubscriptionStatus::PastDue
    );
    assert!(billing.flow_log.has_step("PAYMENT_STATUS_FAILED"));
}

#[tokio::test]
async fn pay_callback_arriving_after_pending_activates() {
    let billing = Billing::new();
    let user = billing.user();
    billing
        .deliver(json!({
            "action": "subscribe",
            "status": "subscribed",
            "order_id": format!("{}--std_monthly--7f1c", user),
            "subscribe_id": "sub-42",
        }))
        .await
        .unwrap();

    let result = billing.deliver(pay_success(user)).await.unwrap();

    assert!(result.activated);
    assert_eq!(
        billing.subscriptions.get(&user).unwrap().status,
        SubscriptionStatus::Active
    );
}

#[tokio::test]
async fn legacy_order_id_is_attributed_through_info() {
    let billing = Billing::new();
    let user = billing.user();

    let result = billing
        .deliver(json!({
            "action": "pay",
            "status": "success",
            "order_id": format!("{}-1712345678", user),
            "info": "std_yearly",
            "payment_id": 77,
        }))
        .await
        .unwrap();

    assert_eq!(result.user_id, user);
    assert_eq!(result.plan_code, "std_yearly");
    assert!(result.activated);
}

#[tokio::test]
async fn unsubscribe_callback_cancels_paid_subscription() {
    let billing = Billing::new();
    let user = billing.user();
    billing.deliver(pay_success(user)).await.unwrap();

    billing
        .deliver(json!({
            "action": "unsubscribe",
            "status": "unsubscribed",
            "order_id": format!("{}--std_monthly--9b3e", user),
            "payment_id": 1800000001_i64,
        }))
        .await
        .unwrap();

    let subscription = billing.subscriptions.get(&user).unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Cancelled);
    assert!(!subscription.auto_renew);
    assert_eq!(
        subscription.cancellation_effective_at,
        subscription.current_period_ends_at
    );
    assert_eq!(billing.events.count_of(SubscriptionEventType::Cancellation), 1);
}

#[tokio::test]
async fn every_callback_leaves_an_audit_trail() {
    let billing = Billing::new();
    let user = billing.user();

    billing.deliver(pay_success(user)).await.unwrap();
    let _ = billing
        .handler
        .handle(CallbackCommand {
            data: "e30=".to_string(),
            signature: "bm9wZQ==".to_string(),
        })
        .await;

    let steps = billing.flow_log.steps();
    assert!(steps.contains(&"CALLBACK_SIGNATURE_VALID".to_string()));
    assert!(steps.contains(&"CALLBACK_ORDER_IDENTIFIED".to_string()));
    assert!(steps.contains(&"SUBSCRIPTION_ACTIVATED".to_string()));
    assert!(steps.contains(&"CALLBACK_SIGNATURE_INVALID".to_string()));
}
