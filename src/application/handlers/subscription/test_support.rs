//! Shared fixtures for subscription handler tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::adapters::audit::InMemoryPaymentFlowLog;
use crate::adapters::memory::{
    InMemoryCancellationRecords, InMemoryPlanCatalog, InMemorySubscriptionEventLog,
    InMemorySubscriptionRepository, InMemoryUserDirectory, RecordingNotifier,
};
use crate::domain::foundation::UserId;
use crate::domain::liqpay::LiqPayCredentials;
use crate::domain::subscription::plan::fixtures::{monthly, yearly};
use crate::domain::subscription::Plan;
use crate::ports::{
    GatewayError, PaymentGateway, PaymentStatus, UnsubscribeRequest, UnsubscribeResponse,
    UserAccount,
};

use super::cancellation::CancellationCoordinator;
use super::create_checkout::{CheckoutSettings, CreateCheckoutHandler};
use super::lifecycle::SubscriptionLifecycleService;
use super::process_callback::{CallbackCommand, ProcessCallbackHandler};
use super::reconciliation::PaymentReconciler;

pub const DEFAULT_TRIAL_DAYS: u32 = 7;

// ════════════════════════════════════════════════════════════════════════════
// Scripted gateway
// ════════════════════════════════════════════════════════════════════════════

/// Gateway answering from queues; an empty queue is a network error.
pub struct MockGateway {
    configured: bool,
    statuses: Mutex<VecDeque<Result<PaymentStatus, GatewayError>>>,
    unsubscribes: Mutex<VecDeque<Result<UnsubscribeResponse, GatewayError>>>,
    status_requests: Mutex<Vec<(String, Option<String>)>>,
    unsubscribe_requests: Mutex<Vec<UnsubscribeRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            configured: true,
            statuses: Mutex::new(VecDeque::new()),
            unsubscribes: Mutex::new(VecDeque::new()),
            status_requests: Mutex::new(Vec::new()),
            unsubscribe_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn push_status(&self, response: Result<PaymentStatus, GatewayError>) {
        self.statuses.lock().unwrap().push_back(response);
    }

    pub fn push_unsubscribe(&self, response: Result<UnsubscribeResponse, GatewayError>) {
        self.unsubscribes.lock().unwrap().push_back(response);
    }

    pub fn status_requests(&self) -> Vec<(String, Option<String>)> {
        self.status_requests.lock().unwrap().clone()
    }

    pub fn unsubscribe_requests(&self) -> Vec<UnsubscribeRequest> {
        self.unsubscribe_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn query_status(
        &self,
        order_id: &str,
        payment_id: Option<&str>,
    ) -> Result<PaymentStatus, GatewayError> {
        self.status_requests
            .lock()
            .unwrap()
            .push((order_id.to_string(), payment_id.map(str::to_string)));
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::network("no scripted response")))
    }

    async fn send_unsubscribe(
        &self,
        request: &UnsubscribeRequest,
    ) -> Result<UnsubscribeResponse, GatewayError> {
        self.unsubscribe_requests.lock().unwrap().push(request.clone());
        self.unsubscribes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::network("no scripted response")))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Harness
// ════════════════════════════════════════════════════════════════════════════

/// In-memory wiring of every subscription handler.
pub struct Harness {
    pub subscriptions: Arc<InMemorySubscriptionRepository>,
    pub plans: Arc<InMemoryPlanCatalog>,
    pub users: Arc<InMemoryUserDirectory>,
    pub events: Arc<InMemorySubscriptionEventLog>,
    pub notifier: Arc<RecordingNotifier>,
    pub cancellations: Arc<InMemoryCancellationRecords>,
    pub flow_log: Arc<InMemoryPaymentFlowLog>,
    pub gateway: Arc<MockGateway>,
    pub credentials: LiqPayCredentials,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_plans(default_plans())
    }

    pub fn with_plans(plans: Vec<Plan>) -> Self {
        Self::build(
            plans,
            RecordingNotifier::new(),
            MockGateway::new(),
            LiqPayCredentials::from_keys("sandbox_pub", "sandbox_priv"),
        )
    }

    pub fn with_failing_notifier() -> Self {
        Self::build(
            default_plans(),
            RecordingNotifier::failing(),
            MockGateway::new(),
            LiqPayCredentials::from_keys("sandbox_pub", "sandbox_priv"),
        )
    }

    /// No merchant keys anywhere.
    pub fn unconfigured() -> Self {
        Self::build(
            default_plans(),
            RecordingNotifier::new(),
            MockGateway::unconfigured(),
            LiqPayCredentials::unconfigured(),
        )
    }

    fn build(
        plans: Vec<Plan>,
        notifier: RecordingNotifier,
        gateway: MockGateway,
        credentials: LiqPayCredentials,
    ) -> Self {
        Self {
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            plans: Arc::new(InMemoryPlanCatalog::new(plans)),
            users: Arc::new(InMemoryUserDirectory::new()),
            events: Arc::new(InMemorySubscriptionEventLog::new()),
            notifier: Arc::new(notifier),
            cancellations: Arc::new(InMemoryCancellationRecords::new()),
            flow_log: Arc::new(InMemoryPaymentFlowLog::new()),
            gateway: Arc::new(gateway),
            credentials,
        }
    }

    pub fn add_user(&self) -> UserId {
        let id = UserId::new();
        self.users
            .add(UserAccount::new(id).with_email(format!("{}@example.com", id)));
        id
    }

    pub fn plan(&self, code: &str) -> Plan {
        self.plans
            .plans()
            .iter()
            .find(|plan| plan.code == code)
            .cloned()
            .unwrap_or_else(|| panic!("no plan {} in harness", code))
    }

    pub fn monthly(&self) -> Plan {
        self.plan("std_monthly")
    }

    pub fn coordinator(&self) -> Arc<CancellationCoordinator> {
        Arc::new(CancellationCoordinator::new(
            self.gateway.clone(),
            self.flow_log.clone(),
        ))
    }

    pub fn lifecycle(&self) -> Arc<SubscriptionLifecycleService> {
        Arc::new(SubscriptionLifecycleService::new(
            self.subscriptions.clone(),
            self.plans.clone(),
            self.events.clone(),
            self.notifier.clone(),
            self.cancellations.clone(),
            self.coordinator(),
            DEFAULT_TRIAL_DAYS,
        ))
    }

    pub fn reconciler(&self) -> PaymentReconciler {
        PaymentReconciler::new(self.gateway.clone(), self.lifecycle(), self.flow_log.clone())
    }

    pub fn callback_handler(&self) -> ProcessCallbackHandler {
        ProcessCallbackHandler::new(
            self.credentials.clone(),
            self.users.clone(),
            self.plans.clone(),
            self.lifecycle(),
            Arc::new(self.reconciler()),
            self.flow_log.clone(),
        )
    }

    pub fn checkout_handler(&self) -> CreateCheckoutHandler {
        CreateCheckoutHandler::new(
            self.credentials.clone(),
            self.plans.clone(),
            self.users.clone(),
            self.subscriptions.clone(),
            self.flow_log.clone(),
            CheckoutSettings {
                checkout_url: "https://www.liqpay.ua/api/3/checkout".to_string(),
                server_callback_url: None,
                result_url: None,
                subscription_page_path: "/subscriptions".to_string(),
                base_url: "https://billing.example.com".to_string(),
            },
        )
    }

    /// Callback fields for `payload`, signed with the harness keys.
    pub fn sealed(&self, payload: Value) -> CallbackCommand {
        let Value::Object(params) = payload else {
            panic!("callback payload must be a JSON object");
        };
        let envelope = LiqPayCredentials::from_keys("sandbox_pub", "sandbox_priv").seal(&params);
        CallbackCommand {
            data: envelope.data,
            signature: envelope.signature,
        }
    }
}

fn default_plans() -> Vec<Plan> {
    vec![
        Plan::trial("trial", 14),
        monthly("std_monthly"),
        yearly("std_yearly"),
    ]
}
