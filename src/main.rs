//! LiqPay billing service entry point.

use std::sync::Arc;

use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use liqpay_billing::adapters::audit::FilePaymentFlowLog;
use liqpay_billing::adapters::http::{billing_router, BillingAppState};
use liqpay_billing::adapters::liqpay::LiqPayGateway;
use liqpay_billing::adapters::memory::LoggingNotifier;
use liqpay_billing::adapters::postgres::{
    self, PostgresCancellationRecords, PostgresPlanCatalog, PostgresSubscriptionEventLog,
    PostgresSubscriptionRepository, PostgresUserDirectory,
};
use liqpay_billing::application::{
    CancellationCoordinator, CheckoutSettings, CreateCheckoutHandler, PaymentReconciler,
    ProcessCallbackHandler, SubscriptionLifecycleService, TrialLifecycleJobs,
};
use liqpay_billing::config::{AppConfig, ServerConfig};
use liqpay_billing::ports::{PaymentFlowLog, SubscriptionRepository, UserDirectory};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    if !config.liqpay.has_keys() {
        tracing::warn!("LiqPay keys are not configured; callbacks and checkouts will be refused");
    }

    let pool = postgres::connect(&config.database).await?;

    let subscriptions: Arc<dyn SubscriptionRepository> =
        Arc::new(PostgresSubscriptionRepository::new(pool.clone()));
    let plans = Arc::new(PostgresPlanCatalog::new(pool.clone()));
    let users: Arc<dyn UserDirectory> = Arc::new(PostgresUserDirectory::new(pool.clone()));
    let events = Arc::new(PostgresSubscriptionEventLog::new(pool.clone()));
    let cancellations = Arc::new(PostgresCancellationRecords::new(pool));
    let flow_log: Arc<dyn PaymentFlowLog> =
        Arc::new(FilePaymentFlowLog::new(&config.audit.payment_flow_log_path));
    let notifier = Arc::new(LoggingNotifier::new(users.clone()));

    let credentials = config.liqpay.credentials();
    let gateway = Arc::new(
        LiqPayGateway::new(credentials.clone())
            .with_api_url(config.liqpay.api_url.clone())
            .with_timeout(config.liqpay.request_timeout()),
    );

    let coordinator = Arc::new(CancellationCoordinator::new(gateway.clone(), flow_log.clone()));
    let lifecycle = Arc::new(SubscriptionLifecycleService::new(
        subscriptions.clone(),
        plans.clone(),
        events,
        notifier,
        cancellations,
        coordinator,
        config.subscription.trial_length_days,
    ));
    let reconciler = Arc::new(PaymentReconciler::new(
        gateway,
        lifecycle.clone(),
        flow_log.clone(),
    ));

    let state = BillingAppState {
        callback_handler: Arc::new(ProcessCallbackHandler::new(
            credentials.clone(),
            users.clone(),
            plans.clone(),
            lifecycle.clone(),
            reconciler,
            flow_log.clone(),
        )),
        checkout_handler: Arc::new(CreateCheckoutHandler::new(
            credentials,
            plans,
            users,
            subscriptions.clone(),
            flow_log.clone(),
            CheckoutSettings::from_config(&config.liqpay, &config.server),
        )),
        lifecycle: lifecycle.clone(),
        flow_log,
    };

    let jobs = TrialLifecycleJobs::new(subscriptions, lifecycle, &config.subscription);
    let job_interval = config.subscription.job_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(job_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = jobs.run_all().await;
            tracing::info!(
                reminders_sent = report.reminders_sent,
                trials_expired = report.trials_expired,
                expired_reminders_sent = report.expired_reminders_sent,
                "Subscription jobs finished"
            );
        }
    });

    let app = Router::new()
        .merge(billing_router())
        .with_state(state)
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "LiqPay billing listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("LiqPay billing stopped");
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.clone()));

    if server.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
