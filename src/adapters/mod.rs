//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing core to external systems:
//! - `audit` - Payment flow log (file + tracing, in-memory)
//! - `http` - Axum routes for the LiqPay callback and user endpoints
//! - `liqpay` - LiqPay API client
//! - `memory` - In-memory persistence and notifier for tests and local runs
//! - `postgres` - PostgreSQL persistence

pub mod audit;
pub mod http;
pub mod liqpay;
pub mod memory;
pub mod postgres;

pub use audit::{FilePaymentFlowLog, InMemoryPaymentFlowLog};
pub use liqpay::LiqPayGateway;
