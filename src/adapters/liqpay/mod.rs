//! LiqPay adapter - Outbound API client.
//!
//! Implements the `PaymentGateway` port over reqwest.

mod gateway;

pub use gateway::{LiqPayGateway, DEFAULT_API_URL};
