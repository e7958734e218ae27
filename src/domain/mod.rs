//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `liqpay` - LiqPay wire protocol: signing, decoding, classification, extraction
//! - `subscription` - Plans, the subscription aggregate and its lifecycle

pub mod foundation;
pub mod liqpay;
pub mod subscription;
