//! LiqPay protocol module.
//!
//! Pure functions and value objects for the LiqPay wire protocol: envelope
//! signing and decoding, action and status classification, order references
//! and provider identifier extraction. Nothing here performs I/O.

pub mod action;
pub mod callback_errors;
pub mod codec;
pub mod credentials;
pub mod order_reference;
pub mod payload;
pub mod provider_id;
pub mod signature;

pub use action::{CallbackAction, StatusClass};
pub use callback_errors::CallbackError;
pub use codec::CodecError;
pub use credentials::{LiqPayCredentials, SealedEnvelope, API_VERSION};
pub use order_reference::{OrderReference, OrderReferenceError, ORDER_ID_DELIMITER};
pub use payload::{first_non_blank, format_provider_date, parse_provider_date, CallbackPayload};
pub use provider_id::ProviderIdSource;
