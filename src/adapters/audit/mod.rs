//! Payment flow audit adapters.
//!
//! - `FilePaymentFlowLog` - Serialised file append mirrored to tracing
//! - `InMemoryPaymentFlowLog` - Recorder for tests

mod file_log;
mod in_memory;

pub use file_log::FilePaymentFlowLog;
pub use in_memory::InMemoryPaymentFlowLog;
