//! Tower middleware installed around every routed request.
//!
//! - [`recovery`]: panic containment, outermost after metrics
//! - [`timeout`]: whole-request deadline
//! - [`metrics`]: request span, counters and duration histogram

pub mod metrics;
pub mod recovery;
pub mod timeout;

pub use metrics::MetricsLayer;
pub use recovery::{default_recover_handler, fault_to_error, RecoverHandler, RecoveryLayer};
pub use timeout::RequestTimeoutLayer;
