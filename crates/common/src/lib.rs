//! Shared building blocks for zerocert.
//!
//! - [`retry`]: bounded retry with exponential backoff used for CA calls
//! - [`metrics`]: issued/renewed/API-error counters
//! - [`observability`]: JSON logging bootstrap

pub mod metrics;
pub mod observability;
pub mod retry;

pub use metrics::CertMetrics;
pub use observability::{init_tracing, LogHandle, LoggingError};
pub use retry::{RetryExhausted, RetryPolicy, Sleeper, TokioSleeper};
