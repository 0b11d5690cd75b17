//! Certificate lifecycle counters.
//!
//! Three monotonically increasing counters are kept in a private prometheus
//! registry and exported in the text exposition format. Increments are
//! atomic, so the workflow and the metrics responder can share one
//! [`CertMetrics`] behind an `Arc` without locking.

use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use tracing::trace;

/// Counter names as exposed to scrapers
pub const CERTS_ISSUED: &str = "certs_issued_total";
pub const CERTS_RENEWED: &str = "certs_renewed_total";
pub const API_ERRORS: &str = "api_errors_total";

/// Issuance, renewal and CA error counters.
#[derive(Clone)]
pub struct CertMetrics {
    registry: Registry,
    issued: IntCounter,
    renewed: IntCounter,
    api_errors: IntCounter,
}

impl CertMetrics {
    /// Create the counters and register them in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let issued = IntCounter::with_opts(Opts::new(
            CERTS_ISSUED,
            "Total number of certificates issued",
        ))?;
        let renewed = IntCounter::with_opts(Opts::new(
            CERTS_RENEWED,
            "Total number of certificates renewed",
        ))?;
        let api_errors =
            IntCounter::with_opts(Opts::new(API_ERRORS, "Total number of API errors"))?;

        registry.register(Box::new(issued.clone()))?;
        registry.register(Box::new(renewed.clone()))?;
        registry.register(Box::new(api_errors.clone()))?;

        Ok(Self {
            registry,
            issued,
            renewed,
            api_errors,
        })
    }

    pub fn inc_issued(&self) {
        self.issued.inc();
        trace!(total = self.issued.get(), "Issued counter incremented");
    }

    pub fn inc_renewed(&self) {
        self.renewed.inc();
        trace!(total = self.renewed.get(), "Renewed counter incremented");
    }

    pub fn inc_api_errors(&self) {
        self.api_errors.inc();
        trace!(total = self.api_errors.get(), "API error counter incremented");
    }

    pub fn issued(&self) -> u64 {
        self.issued.get()
    }

    pub fn renewed(&self) -> u64 {
        self.renewed.get()
    }

    pub fn api_errors(&self) -> u64 {
        self.api_errors.get()
    }

    /// Content type of [`CertMetrics::encode`] output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Render all counters in the prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl std::fmt::Debug for CertMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertMetrics")
            .field("issued", &self.issued.get())
            .field("renewed", &self.renewed.get())
            .field("api_errors", &self.api_errors.get())
            .finish()
    }
}
