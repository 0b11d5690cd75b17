//! zerocert library
//!
//! Issues and renews ZeroSSL certificates for IP addresses and installs them
//! on disk.
//!
//! - **CA access**: ZeroSSL REST client behind the [`CaClient`] trait
//! - **Keys**: private key and CSR generation per certificate entry
//! - **Hooks**: external executables that publish validation files and
//!   reload services
//! - **State**: YAML record of the certificates issued so far
//! - **Workflows**: sequential issue and renew passes in [`Orchestrator`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zerocert::{Orchestrator, ProcessHookRunner, ZeroSslConnector};
//! use zerocert_common::CertMetrics;
//! use zerocert_config::Config;
//!
//! let config = Config::from_file("/etc/zerocert/config.yaml")?;
//! let connector = Arc::new(ZeroSslConnector::new(&config.ca_api_url)?);
//! let metrics = Arc::new(CertMetrics::new()?);
//! let mut orchestrator =
//!     Orchestrator::new(&config, connector, Arc::new(ProcessHookRunner), metrics);
//! let report = orchestrator.issue_all().await;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod ca;
pub mod error;
pub mod hooks;
pub mod install;
pub mod keys;
pub mod metrics_server;
pub mod state;
pub mod workflow;

// ============================================================================
// Public API Re-exports
// ============================================================================

// CA access
pub use ca::{
    CaClient, CaConnector, CertStatus, CertificateInfo, DownloadedCertificate, NewCertificate,
    VerifyResult, ZeroSslClient, ZeroSslConnector,
};

// Errors
pub use error::{CaError, HookError, InstallError, IssueError, KeyError, StateError};

// Hooks
pub use hooks::{HookEnv, HookRunner, ProcessHookRunner};

// State
pub use state::{CertRecord, StateStore};

// Workflows
pub use workflow::{
    renewal_due, CertOutcome, CertReport, Orchestrator, RenewalDecision, RunReport,
    WorkflowSettings,
};
