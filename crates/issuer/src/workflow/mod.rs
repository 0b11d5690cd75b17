//! Certificate lifecycle orchestration
//!
//! [`Orchestrator`] drives the configured certificate set through one of two
//! passes:
//!
//! - [`Orchestrator::issue_all`] issues a certificate for every entry without
//!   a persisted record and hands entries that already have one to renewal.
//! - [`Orchestrator::renew_all`] walks the persisted records and renews the
//!   ones that are due.
//!
//! Both passes are sequential. A failing certificate is logged and reported
//! but never stops the pass.

mod issue;
mod readiness;
mod renew;
mod validation;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use zerocert_common::{CertMetrics, RetryPolicy, Sleeper, TokioSleeper};
use zerocert_config::{CertConf, Config};

use crate::ca::{CaClient, CaConnector};
use crate::error::IssueError;
use crate::hooks::HookRunner;
use crate::state::StateStore;

pub use renew::{renewal_due, RenewalDecision, RENEW_BEFORE_DAYS};
pub use validation::DomainCheck;

/// Fixed wait while the CA has not started domain validation
pub const VALIDATION_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Timing and behaviour knobs of the workflows
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub retry: RetryPolicy,
    /// Readiness poll interval
    pub check_interval: Duration,
    /// Readiness timeout
    pub max_wait: Duration,
    pub validation_poll_interval: Duration,
    pub clean_unfinished: bool,
    pub data_dir: PathBuf,
}

impl WorkflowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: config.retry_policy(),
            check_interval: config.poll_interval(),
            max_wait: config.max_wait(),
            validation_poll_interval: VALIDATION_POLL_INTERVAL,
            clean_unfinished: config.clean_unfinished,
            data_dir: config.data_dir.clone(),
        }
    }
}

/// What happened to one certificate
#[derive(Debug)]
pub enum CertOutcome {
    Issued { cert_id: String },
    Renewed { previous: String, cert_id: String },
    Skipped { reason: String },
    /// Persisted record without a matching configuration entry
    Orphaned,
    Failed(IssueError),
}

impl CertOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CertOutcome::Failed(_))
    }
}

impl fmt::Display for CertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertOutcome::Issued { cert_id } => write!(f, "issued {}", cert_id),
            CertOutcome::Renewed { previous, cert_id } => {
                write!(f, "renewed {} -> {}", previous, cert_id)
            }
            CertOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            CertOutcome::Orphaned => write!(f, "orphaned record"),
            CertOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Outcome of one certificate with its identity
#[derive(Debug)]
pub struct CertReport {
    pub conf_id: String,
    pub common_name: String,
    pub outcome: CertOutcome,
}

/// Outcomes of a whole pass
#[derive(Debug, Default)]
pub struct RunReport {
    pub certs: Vec<CertReport>,
}

impl RunReport {
    fn push(&mut self, conf_id: &str, common_name: &str, outcome: CertOutcome) {
        self.certs.push(CertReport {
            conf_id: conf_id.to_string(),
            common_name: common_name.to_string(),
            outcome,
        });
    }

    fn count(&self, pred: impl Fn(&CertOutcome) -> bool) -> usize {
        self.certs.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn issued(&self) -> usize {
        self.count(|o| matches!(o, CertOutcome::Issued { .. }))
    }

    pub fn renewed(&self) -> usize {
        self.count(|o| matches!(o, CertOutcome::Renewed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, CertOutcome::Skipped { .. }))
    }

    pub fn orphaned(&self) -> usize {
        self.count(|o| matches!(o, CertOutcome::Orphaned))
    }

    pub fn failed(&self) -> usize {
        self.count(CertOutcome::is_failure)
    }

    /// True when no certificate failed; orphaned records do not count
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Drives issuance and renewal of the configured certificates
pub struct Orchestrator {
    settings: WorkflowSettings,
    certs: Vec<CertConf>,
    state: StateStore,
    connector: Arc<dyn CaConnector>,
    hooks: Arc<dyn HookRunner>,
    metrics: Arc<CertMetrics>,
    sleeper: Arc<dyn Sleeper>,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        connector: Arc<dyn CaConnector>,
        hooks: Arc<dyn HookRunner>,
        metrics: Arc<CertMetrics>,
    ) -> Self {
        Self {
            settings: WorkflowSettings::from_config(config),
            certs: config.cert_configs.clone(),
            state: StateStore::new(&config.data_dir),
            connector,
            hooks,
            metrics,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the sleeper used for backoff and polling waits
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Override the timing settings
    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.state = StateStore::new(&settings.data_dir);
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn state(&mut self) -> &mut StateStore {
        &mut self.state
    }

    pub fn metrics(&self) -> &CertMetrics {
        &self.metrics
    }

    /// Issue certificates for every configured entry
    pub async fn issue_all(&mut self) -> RunReport {
        info!(certs = self.certs.len(), "Issuing certificates");

        let certs = self.certs.clone();
        let mut report = RunReport::default();
        for conf in &certs {
            info!(conf_id = %conf.conf_id, common_name = %conf.common_name, "Issuing certificate");
            let outcome = self.issue_one(conf).await;
            report.push(&conf.conf_id, &conf.common_name, outcome);
        }

        log_summary(&report);
        report
    }

    /// Renew every persisted certificate that is due
    pub async fn renew_all(&mut self) -> RunReport {
        let mut report = RunReport::default();

        let records = match self.state.records() {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to load certificate state");
                report.push("", "", CertOutcome::Failed(e.into()));
                return report;
            }
        };

        info!(records = records.len(), "Renewing certificates");

        for record in &records {
            let Some(conf) = self.certs.iter().find(|c| c.conf_id == record.conf_id).cloned()
            else {
                error!(
                    conf_id = %record.conf_id,
                    common_name = %record.common_name,
                    cert_id = %record.cert_id,
                    "No configuration for persisted certificate"
                );
                report.push(&record.conf_id, &record.common_name, CertOutcome::Orphaned);
                continue;
            };

            let outcome = self.renew_record(record, &conf).await;
            report.push(&conf.conf_id, &conf.common_name, outcome);
        }

        log_summary(&report);
        report
    }

    fn connect(&self, conf: &CertConf) -> Result<Box<dyn CaClient>, IssueError> {
        Ok(self.connector.connect(conf)?)
    }

    /// Cancel unfinished certificates if configured; failures are not fatal
    async fn clean_unfinished(&self, client: &dyn CaClient, conf: &CertConf) {
        if !self.settings.clean_unfinished {
            return;
        }
        match client.clean_unfinished().await {
            Ok(cancelled) => {
                info!(conf_id = %conf.conf_id, cancelled, "Cleaned unfinished certificates")
            }
            Err(e) => warn!(
                conf_id = %conf.conf_id,
                error = %e,
                "Failed to clean unfinished certificates"
            ),
        }
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("certs", &self.certs.len())
            .field("state", &self.state.path())
            .finish()
    }
}

fn log_summary(report: &RunReport) {
    for cert in &report.certs {
        if let CertOutcome::Failed(e) = &cert.outcome {
            error!(
                conf_id = %cert.conf_id,
                common_name = %cert.common_name,
                error = %e,
                "Certificate failed"
            );
        }
    }
    info!(
        issued = report.issued(),
        renewed = report.renewed(),
        skipped = report.skipped(),
        orphaned = report.orphaned(),
        failed = report.failed(),
        "Certificate pass finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let mut report = RunReport::default();
        report.push("a", "1.1.1.1", CertOutcome::Issued { cert_id: "x".into() });
        report.push("b", "1.1.1.2", CertOutcome::Orphaned);
        report.push(
            "c",
            "1.1.1.3",
            CertOutcome::Skipped {
                reason: "not due".into(),
            },
        );

        assert_eq!(report.issued(), 1);
        assert_eq!(report.orphaned(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(report.is_success());

        report.push(
            "d",
            "1.1.1.4",
            CertOutcome::Failed(IssueError::EmptyCertificateId),
        );
        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::with_data_dir("/data");
        let settings = WorkflowSettings::from_config(&config);

        assert_eq!(settings.check_interval, Duration::from_secs(30));
        assert_eq!(settings.max_wait, Duration::from_secs(180 * 60));
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.initial_wait, Duration::from_secs(15));
        assert_eq!(settings.validation_poll_interval, VALIDATION_POLL_INTERVAL);
    }
}
