//! Domain validation polling
//!
//! After the verify hook has published the validation file the CA is asked
//! to check domain control until the certificate reaches
//! `pending_validation` or `issued`. API errors back off exponentially; a
//! certificate the CA has not picked up yet is polled at a fixed interval.
//! Readiness polling always follows, whatever the loop ended with.

use tracing::{info, warn};

use zerocert_config::CertConf;

use super::Orchestrator;
use crate::ca::{CaClient, CertStatus};
use crate::error::IssueError;

/// Whether the CA has started processing domain validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainCheck {
    /// Validation is pending or already done
    Ready,
    /// The certificate is still in an earlier state (usually `draft`)
    NotReady(CertStatus),
}

impl DomainCheck {
    pub fn from_status(status: CertStatus) -> Self {
        match status {
            CertStatus::PendingValidation | CertStatus::Issued => DomainCheck::Ready,
            other => DomainCheck::NotReady(other),
        }
    }
}

impl Orchestrator {
    /// Drive domain validation, then wait for the certificate to be issued
    pub(super) async fn await_domain_validation(
        &self,
        client: &dyn CaClient,
        cert_id: &str,
        conf: &CertConf,
    ) -> Result<(), IssueError> {
        let retry = self.settings.retry;
        let attempts = retry.attempts();
        let mut wait = retry.initial_wait;

        for attempt in 1..=attempts {
            match client.verify_domains(cert_id, conf.verify_method).await {
                Ok(result) => info!(
                    cert_id = %cert_id,
                    attempt,
                    success = result.success,
                    error = ?result.error,
                    "Domain verification requested"
                ),
                Err(e) => {
                    warn!(
                        cert_id = %cert_id,
                        attempt,
                        error = %e,
                        wait_ms = wait.as_millis() as u64,
                        "Domain verification request failed"
                    );
                    self.metrics.inc_api_errors();
                    self.sleeper.sleep(wait).await;
                    wait = wait.saturating_mul(retry.multiplier);
                    continue;
                }
            }

            let info = match client.get_certificate(cert_id).await {
                Ok(info) => info,
                Err(e) => {
                    warn!(
                        cert_id = %cert_id,
                        attempt,
                        error = %e,
                        wait_ms = wait.as_millis() as u64,
                        "Failed to fetch certificate"
                    );
                    self.metrics.inc_api_errors();
                    self.sleeper.sleep(wait).await;
                    wait = wait.saturating_mul(retry.multiplier);
                    continue;
                }
            };

            match DomainCheck::from_status(info.status) {
                DomainCheck::Ready => {
                    info!(cert_id = %cert_id, status = %info.status, "Domain validation underway");
                    break;
                }
                DomainCheck::NotReady(status) => {
                    info!(cert_id = %cert_id, status = %status, "Domain validation not started yet");
                    self.sleeper
                        .sleep(self.settings.validation_poll_interval)
                        .await;
                }
            }
        }

        self.wait_until_issued(client, cert_id).await?;
        Ok(())
    }
}
