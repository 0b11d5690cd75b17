//! Waiting for a certificate to be issued

use tokio::time::Instant;
use tracing::{debug, info};

use super::Orchestrator;
use crate::ca::{CaClient, CertStatus, CertificateInfo};
use crate::error::IssueError;

impl Orchestrator {
    /// Poll the CA until `cert_id` is issued or the readiness timeout passes
    ///
    /// Each poll goes through the retry policy; an exhausted poll fails
    /// immediately.
    pub(super) async fn wait_until_issued(
        &self,
        client: &dyn CaClient,
        cert_id: &str,
    ) -> Result<CertificateInfo, IssueError> {
        let started = Instant::now();
        let mut polls: u32 = 0;

        loop {
            polls += 1;
            let info = self
                .settings
                .retry
                .run(self.sleeper.as_ref(), move || client.get_certificate(cert_id))
                .await
                .map_err(|e| {
                    self.metrics.inc_api_errors();
                    e
                })?;

            if info.status == CertStatus::Issued {
                info!(
                    cert_id = %cert_id,
                    expires = %info.expires,
                    polls,
                    "Certificate is ready"
                );
                return Ok(info);
            }

            let elapsed = started.elapsed();
            debug!(
                cert_id = %cert_id,
                status = %info.status,
                elapsed_secs = elapsed.as_secs(),
                "Waiting for certificate to be issued"
            );

            if elapsed > self.settings.max_wait {
                return Err(IssueError::ReadinessTimeout {
                    cert_id: cert_id.to_string(),
                    elapsed,
                });
            }

            self.sleeper.sleep(self.settings.check_interval).await;
        }
    }
}
